//! Finance: fee structures, invoices, payments, ledger.
//!
//! Money is `BigDecimal` end to end (Numeric columns). Invoice items are a
//! snapshot taken at generation time; later fee-structure edits never touch an
//! existing invoice. The ledger is append-only, one entry per invoice and per
//! payment.

pub mod api;
pub mod generator;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::shared::schema::{
    invoice_generation_logs, invoice_items, invoices, ledger_entries, payments,
};

pub const STATUS_DUE: &str = "due";
pub const STATUS_PARTIAL: &str = "partial";
pub const STATUS_PAID: &str = "paid";

pub const ENTRY_TYPE_INVOICE: &str = "invoice";
pub const ENTRY_TYPE_PAYMENT: &str = "payment";

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = invoices)]
pub struct Invoice {
    pub id: Uuid,
    pub center_id: Uuid,
    pub student_id: Uuid,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_amount: BigDecimal,
    pub paid_amount: BigDecimal,
    pub remaining_amount: BigDecimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = invoice_items)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub fee_heading: String,
    pub amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = payments)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: BigDecimal,
    pub payment_date: NaiveDate,
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = ledger_entries)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub center_id: Uuid,
    pub student_id: Uuid,
    pub entry_type: String,
    pub reference_id: Uuid,
    pub reference_table: String,
    pub amount: BigDecimal,
    pub entry_date: NaiveDate,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = invoice_generation_logs)]
pub struct GenerationLog {
    pub id: Uuid,
    pub center_id: Uuid,
    pub month: i32,
    pub year: i32,
    pub invoices_generated: i32,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn bd(val: f64) -> BigDecimal {
    BigDecimal::from_str(&val.to_string()).unwrap_or_else(|_| BigDecimal::from(0))
}

/// Deterministic invoice number: center code, billing period, sequence within
/// the batch. Collisions are ruled out by the per-period idempotency guard in
/// the generator, not by this format.
pub fn invoice_number(center_code: &str, year: i32, month: u32, seq: u32) -> String {
    format!("{center_code}-{year}{month:02}-{seq:04}")
}

/// First day of the billing period and first day of the next one.
pub fn period_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, next))
}

/// A snapshot line for a new invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceLine {
    pub fee_heading: String,
    pub amount: BigDecimal,
}

/// Combine the fee-structure items with the custom fees in force on the
/// invoice date. Custom fees with a later `effective_from` are excluded.
pub fn build_invoice_lines(
    structure_items: Vec<(String, BigDecimal)>,
    custom_fees: Vec<(String, BigDecimal, NaiveDate)>,
    invoice_date: NaiveDate,
) -> (Vec<InvoiceLine>, BigDecimal) {
    let mut lines: Vec<InvoiceLine> = structure_items
        .into_iter()
        .map(|(fee_heading, amount)| InvoiceLine {
            fee_heading,
            amount,
        })
        .collect();
    lines.extend(
        custom_fees
            .into_iter()
            .filter(|(_, _, effective_from)| *effective_from <= invoice_date)
            .map(|(fee_heading, amount, _)| InvoiceLine {
                fee_heading,
                amount,
            }),
    );
    let total = lines
        .iter()
        .fold(BigDecimal::from(0), |acc, line| acc + &line.amount);
    (lines, total)
}

#[derive(Debug, PartialEq)]
pub struct PaymentTransition {
    pub new_paid: BigDecimal,
    pub new_remaining: BigDecimal,
    pub new_status: &'static str,
}

#[derive(Debug, PartialEq)]
pub enum PaymentError {
    NonPositiveAmount,
    ExceedsRemaining,
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveAmount => write!(f, "Payment amount must be positive"),
            Self::ExceedsRemaining => {
                write!(f, "Payment amount exceeds the invoice's remaining balance")
            }
        }
    }
}

/// Validate a payment against the invoice totals and compute the resulting
/// state. Client-side checks are advisory; this runs on every recorded
/// payment.
pub fn payment_transition(
    total: &BigDecimal,
    paid: &BigDecimal,
    amount: &BigDecimal,
) -> Result<PaymentTransition, PaymentError> {
    if *amount <= BigDecimal::from(0) {
        return Err(PaymentError::NonPositiveAmount);
    }
    let remaining = total - paid;
    if *amount > remaining {
        return Err(PaymentError::ExceedsRemaining);
    }
    let new_paid = paid + amount;
    let new_remaining = total - &new_paid;
    let new_status = if new_remaining == BigDecimal::from(0) {
        STATUS_PAID
    } else {
        STATUS_PARTIAL
    };
    Ok(PaymentTransition {
        new_paid,
        new_remaining,
        new_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_number_is_deterministic() {
        assert_eq!(invoice_number("NORTH", 2026, 3, 7), "NORTH-202603-0007");
        assert_eq!(invoice_number("NORTH", 2026, 11, 42), "NORTH-202611-0042");
    }

    #[test]
    fn period_bounds_wrap_the_year() {
        let (start, next) = period_bounds(2026, 12).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
        assert_eq!(next, NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
        assert!(period_bounds(2026, 13).is_none());
    }

    #[test]
    fn lines_include_effective_custom_fees_only() {
        let invoice_date = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let (lines, total) = build_invoice_lines(
            vec![
                ("Tuition".to_string(), bd(400.0)),
                ("Materials".to_string(), bd(100.0)),
            ],
            vec![
                (
                    "Transport".to_string(),
                    bd(50.0),
                    NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
                ),
                (
                    "Excursion".to_string(),
                    bd(75.0),
                    NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
                ),
            ],
            invoice_date,
        );
        assert_eq!(lines.len(), 3);
        assert_eq!(total, bd(550.0));
    }

    #[test]
    fn custom_fee_effective_on_invoice_date_counts() {
        let invoice_date = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let (lines, total) = build_invoice_lines(
            vec![("Tuition".to_string(), bd(500.0))],
            vec![("Transport".to_string(), bd(50.0), invoice_date)],
            invoice_date,
        );
        assert_eq!(lines.len(), 2);
        assert_eq!(total, bd(550.0));
    }

    #[test]
    fn full_payment_settles_the_invoice() {
        let t = payment_transition(&bd(550.0), &bd(0.0), &bd(550.0)).unwrap();
        assert_eq!(t.new_status, STATUS_PAID);
        assert_eq!(t.new_remaining, bd(0.0));
        assert_eq!(t.new_paid, bd(550.0));
    }

    #[test]
    fn partial_payment_marks_partial() {
        let t = payment_transition(&bd(550.0), &bd(0.0), &bd(200.0)).unwrap();
        assert_eq!(t.new_status, STATUS_PARTIAL);
        assert_eq!(t.new_remaining, bd(350.0));

        let t = payment_transition(&bd(550.0), &t.new_paid, &bd(350.0)).unwrap();
        assert_eq!(t.new_status, STATUS_PAID);
        assert_eq!(t.new_remaining, bd(0.0));
    }

    #[test]
    fn overpayment_and_non_positive_amounts_are_rejected() {
        assert_eq!(
            payment_transition(&bd(100.0), &bd(50.0), &bd(60.0)),
            Err(PaymentError::ExceedsRemaining)
        );
        assert_eq!(
            payment_transition(&bd(100.0), &bd(0.0), &bd(0.0)),
            Err(PaymentError::NonPositiveAmount)
        );
        assert_eq!(
            payment_transition(&bd(100.0), &bd(0.0), &bd(-5.0)),
            Err(PaymentError::NonPositiveAmount)
        );
    }
}
