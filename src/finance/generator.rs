//! Monthly invoice batch.
//!
//! One invoice per active student of the center for the billing period. A
//! student with no active fee assignment yields an error entry and the batch
//! moves on; one student's failure never aborts the run. Each student's
//! invoice, item snapshot and ledger entry are written in a single
//! transaction. The batch is idempotent per (center, month, year): a prior
//! generation log or any invoice dated in the period aborts before anything
//! is written.

use axum::http::StatusCode;
use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate, Utc};
use diesel::prelude::*;
use log::{info, warn};
use uuid::Uuid;

use crate::finance::{
    build_invoice_lines, invoice_number, period_bounds, GenerationLog, Invoice, InvoiceItem,
    LedgerEntry, ENTRY_TYPE_INVOICE, STATUS_DUE,
};
use crate::shared::schema::{
    centers, fee_structure_items, invoice_generation_logs, invoice_items, invoices,
    ledger_entries, student_custom_fees, student_fee_assignments, students,
};
use crate::shared::utils::DbPool;

pub struct GenerationOutcome {
    pub invoices_generated: i32,
    pub errors: Vec<String>,
}

/// Per-student result of one batch iteration.
pub enum StudentBilling {
    Invoiced,
    NoFeeAssignment,
    Failed(String),
}

/// Collapse per-student results into the batch totals and error list. One
/// error entry per student that produced no invoice.
pub fn fold_billing_results(results: Vec<(String, StudentBilling)>) -> (i32, Vec<String>) {
    let mut generated: i32 = 0;
    let mut errors: Vec<String> = Vec::new();
    for (name, outcome) in results {
        match outcome {
            StudentBilling::Invoiced => generated += 1,
            StudentBilling::NoFeeAssignment => {
                let msg = format!("No active fee assignment for student {name}");
                warn!("{msg}");
                errors.push(msg);
            }
            StudentBilling::Failed(e) => {
                let msg = format!("Failed to invoice student {name}: {e}");
                warn!("{msg}");
                errors.push(msg);
            }
        }
    }
    (generated, errors)
}

pub fn generation_status(errors: &[String]) -> &'static str {
    if errors.is_empty() {
        "success"
    } else {
        "partial"
    }
}

pub fn generate_invoices(
    pool: &DbPool,
    center_id: Uuid,
    month: u32,
    year: i32,
) -> Result<GenerationOutcome, (StatusCode, String)> {
    let mut conn = pool
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let (period_start, period_end) = period_bounds(year, month).ok_or_else(|| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Invalid period {year}-{month:02}"),
        )
    })?;

    let center_code: String = centers::table
        .filter(centers::id.eq(center_id))
        .select(centers::code)
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Center not found".to_string()))?;

    let already_logged: i64 = invoice_generation_logs::table
        .filter(invoice_generation_logs::center_id.eq(center_id))
        .filter(invoice_generation_logs::month.eq(month as i32))
        .filter(invoice_generation_logs::year.eq(year))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    let already_invoiced: i64 = invoices::table
        .filter(invoices::center_id.eq(center_id))
        .filter(invoices::invoice_date.ge(period_start))
        .filter(invoices::invoice_date.lt(period_end))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if already_logged > 0 || already_invoiced > 0 {
        return Err((
            StatusCode::CONFLICT,
            format!("Invoices for {year}-{month:02} were already generated for this center"),
        ));
    }

    let roster: Vec<(Uuid, String, String)> = students::table
        .filter(students::center_id.eq(center_id))
        .filter(students::is_active.eq(true))
        .select((students::id, students::first_name, students::last_name))
        .order(students::last_name.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let invoice_date = period_start;
    let due_date = invoice_date + Duration::days(14);
    let mut results: Vec<(String, StudentBilling)> = Vec::with_capacity(roster.len());
    let mut seq: u32 = 0;

    for (student_id, first_name, last_name) in &roster {
        let name = format!("{first_name} {last_name}");
        match generate_for_student(
            &mut conn,
            center_id,
            &center_code,
            *student_id,
            invoice_date,
            due_date,
            year,
            month,
            seq + 1,
        ) {
            Ok(Some(number)) => {
                seq += 1;
                info!("Generated invoice {number} for {name}");
                results.push((name, StudentBilling::Invoiced));
            }
            Ok(None) => results.push((name, StudentBilling::NoFeeAssignment)),
            Err(e) => results.push((name, StudentBilling::Failed(e.to_string()))),
        }
    }

    let (generated, errors) = fold_billing_results(results);
    let log = GenerationLog {
        id: Uuid::new_v4(),
        center_id,
        month: month as i32,
        year,
        invoices_generated: generated,
        status: generation_status(&errors).to_string(),
        error_message: if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        },
        created_at: Utc::now(),
    };
    diesel::insert_into(invoice_generation_logs::table)
        .values(&log)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Log error: {e}")))?;

    info!(
        "Invoice generation for center {center_id} {year}-{month:02}: {generated} generated, {} errors",
        errors.len()
    );

    Ok(GenerationOutcome {
        invoices_generated: generated,
        errors,
    })
}

/// Returns `Ok(None)` when the student has no active fee assignment.
#[allow(clippy::too_many_arguments)]
fn generate_for_student(
    conn: &mut PgConnection,
    center_id: Uuid,
    center_code: &str,
    student_id: Uuid,
    invoice_date: NaiveDate,
    due_date: NaiveDate,
    year: i32,
    month: u32,
    seq: u32,
) -> Result<Option<String>, diesel::result::Error> {
    let structure_id: Option<Uuid> = student_fee_assignments::table
        .filter(student_fee_assignments::student_id.eq(student_id))
        .filter(student_fee_assignments::is_active.eq(true))
        .order(student_fee_assignments::assigned_on.desc())
        .select(student_fee_assignments::fee_structure_id)
        .first(conn)
        .optional()?;
    let Some(structure_id) = structure_id else {
        return Ok(None);
    };

    let structure_items: Vec<(String, BigDecimal)> = fee_structure_items::table
        .filter(fee_structure_items::fee_structure_id.eq(structure_id))
        .filter(fee_structure_items::is_active.eq(true))
        .select((fee_structure_items::fee_heading, fee_structure_items::amount))
        .load(conn)?;

    let custom_fees: Vec<(String, BigDecimal, NaiveDate)> = student_custom_fees::table
        .filter(student_custom_fees::student_id.eq(student_id))
        .filter(student_custom_fees::is_active.eq(true))
        .select((
            student_custom_fees::fee_heading,
            student_custom_fees::amount,
            student_custom_fees::effective_from,
        ))
        .load(conn)?;

    let (lines, total) = build_invoice_lines(structure_items, custom_fees, invoice_date);
    let number = invoice_number(center_code, year, month, seq);
    let now = Utc::now();

    let invoice = Invoice {
        id: Uuid::new_v4(),
        center_id,
        student_id,
        invoice_number: number.clone(),
        invoice_date,
        due_date,
        total_amount: total.clone(),
        paid_amount: BigDecimal::from(0),
        remaining_amount: total.clone(),
        status: STATUS_DUE.to_string(),
        created_at: now,
        updated_at: now,
    };

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(invoices::table)
            .values(&invoice)
            .execute(conn)?;

        for line in &lines {
            let item = InvoiceItem {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                fee_heading: line.fee_heading.clone(),
                amount: line.amount.clone(),
                created_at: now,
            };
            diesel::insert_into(invoice_items::table)
                .values(&item)
                .execute(conn)?;
        }

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            center_id,
            student_id,
            entry_type: ENTRY_TYPE_INVOICE.to_string(),
            reference_id: invoice.id,
            reference_table: "invoices".to_string(),
            amount: total.clone(),
            entry_date: invoice_date,
            description: Some(format!("Invoice {number}")),
            created_at: now,
        };
        diesel::insert_into(ledger_entries::table)
            .values(&entry)
            .execute(conn)?;
        Ok(())
    })?;

    Ok(Some(number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_counts_split_between_generated_and_errors() {
        // Five students, two without invoices: three generated, two errors.
        let results = vec![
            ("Ana Ionescu".to_string(), StudentBilling::Invoiced),
            ("Bram de Vries".to_string(), StudentBilling::NoFeeAssignment),
            ("Chloe Martin".to_string(), StudentBilling::Invoiced),
            (
                "Dara Quinn".to_string(),
                StudentBilling::Failed("serialization failure".to_string()),
            ),
            ("Emil Novak".to_string(), StudentBilling::Invoiced),
        ];
        let (generated, errors) = fold_billing_results(results);
        assert_eq!(generated, 3);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("Bram de Vries"));
        assert!(errors[1].contains("Dara Quinn"));
        assert_eq!(generation_status(&errors), "partial");
    }

    #[test]
    fn clean_batch_reports_success() {
        let results = vec![
            ("Ana Ionescu".to_string(), StudentBilling::Invoiced),
            ("Emil Novak".to_string(), StudentBilling::Invoiced),
        ];
        let (generated, errors) = fold_billing_results(results);
        assert_eq!(generated, 2);
        assert!(errors.is_empty());
        assert_eq!(generation_status(&errors), "success");
    }
}
