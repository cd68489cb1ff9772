use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{require_session, ActorRole, SessionUser};
use crate::finance::generator::generate_invoices;
use crate::finance::{
    bd, payment_transition, GenerationLog, Invoice, InvoiceItem, LedgerEntry, Payment,
    PaymentError, ENTRY_TYPE_PAYMENT,
};
use crate::shared::schema::{
    invoice_generation_logs, invoice_items, invoices, ledger_entries, payments,
};
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InvoiceListQuery {
    pub status: Option<String>,
    pub student_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceWithDetails {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateInvoicesRequest {
    pub center_id: Uuid,
    pub month: u32,
    pub year: i32,
}

#[derive(Debug, Serialize)]
pub struct GenerateInvoicesResponse {
    pub success: bool,
    pub invoices_generated: i32,
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub invoice_id: Uuid,
    pub amount: f64,
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

fn finance_scope(session: &SessionUser, center_id: Uuid) -> Result<(), (StatusCode, String)> {
    if session.role == ActorRole::Admin {
        return Ok(());
    }
    if session.role.is_center_level() && session.center_id == Some(center_id) {
        return Ok(());
    }
    Err((
        StatusCode::FORBIDDEN,
        "Not authorized for this center's finance records".to_string(),
    ))
}

pub async fn list_invoices(
    State(state): State<Arc<AppState>>,
    Path(center_id): Path<Uuid>,
    Query(query): Query<InvoiceListQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Invoice>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    finance_scope(&session, center_id)?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut q = invoices::table
        .filter(invoices::center_id.eq(center_id))
        .into_boxed();
    if let Some(status) = query.status {
        q = q.filter(invoices::status.eq(status));
    }
    if let Some(student_id) = query.student_id {
        q = q.filter(invoices::student_id.eq(student_id));
    }

    let rows: Vec<Invoice> = q
        .order(invoices::invoice_date.desc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

/// Invoices past their due date with a balance still outstanding.
pub async fn list_overdue_invoices(
    State(state): State<Arc<AppState>>,
    Path(center_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<Invoice>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    finance_scope(&session, center_id)?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let today = Utc::now().date_naive();
    let rows: Vec<Invoice> = invoices::table
        .filter(invoices::center_id.eq(center_id))
        .filter(invoices::due_date.lt(today))
        .filter(invoices::remaining_amount.gt(bd(0.0)))
        .order(invoices::due_date.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<InvoiceWithDetails>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let invoice: Invoice = invoices::table
        .filter(invoices::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Invoice not found".to_string()))?;

    finance_scope(&session, invoice.center_id)?;

    let items: Vec<InvoiceItem> = invoice_items::table
        .filter(invoice_items::invoice_id.eq(id))
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    let pays: Vec<Payment> = payments::table
        .filter(payments::invoice_id.eq(id))
        .order(payments::payment_date.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(InvoiceWithDetails {
        invoice,
        items,
        payments: pays,
    }))
}

enum PaymentTxError {
    Db(diesel::result::Error),
    Rejected(PaymentError),
}

impl From<diesel::result::Error> for PaymentTxError {
    fn from(e: diesel::result::Error) -> Self {
        Self::Db(e)
    }
}

pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<Json<Payment>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    // Scope check on a plain read; the row state used for validation is
    // re-read under lock inside the transaction.
    let center_id: Option<Uuid> = invoices::table
        .filter(invoices::id.eq(req.invoice_id))
        .select(invoices::center_id)
        .first(&mut conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    let Some(center_id) = center_id else {
        return Err((StatusCode::NOT_FOUND, "Invoice not found".to_string()));
    };
    finance_scope(&session, center_id)?;

    let amount = bd(req.amount);
    let now = Utc::now();

    // Validation and mutation share one transaction: the invoice row is
    // locked, so two payments racing on the same invoice serialize and the
    // second one validates against the first one's totals.
    let (payment, invoice_number, new_status) = conn
        .transaction::<_, PaymentTxError, _>(|conn| {
            let invoice: Invoice = invoices::table
                .filter(invoices::id.eq(req.invoice_id))
                .for_update()
                .first(conn)?;

            let transition =
                payment_transition(&invoice.total_amount, &invoice.paid_amount, &amount)
                    .map_err(PaymentTxError::Rejected)?;

            let payment = Payment {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                amount: amount.clone(),
                payment_date: now.date_naive(),
                payment_method: req.payment_method,
                reference_number: req.reference_number,
                notes: req.notes,
                status: "completed".to_string(),
                created_at: now,
            };
            diesel::insert_into(payments::table)
                .values(&payment)
                .execute(conn)?;

            diesel::update(invoices::table.filter(invoices::id.eq(invoice.id)))
                .set((
                    invoices::paid_amount.eq(&transition.new_paid),
                    invoices::remaining_amount.eq(&transition.new_remaining),
                    invoices::status.eq(transition.new_status),
                    invoices::updated_at.eq(now),
                ))
                .execute(conn)?;

            let entry = LedgerEntry {
                id: Uuid::new_v4(),
                center_id: invoice.center_id,
                student_id: invoice.student_id,
                entry_type: ENTRY_TYPE_PAYMENT.to_string(),
                reference_id: payment.id,
                reference_table: "payments".to_string(),
                amount: amount.clone(),
                entry_date: now.date_naive(),
                description: Some(format!("Payment for invoice {}", invoice.invoice_number)),
                created_at: now,
            };
            diesel::insert_into(ledger_entries::table)
                .values(&entry)
                .execute(conn)?;

            Ok((payment, invoice.invoice_number, transition.new_status))
        })
        .map_err(|e| match e {
            PaymentTxError::Rejected(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            PaymentTxError::Db(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Payment error: {e}"),
            ),
        })?;

    info!(
        "Recorded payment of {} against invoice {invoice_number}, status now {new_status}",
        payment.amount
    );
    Ok(Json(payment))
}

pub async fn generate_monthly_invoices(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<GenerateInvoicesRequest>,
) -> Result<Json<GenerateInvoicesResponse>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    finance_scope(&session, req.center_id)?;

    if !(1..=12).contains(&req.month) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Invalid month: {}", req.month),
        ));
    }

    let pool = state.conn.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        generate_invoices(&pool, req.center_id, req.month, req.year)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task error: {e}")))??;

    Ok(Json(GenerateInvoicesResponse {
        success: outcome.errors.is_empty(),
        invoices_generated: outcome.invoices_generated,
        errors: outcome.errors,
    }))
}

pub async fn list_student_ledger(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<LedgerEntry>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut q = ledger_entries::table
        .filter(ledger_entries::student_id.eq(student_id))
        .into_boxed();
    if session.role != ActorRole::Admin {
        let Some(center_id) = session.center_id else {
            return Err((
                StatusCode::FORBIDDEN,
                "Not authorized for ledger records".to_string(),
            ));
        };
        q = q.filter(ledger_entries::center_id.eq(center_id));
    }

    let rows: Vec<LedgerEntry> = q
        .order(ledger_entries::entry_date.desc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

pub async fn list_generation_logs(
    State(state): State<Arc<AppState>>,
    Path(center_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<GenerationLog>>, (StatusCode, String)> {
    let session = require_session(&state, &headers).await?;
    finance_scope(&session, center_id)?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<GenerationLog> = invoice_generation_logs::table
        .filter(invoice_generation_logs::center_id.eq(center_id))
        .order(invoice_generation_logs::created_at.desc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

pub fn configure_finance_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/finance/invoices/generate", post(generate_monthly_invoices))
        .route("/api/finance/centers/:center_id/invoices", get(list_invoices))
        .route(
            "/api/finance/centers/:center_id/invoices/overdue",
            get(list_overdue_invoices),
        )
        .route("/api/finance/invoices/:id", get(get_invoice))
        .route("/api/finance/payments", post(record_payment))
        .route("/api/finance/students/:student_id/ledger", get(list_student_ledger))
        .route("/api/finance/centers/:center_id/generation-logs", get(list_generation_logs))
}
