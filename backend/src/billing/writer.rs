//! Settlement creation, recall, and status updates.
//!
//! The document insert and the per-job link updates are separate writes with
//! no surrounding transaction, so a failure between them would strand a
//! half-linked document. The writer compensates: any link failure (including
//! losing a claim race to a concurrent settlement) triggers a best-effort
//! unlink of the jobs already claimed and a delete of the document, with
//! every compensation failure logged as an inconsistency.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use linehaul_shared::{SettlementDocument, SettlementKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthContext;

use super::aggregate::SettlementTotals;
use super::docid;
use super::store::{BillingStore, StoreError};

pub const VALID_STATUSES: [&str; 3] = ["pending", "paid", "cancelled"];

/// Attempts at minting an ID before a persistent conflict is surfaced.
const ID_INSERT_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// The job is already settled in this direction, or was claimed by a
    /// concurrent settlement between fetch and link.
    #[error("job {0} is already included in another settlement")]
    JobUnavailable(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSettlementRequest {
    pub job_ids: Vec<String>,
    pub counterparty_name: String,
    pub billing_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CreatedSettlement {
    pub id: String,
    pub total_amount: Decimal,
    pub job_count: usize,
}

/// Create a settlement document and link the selected jobs to it.
///
/// Validation happens before any I/O; a fetch failure aborts before any
/// write. The persisted `total_amount` is the pre-withholding subtotal.
pub async fn create_settlement<S: BillingStore + ?Sized>(
    store: &S,
    kind: SettlementKind,
    request: &CreateSettlementRequest,
    ctx: &AuthContext,
) -> Result<CreatedSettlement, BillingError> {
    if request.job_ids.is_empty() {
        return Err(BillingError::Validation(
            "at least one job must be selected".to_string(),
        ));
    }
    let counterparty = request.counterparty_name.trim();
    if counterparty.is_empty() {
        return Err(BillingError::Validation(format!(
            "a {} must be selected",
            kind.counterparty_label()
        )));
    }

    let mut job_ids = request.job_ids.clone();
    job_ids.sort();
    job_ids.dedup();

    let jobs = store.fetch_jobs(&job_ids).await?;
    if jobs.len() != job_ids.len() {
        let found: HashSet<&str> = jobs.iter().map(|j| j.job_id.as_str()).collect();
        let missing = job_ids
            .iter()
            .find(|id| !found.contains(id.as_str()))
            .cloned()
            .unwrap_or_default();
        return Err(BillingError::Validation(format!(
            "unknown job {}",
            missing
        )));
    }
    if let Some(linked) = jobs.iter().find(|j| j.settlement_link(kind).is_some()) {
        return Err(BillingError::JobUnavailable(linked.job_id.clone()));
    }

    let totals = SettlementTotals::compute(&jobs, kind);

    let mut doc = SettlementDocument {
        id: String::new(),
        counterparty_name: counterparty.to_string(),
        billing_date: request.billing_date,
        due_date: request.due_date,
        branch_id: ctx.branch_id.clone(),
        total_amount: totals.subtotal,
        status: "pending".to_string(),
        created_at: Utc::now(),
        updated_at: None,
    };

    let mut attempt = 0;
    loop {
        doc.id = docid::generate_document_id(kind);
        match store.insert_settlement(kind, &doc).await {
            Ok(()) => break,
            Err(StoreError::Conflict(_)) if attempt + 1 < ID_INSERT_ATTEMPTS => {
                attempt += 1;
                tracing::warn!(id = %doc.id, "document id collision, regenerating");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let mut claimed: Vec<&str> = Vec::with_capacity(jobs.len());
    for job in &jobs {
        match store.link_job(kind, &job.job_id, &doc.id).await {
            Ok(true) => claimed.push(job.job_id.as_str()),
            Ok(false) => {
                tracing::warn!(
                    job_id = %job.job_id,
                    settlement = %doc.id,
                    "job was claimed by a concurrent settlement, rolling back"
                );
                compensate(store, kind, &doc.id, &claimed).await;
                return Err(BillingError::JobUnavailable(job.job_id.clone()));
            }
            Err(err) => {
                tracing::error!(
                    job_id = %job.job_id,
                    settlement = %doc.id,
                    error = %err,
                    "job linking failed after document insert, rolling back"
                );
                compensate(store, kind, &doc.id, &claimed).await;
                return Err(err.into());
            }
        }
    }

    tracing::info!(
        settlement = %doc.id,
        jobs = totals.job_count,
        total = %totals.subtotal,
        "settlement created"
    );

    Ok(CreatedSettlement {
        id: doc.id,
        total_amount: totals.subtotal,
        job_count: totals.job_count,
    })
}

/// Best-effort compensation after a failed link phase. Failures here leave
/// the store inconsistent and are logged loudly; there is nothing further to
/// unwind.
async fn compensate<S: BillingStore + ?Sized>(
    store: &S,
    kind: SettlementKind,
    settlement_id: &str,
    claimed: &[&str],
) {
    for job_id in claimed {
        if let Err(err) = store.unlink_job(kind, job_id).await {
            tracing::error!(
                job_id = %job_id,
                settlement = %settlement_id,
                error = %err,
                "compensating unlink failed, job left referencing a document about to be deleted"
            );
        }
    }
    if let Err(err) = store.delete_settlement(kind, settlement_id).await {
        tracing::error!(
            settlement = %settlement_id,
            error = %err,
            "compensating delete failed, orphan settlement document left behind"
        );
    }
}

/// Recall a settlement: unlink every job referencing it, then delete the
/// document. The only correction mechanism; there is no partial edit.
pub async fn recall_settlement<S: BillingStore + ?Sized>(
    store: &S,
    kind: SettlementKind,
    settlement_id: &str,
    ctx: &AuthContext,
) -> Result<(), BillingError> {
    if !ctx.is_super_admin() {
        return Err(BillingError::Forbidden(
            "only an administrator may recall a settlement".to_string(),
        ));
    }

    if store.fetch_settlement(kind, settlement_id).await?.is_none() {
        return Err(BillingError::NotFound(format!(
            "settlement {} not found",
            settlement_id
        )));
    }

    let unlinked = store.unlink_all(kind, settlement_id).await?;

    match store.delete_settlement(kind, settlement_id).await {
        Ok(_) => {
            tracing::info!(
                settlement = %settlement_id,
                jobs = unlinked,
                "settlement recalled"
            );
            Ok(())
        }
        Err(err) => {
            // The unlink already committed: the jobs are back to unsettled
            // with no parent document. Not unwound, only reported.
            tracing::error!(
                settlement = %settlement_id,
                jobs = unlinked,
                error = %err,
                "document delete failed after unlinking jobs"
            );
            Err(err.into())
        }
    }
}

/// Update a settlement's status field.
pub async fn set_status<S: BillingStore + ?Sized>(
    store: &S,
    kind: SettlementKind,
    settlement_id: &str,
    status: &str,
) -> Result<(), BillingError> {
    if !VALID_STATUSES.contains(&status) {
        return Err(BillingError::Validation(format!(
            "invalid status '{}'",
            status
        )));
    }

    if store.set_status(kind, settlement_id, status).await? {
        Ok(())
    } else {
        Err(BillingError::NotFound(format!(
            "settlement {} not found",
            settlement_id
        )))
    }
}
