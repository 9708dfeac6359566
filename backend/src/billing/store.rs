//! Persistence seam for the settlement engine.
//!
//! The engine only ever talks to this trait; production binds it to the
//! Postgres pool, tests bind it to an in-memory implementation. Job linking
//! is a conditional update that claims the job only while it is unsettled,
//! so two overlapping settlement attempts cannot silently double-link a job.

use async_trait::async_trait;
use linehaul_shared::{Job, SettlementDocument, SettlementKind};
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Primary-key or unique-constraint conflict, retryable with a new ID.
    #[error("duplicate key: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.message().to_string());
            }
        }
        StoreError::Database(err.to_string())
    }
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn fetch_jobs(&self, job_ids: &[String]) -> Result<Vec<Job>, StoreError>;

    async fn insert_settlement(
        &self,
        kind: SettlementKind,
        doc: &SettlementDocument,
    ) -> Result<(), StoreError>;

    /// Claim a job for a settlement. Only succeeds while the job's link for
    /// this direction is still null; returns whether a row was claimed.
    async fn link_job(
        &self,
        kind: SettlementKind,
        job_id: &str,
        settlement_id: &str,
    ) -> Result<bool, StoreError>;

    /// Clear one job's link for this direction (compensation path).
    async fn unlink_job(&self, kind: SettlementKind, job_id: &str) -> Result<(), StoreError>;

    /// Clear the link on every job referencing this settlement. Returns the
    /// number of jobs released.
    async fn unlink_all(
        &self,
        kind: SettlementKind,
        settlement_id: &str,
    ) -> Result<u64, StoreError>;

    /// Delete the settlement document row. Returns whether it existed.
    async fn delete_settlement(
        &self,
        kind: SettlementKind,
        settlement_id: &str,
    ) -> Result<bool, StoreError>;

    /// Single-field status update with a timestamp touch. Returns whether
    /// the document existed.
    async fn set_status(
        &self,
        kind: SettlementKind,
        settlement_id: &str,
        status: &str,
    ) -> Result<bool, StoreError>;

    async fn fetch_settlement(
        &self,
        kind: SettlementKind,
        settlement_id: &str,
    ) -> Result<Option<SettlementDocument>, StoreError>;

    /// Reverse lookup: jobs whose link column points at this settlement.
    async fn jobs_for_settlement(
        &self,
        kind: SettlementKind,
        settlement_id: &str,
    ) -> Result<Vec<Job>, StoreError>;
}

/// Table holding the settlement documents for a direction.
pub(crate) fn table(kind: SettlementKind) -> &'static str {
    match kind {
        SettlementKind::BillingNote => "billing_notes",
        SettlementKind::DriverPayment => "driver_payments",
    }
}

/// Primary-key column of the document table; also the link column on jobs.
pub(crate) fn id_column(kind: SettlementKind) -> &'static str {
    match kind {
        SettlementKind::BillingNote => "billing_note_id",
        SettlementKind::DriverPayment => "driver_payment_id",
    }
}

pub(crate) fn counterparty_column(kind: SettlementKind) -> &'static str {
    match kind {
        SettlementKind::BillingNote => "customer_name",
        SettlementKind::DriverPayment => "driver_name",
    }
}

pub(crate) const JOB_COLUMNS: &str = "job_id, branch_id, customer_name, driver_name, \
     vehicle_reg, job_date, origin, destination, price_cust_total, cost_driver_total, \
     extra_costs, billing_note_id, driver_payment_id, created_at, updated_at";

/// SELECT list mapping a document table onto [`SettlementDocument`].
pub(crate) fn settlement_columns(kind: SettlementKind) -> String {
    format!(
        "{} AS id, {} AS counterparty_name, billing_date, due_date, branch_id, \
         total_amount, status, created_at, updated_at",
        id_column(kind),
        counterparty_column(kind)
    )
}

/// Production store backed by the shared Postgres pool.
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn fetch_jobs(&self, job_ids: &[String]) -> Result<Vec<Job>, StoreError> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE job_id = ANY($1) ORDER BY job_id",
            JOB_COLUMNS
        );
        let jobs = sqlx::query_as::<_, Job>(&sql)
            .bind(job_ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(jobs)
    }

    async fn insert_settlement(
        &self,
        kind: SettlementKind,
        doc: &SettlementDocument,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} ({}, {}, billing_date, due_date, branch_id, total_amount, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            table(kind),
            id_column(kind),
            counterparty_column(kind)
        );
        sqlx::query(&sql)
            .bind(&doc.id)
            .bind(&doc.counterparty_name)
            .bind(doc.billing_date)
            .bind(doc.due_date)
            .bind(&doc.branch_id)
            .bind(doc.total_amount)
            .bind(&doc.status)
            .bind(doc.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn link_job(
        &self,
        kind: SettlementKind,
        job_id: &str,
        settlement_id: &str,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE jobs SET {col} = $1, updated_at = NOW() WHERE job_id = $2 AND {col} IS NULL",
            col = id_column(kind)
        );
        let result = sqlx::query(&sql)
            .bind(settlement_id)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn unlink_job(&self, kind: SettlementKind, job_id: &str) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE jobs SET {} = NULL, updated_at = NOW() WHERE job_id = $1",
            id_column(kind)
        );
        sqlx::query(&sql).bind(job_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn unlink_all(
        &self,
        kind: SettlementKind,
        settlement_id: &str,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE jobs SET {col} = NULL, updated_at = NOW() WHERE {col} = $1",
            col = id_column(kind)
        );
        let result = sqlx::query(&sql)
            .bind(settlement_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_settlement(
        &self,
        kind: SettlementKind,
        settlement_id: &str,
    ) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE {} = $1", table(kind), id_column(kind));
        let result = sqlx::query(&sql)
            .bind(settlement_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_status(
        &self,
        kind: SettlementKind,
        settlement_id: &str,
        status: &str,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE {} SET status = $1, updated_at = NOW() WHERE {} = $2",
            table(kind),
            id_column(kind)
        );
        let result = sqlx::query(&sql)
            .bind(status)
            .bind(settlement_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_settlement(
        &self,
        kind: SettlementKind,
        settlement_id: &str,
    ) -> Result<Option<SettlementDocument>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            settlement_columns(kind),
            table(kind),
            id_column(kind)
        );
        let doc = sqlx::query_as::<_, SettlementDocument>(&sql)
            .bind(settlement_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    async fn jobs_for_settlement(
        &self,
        kind: SettlementKind,
        settlement_id: &str,
    ) -> Result<Vec<Job>, StoreError> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE {} = $1 ORDER BY job_date, job_id",
            JOB_COLUMNS,
            id_column(kind)
        );
        let jobs = sqlx::query_as::<_, Job>(&sql)
            .bind(settlement_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(jobs)
    }
}
