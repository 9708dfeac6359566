//! Accounting sink: exports settlement documents to an external bookkeeping
//! system.
//!
//! Sync is a secondary step performed after the settlement document already
//! exists; nothing on this path may crash or block the settlement flows.
//! Every provider failure is caught at this boundary and returned as a
//! structured outcome.

use async_trait::async_trait;
use chrono::NaiveDate;
use linehaul_shared::{Job, SettlementDocument, SettlementKind};
use reqwest::header::CONTENT_TYPE;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::billing::totals::JobTotals;
use crate::config::AccountingConfig;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("accounting request failed: {0}")]
    Transport(String),
    #[error("accounting API returned {status}: {detail}")]
    Api { status: u16, detail: String },
    /// The provider answered with something that is not JSON, typically an
    /// HTML login redirect when the API key has expired.
    #[error("unexpected {content_type} response from accounting API (status {status})")]
    UnexpectedResponse { status: u16, content_type: String },
}

/// Generic receivable/payable shape pushed to the bookkeeping system.
#[derive(Debug, Clone, Serialize)]
pub struct AccountingDocument {
    /// Settlement document ID, used as the external reference.
    pub reference: String,
    pub counterparty: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub subtotal: Decimal,
    pub line_items: Vec<AccountingLineItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountingLineItem {
    pub description: String,
    pub amount: Decimal,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccountingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Best-effort connection probe, diagnostic only. The create operations
    /// do not depend on it and handle their own failures.
    async fn is_connected(&self) -> bool;

    /// Create a receivable (customer invoice). Returns the provider's
    /// reference for the created document.
    async fn create_invoice(&self, doc: &AccountingDocument) -> Result<String, ProviderError>;

    /// Create a payable (vendor bill) for a driver payout.
    async fn create_bill(&self, doc: &AccountingDocument) -> Result<String, ProviderError>;

    async fn get_payment_status(&self, reference: &str) -> Result<String, ProviderError>;
}

/// Log-only provider used when no bookkeeping system is configured.
pub struct OfflineAccountingProvider;

#[async_trait]
impl AccountingProvider for OfflineAccountingProvider {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn is_connected(&self) -> bool {
        false
    }

    async fn create_invoice(&self, doc: &AccountingDocument) -> Result<String, ProviderError> {
        tracing::info!(
            reference = %doc.reference,
            counterparty = %doc.counterparty,
            subtotal = %doc.subtotal,
            "accounting sync disabled, invoice recorded locally only"
        );
        Ok(format!("offline-{}", doc.reference))
    }

    async fn create_bill(&self, doc: &AccountingDocument) -> Result<String, ProviderError> {
        tracing::info!(
            reference = %doc.reference,
            counterparty = %doc.counterparty,
            subtotal = %doc.subtotal,
            "accounting sync disabled, bill recorded locally only"
        );
        Ok(format!("offline-{}", doc.reference))
    }

    async fn get_payment_status(&self, _reference: &str) -> Result<String, ProviderError> {
        Ok("unknown".to_string())
    }
}

/// HTTP provider for a hosted bookkeeping API.
pub struct HttpAccountingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpAccountingProvider {
    pub fn new(config: &AccountingConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    async fn post_document(
        &self,
        path: &str,
        doc: &AccountingDocument,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(doc)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let body = Self::read_json(response).await?;
        Ok(body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(&doc.reference)
            .to_string())
    }

    /// Parse a response as JSON only after checking the content type, so an
    /// auth redirect serving HTML becomes a descriptive error.
    async fn read_json(response: reqwest::Response) -> Result<Value, ProviderError> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        if !content_type.starts_with("application/json") {
            return Err(ProviderError::UnexpectedResponse {
                status: status.as_u16(),
                content_type,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            let detail = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no detail")
                .to_string();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl AccountingProvider for HttpAccountingProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn is_connected(&self) -> bool {
        let url = format!("{}/ping", self.base_url);
        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::debug!("accounting connection probe failed: {}", err);
                false
            }
        }
    }

    async fn create_invoice(&self, doc: &AccountingDocument) -> Result<String, ProviderError> {
        self.post_document("invoices", doc).await
    }

    async fn create_bill(&self, doc: &AccountingDocument) -> Result<String, ProviderError> {
        self.post_document("bills", doc).await
    }

    async fn get_payment_status(&self, reference: &str) -> Result<String, ProviderError> {
        let url = format!("{}/documents/{}/payment-status", self.base_url, reference);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let body = Self::read_json(response).await?;
        Ok(body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }
}

/// Outcome of a sync attempt, safe to return straight to the caller.
#[derive(Debug, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub reference: Option<String>,
}

/// Export a billing note as a receivable invoice.
pub async fn sync_billing_note_to_invoice(
    provider: &dyn AccountingProvider,
    note: &SettlementDocument,
    jobs: &[Job],
) -> SyncOutcome {
    let doc = to_accounting_document(note, jobs, SettlementKind::BillingNote);
    match provider.create_invoice(&doc).await {
        Ok(reference) => SyncOutcome {
            success: true,
            message: format!("billing note {} exported as invoice {}", note.id, reference),
            reference: Some(reference),
        },
        Err(err) => {
            tracing::error!(settlement = %note.id, error = %err, "invoice sync failed");
            SyncOutcome {
                success: false,
                message: err.to_string(),
                reference: None,
            }
        }
    }
}

/// Export a driver payment as a payable bill.
pub async fn sync_driver_payment_to_bill(
    provider: &dyn AccountingProvider,
    payment: &SettlementDocument,
    jobs: &[Job],
) -> SyncOutcome {
    let doc = to_accounting_document(payment, jobs, SettlementKind::DriverPayment);
    match provider.create_bill(&doc).await {
        Ok(reference) => SyncOutcome {
            success: true,
            message: format!("driver payment {} exported as bill {}", payment.id, reference),
            reference: Some(reference),
        },
        Err(err) => {
            tracing::error!(settlement = %payment.id, error = %err, "bill sync failed");
            SyncOutcome {
                success: false,
                message: err.to_string(),
                reference: None,
            }
        }
    }
}

/// Line items are re-derived from the jobs rather than read back from the
/// document, so an export always reflects the current job amounts.
pub(crate) fn to_accounting_document(
    settlement: &SettlementDocument,
    jobs: &[Job],
    kind: SettlementKind,
) -> AccountingDocument {
    let line_items: Vec<AccountingLineItem> = jobs
        .iter()
        .map(|job| AccountingLineItem {
            description: describe_job(job),
            amount: JobTotals::compute(job).amount_for(kind),
        })
        .collect();

    let subtotal = line_items.iter().map(|l| l.amount).sum();

    AccountingDocument {
        reference: settlement.id.clone(),
        counterparty: settlement.counterparty_name.clone(),
        issue_date: settlement.billing_date,
        due_date: settlement.due_date,
        subtotal,
        line_items,
    }
}

fn describe_job(job: &Job) -> String {
    match (&job.origin, &job.destination) {
        (Some(origin), Some(destination)) => {
            format!("Transport {} ({} to {})", job.job_id, origin, destination)
        }
        _ => format!("Transport {}", job.job_id),
    }
}
