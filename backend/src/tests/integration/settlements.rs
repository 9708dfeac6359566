//! End-to-end settlement writer flows against the in-memory store:
//! creation with linking, compensation on partial failure, recall, and
//! status updates.

use std::sync::atomic::Ordering;

use chrono::NaiveDate;
use linehaul_shared::SettlementKind;
use rust_decimal::Decimal;
use serde_json::json;

use crate::billing::store::StoreError;
use crate::billing::writer::{self, BillingError, CreateSettlementRequest};
use crate::tests::fixtures;
use crate::tests::helpers::MemoryBillingStore;

fn request(job_ids: &[&str], counterparty: &str) -> CreateSettlementRequest {
    CreateSettlementRequest {
        job_ids: job_ids.iter().map(|s| s.to_string()).collect(),
        counterparty_name: counterparty.to_string(),
        billing_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        due_date: None,
    }
}

#[tokio::test]
async fn test_create_billing_note_links_jobs_and_persists_subtotal() {
    let store = MemoryBillingStore::with_jobs(vec![
        fixtures::job("JOB-202401-0001", Some(1000), Some(700)),
        fixtures::job_with_extras(
            "JOB-202401-0002",
            Some(500),
            Some(400),
            json!([{"type": "toll", "cost_driver": 50, "charge_cust": 80}]),
        ),
    ]);

    let created = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0001", "JOB-202401-0002"], "Acme Logistics"),
        &fixtures::billing_clerk("BKK"),
    )
    .await
    .unwrap();

    assert!(created.id.starts_with("BN-"));
    assert_eq!(created.total_amount, Decimal::from(1580));
    assert_eq!(created.job_count, 2);

    let doc = store
        .settlement(SettlementKind::BillingNote, &created.id)
        .unwrap();
    assert_eq!(doc.status, "pending");
    assert_eq!(doc.counterparty_name, "Acme Logistics");
    assert_eq!(doc.branch_id.as_deref(), Some("BKK"));
    // Pre-withholding subtotal is what gets persisted.
    assert_eq!(doc.total_amount, Decimal::from(1580));

    for job_id in ["JOB-202401-0001", "JOB-202401-0002"] {
        let job = store.job(job_id).unwrap();
        assert_eq!(job.billing_note_id.as_deref(), Some(created.id.as_str()));
        assert_eq!(job.driver_payment_id, None);
    }
}

#[tokio::test]
async fn test_create_driver_payment_uses_driver_amounts() {
    let store = MemoryBillingStore::with_jobs(vec![
        fixtures::job("JOB-202401-0003", Some(9999), Some(700)),
        fixtures::job_with_extras(
            "JOB-202401-0004",
            Some(9999),
            Some(300),
            json!([{"type": "labor", "cost_driver": 100, "charge_cust": 0}]),
        ),
    ]);

    let created = writer::create_settlement(
        &store,
        SettlementKind::DriverPayment,
        &request(&["JOB-202401-0003", "JOB-202401-0004"], "Somchai P."),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    assert!(created.id.starts_with("DP-"));
    assert_eq!(created.total_amount, Decimal::from(1100));

    let job = store.job("JOB-202401-0004").unwrap();
    assert_eq!(job.driver_payment_id.as_deref(), Some(created.id.as_str()));
    assert_eq!(job.billing_note_id, None);
}

#[tokio::test]
async fn test_create_rejects_empty_selection_before_any_write() {
    let store = MemoryBillingStore::default();

    let err = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&[], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BillingError::Validation(_)));
    assert_eq!(store.settlement_count(), 0);
}

#[tokio::test]
async fn test_create_rejects_blank_counterparty() {
    let store =
        MemoryBillingStore::with_jobs(vec![fixtures::job("JOB-202401-0005", Some(100), None)]);

    let err = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0005"], "   "),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BillingError::Validation(_)));
    assert_eq!(store.settlement_count(), 0);
    assert_eq!(store.job("JOB-202401-0005").unwrap().billing_note_id, None);
}

#[tokio::test]
async fn test_create_rejects_unknown_job() {
    let store =
        MemoryBillingStore::with_jobs(vec![fixtures::job("JOB-202401-0006", Some(100), None)]);

    let err = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0006", "JOB-999999-0000"], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap_err();

    match err {
        BillingError::Validation(msg) => assert!(msg.contains("JOB-999999-0000")),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(store.settlement_count(), 0);
}

#[tokio::test]
async fn test_create_rejects_already_settled_job() {
    let mut settled = fixtures::job("JOB-202401-0007", Some(100), None);
    settled.billing_note_id = Some("BN-202401-0001".to_string());
    let store = MemoryBillingStore::with_jobs(vec![settled]);

    let err = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0007"], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BillingError::JobUnavailable(_)));
    assert_eq!(store.settlement_count(), 0);
    // The existing link is untouched.
    assert_eq!(
        store.job("JOB-202401-0007").unwrap().billing_note_id.as_deref(),
        Some("BN-202401-0001")
    );
}

#[tokio::test]
async fn test_billed_job_can_still_join_a_driver_payment() {
    let mut billed = fixtures::job("JOB-202401-0008", Some(100), Some(80));
    billed.billing_note_id = Some("BN-202401-0002".to_string());
    let store = MemoryBillingStore::with_jobs(vec![billed]);

    let created = writer::create_settlement(
        &store,
        SettlementKind::DriverPayment,
        &request(&["JOB-202401-0008"], "Somchai P."),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    let job = store.job("JOB-202401-0008").unwrap();
    assert_eq!(job.billing_note_id.as_deref(), Some("BN-202401-0002"));
    assert_eq!(job.driver_payment_id.as_deref(), Some(created.id.as_str()));
}

#[tokio::test]
async fn test_create_retries_after_id_collision() {
    let store =
        MemoryBillingStore::with_jobs(vec![fixtures::job("JOB-202401-0009", Some(100), None)]);
    store.conflicts_remaining.store(1, Ordering::SeqCst);

    let created = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0009"], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    assert!(store.settlement(SettlementKind::BillingNote, &created.id).is_some());
}

#[tokio::test]
async fn test_create_surfaces_persistent_id_conflicts() {
    let store =
        MemoryBillingStore::with_jobs(vec![fixtures::job("JOB-202401-0010", Some(100), None)]);
    store.conflicts_remaining.store(10, Ordering::SeqCst);

    let err = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0010"], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BillingError::Store(StoreError::Conflict(_))));
    assert_eq!(store.settlement_count(), 0);
    assert_eq!(store.job("JOB-202401-0010").unwrap().billing_note_id, None);
}

#[tokio::test]
async fn test_create_compensates_when_linking_fails() {
    let store = MemoryBillingStore::with_jobs(vec![
        fixtures::job("JOB-202401-0011", Some(100), None),
        fixtures::job("JOB-202401-0012", Some(200), None),
        fixtures::job("JOB-202401-0013", Some(300), None),
    ]);
    *store.link_budget.lock().unwrap() = Some(1);

    let err = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(
            &["JOB-202401-0011", "JOB-202401-0012", "JOB-202401-0013"],
            "Acme Corp",
        ),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BillingError::Store(StoreError::Database(_))));

    // The document is gone and the already-claimed job was released.
    assert_eq!(store.settlement_count(), 0);
    for job_id in ["JOB-202401-0011", "JOB-202401-0012", "JOB-202401-0013"] {
        assert_eq!(store.job(job_id).unwrap().billing_note_id, None);
    }
}

#[tokio::test]
async fn test_lost_claim_race_rolls_back_document() {
    // JOB-0014 was claimed by a concurrent settlement after our fetch: the
    // read sees it unsettled, the conditional link then claims zero rows.
    let mut contested = fixtures::job("JOB-202401-0014", Some(100), None);
    contested.billing_note_id = Some("BN-202401-0099".to_string());
    let store = MemoryBillingStore::with_jobs(vec![
        contested,
        fixtures::job("JOB-202401-0015", Some(200), None),
    ]);
    store.serve_stale_reads.store(true, Ordering::SeqCst);

    let err = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0014", "JOB-202401-0015"], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BillingError::JobUnavailable(_)));
    assert_eq!(store.settlement_count(), 0);
    // The concurrent winner keeps the job; our other candidate is released.
    assert_eq!(
        store.job("JOB-202401-0014").unwrap().billing_note_id.as_deref(),
        Some("BN-202401-0099")
    );
    assert_eq!(store.job("JOB-202401-0015").unwrap().billing_note_id, None);
}

#[tokio::test]
async fn test_recall_returns_jobs_to_unsettled() {
    let store = MemoryBillingStore::with_jobs(vec![
        fixtures::job("JOB-202401-0016", Some(100), None),
        fixtures::job("JOB-202401-0017", Some(200), None),
    ]);

    let created = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0016", "JOB-202401-0017"], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    writer::recall_settlement(
        &store,
        SettlementKind::BillingNote,
        &created.id,
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    assert!(store.settlement(SettlementKind::BillingNote, &created.id).is_none());
    for job_id in ["JOB-202401-0016", "JOB-202401-0017"] {
        assert_eq!(store.job(job_id).unwrap().billing_note_id, None);
    }
}

#[tokio::test]
async fn test_recall_only_releases_its_own_jobs() {
    let store = MemoryBillingStore::with_jobs(vec![
        fixtures::job("JOB-202401-0018", Some(100), None),
        fixtures::job("JOB-202401-0019", Some(200), None),
    ]);

    let first = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0018"], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();
    let second = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0019"], "Globex Ltd"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    writer::recall_settlement(
        &store,
        SettlementKind::BillingNote,
        &first.id,
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    assert_eq!(store.job("JOB-202401-0018").unwrap().billing_note_id, None);
    assert_eq!(
        store.job("JOB-202401-0019").unwrap().billing_note_id.as_deref(),
        Some(second.id.as_str())
    );
}

#[tokio::test]
async fn test_recall_requires_super_admin() {
    let store =
        MemoryBillingStore::with_jobs(vec![fixtures::job("JOB-202401-0020", Some(100), None)]);

    let created = writer::create_settlement(
        &store,
        SettlementKind::DriverPayment,
        &request(&["JOB-202401-0020"], "Somchai P."),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    let err = writer::recall_settlement(
        &store,
        SettlementKind::DriverPayment,
        &created.id,
        &fixtures::billing_clerk("BKK"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BillingError::Forbidden(_)));
    // Store state unchanged.
    assert!(store.settlement(SettlementKind::DriverPayment, &created.id).is_some());
    assert_eq!(
        store.job("JOB-202401-0020").unwrap().driver_payment_id.as_deref(),
        Some(created.id.as_str())
    );
}

#[tokio::test]
async fn test_recall_of_missing_settlement_is_not_found() {
    let store = MemoryBillingStore::default();

    let err = writer::recall_settlement(
        &store,
        SettlementKind::DriverPayment,
        "DP-202401-0001",
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BillingError::NotFound(_)));
}

#[tokio::test]
async fn test_recall_surfaces_delete_failure_after_unlink() {
    let store =
        MemoryBillingStore::with_jobs(vec![fixtures::job("JOB-202401-0021", Some(100), None)]);

    let created = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0021"], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    store.fail_deletes.store(true, Ordering::SeqCst);
    let err = writer::recall_settlement(
        &store,
        SettlementKind::BillingNote,
        &created.id,
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BillingError::Store(StoreError::Database(_))));
    // The unlink committed before the delete failed: jobs are unsettled but
    // the document row survives. Reported, not unwound.
    assert_eq!(store.job("JOB-202401-0021").unwrap().billing_note_id, None);
    assert!(store.settlement(SettlementKind::BillingNote, &created.id).is_some());
}

#[tokio::test]
async fn test_set_status_marks_paid_and_touches_timestamp() {
    let store =
        MemoryBillingStore::with_jobs(vec![fixtures::job("JOB-202401-0022", Some(100), None)]);

    let created = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0022"], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    writer::set_status(&store, SettlementKind::BillingNote, &created.id, "paid")
        .await
        .unwrap();

    let doc = store
        .settlement(SettlementKind::BillingNote, &created.id)
        .unwrap();
    assert_eq!(doc.status, "paid");
    assert!(doc.updated_at.is_some());
}

#[tokio::test]
async fn test_set_status_rejects_unknown_status() {
    let store =
        MemoryBillingStore::with_jobs(vec![fixtures::job("JOB-202401-0023", Some(100), None)]);

    let created = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0023"], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    let err = writer::set_status(&store, SettlementKind::BillingNote, &created.id, "archived")
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Validation(_)));
    let doc = store
        .settlement(SettlementKind::BillingNote, &created.id)
        .unwrap();
    assert_eq!(doc.status, "pending");
}

#[tokio::test]
async fn test_set_status_of_missing_settlement_is_not_found() {
    let store = MemoryBillingStore::default();

    let err = writer::set_status(&store, SettlementKind::BillingNote, "BN-202401-0001", "paid")
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::NotFound(_)));
}

#[tokio::test]
async fn test_duplicate_job_ids_are_deduplicated() {
    let store =
        MemoryBillingStore::with_jobs(vec![fixtures::job("JOB-202401-0024", Some(100), None)]);

    let created = writer::create_settlement(
        &store,
        SettlementKind::BillingNote,
        &request(&["JOB-202401-0024", "JOB-202401-0024"], "Acme Corp"),
        &fixtures::admin_ctx(),
    )
    .await
    .unwrap();

    assert_eq!(created.job_count, 1);
    assert_eq!(created.total_amount, Decimal::from(100));
}
