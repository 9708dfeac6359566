//! Accounting sync behavior: the HTTP provider against a local mock server,
//! and the sync boundary's error containment against a mocked provider.

use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use linehaul_shared::SettlementKind;

use crate::config::AccountingConfig;
use crate::integrations::accounting::{
    self, AccountingProvider, HttpAccountingProvider, MockAccountingProvider,
    OfflineAccountingProvider, ProviderError,
};
use crate::tests::fixtures;

fn http_provider(server: &MockServer) -> HttpAccountingProvider {
    HttpAccountingProvider::new(&AccountingConfig {
        base_url: server.uri(),
        api_key: "test-key".to_string(),
        timeout_secs: 5,
    })
}

fn sample_document() -> accounting::AccountingDocument {
    let jobs = vec![
        fixtures::job("JOB-202401-0001", Some(1000), Some(700)),
        fixtures::job_with_extras(
            "JOB-202401-0002",
            Some(500),
            Some(400),
            json!([{"type": "toll", "cost_driver": 50, "charge_cust": 80}]),
        ),
    ];
    let note = fixtures::settlement("BN-202401-0001", "Acme Logistics", 1580);
    accounting::to_accounting_document(&note, &jobs, SettlementKind::BillingNote)
}

#[tokio::test]
async fn test_offline_provider_succeeds_without_network() {
    let provider = OfflineAccountingProvider;

    assert!(!provider.is_connected().await);

    let reference = provider.create_invoice(&sample_document()).await.unwrap();
    assert_eq!(reference, "offline-BN-202401-0001");

    let status = provider.get_payment_status("BN-202401-0001").await.unwrap();
    assert_eq!(status, "unknown");
}

#[tokio::test]
async fn test_document_mapping_rederives_line_items() {
    let doc = sample_document();

    assert_eq!(doc.reference, "BN-202401-0001");
    assert_eq!(doc.counterparty, "Acme Logistics");
    assert_eq!(doc.line_items.len(), 2);
    assert_eq!(doc.line_items[0].amount, Decimal::from(1000));
    assert_eq!(doc.line_items[1].amount, Decimal::from(580));
    assert_eq!(doc.subtotal, Decimal::from(1580));
    assert!(doc.line_items[0].description.contains("Bangkok to Chiang Mai"));
}

#[tokio::test]
async fn test_http_provider_creates_invoice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ACC-77"})))
        .mount(&server)
        .await;

    let provider = http_provider(&server);
    let reference = provider.create_invoice(&sample_document()).await.unwrap();

    assert_eq!(reference, "ACC-77");
}

#[tokio::test]
async fn test_http_provider_creates_bill() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bills"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ACC-78"})))
        .mount(&server)
        .await;

    let provider = http_provider(&server);
    let reference = provider.create_bill(&sample_document()).await.unwrap();

    assert_eq!(reference, "ACC-78");
}

#[tokio::test]
async fn test_http_provider_rejects_html_response() {
    // An expired API key typically produces an HTML login redirect; that
    // must surface as a descriptive error, not a JSON parse panic.
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>sign in</html>", "text/html"),
        )
        .mount(&server)
        .await;

    let provider = http_provider(&server);
    let err = provider.create_invoice(&sample_document()).await.unwrap_err();

    match err {
        ProviderError::UnexpectedResponse { content_type, .. } => {
            assert!(content_type.starts_with("text/html"));
        }
        other => panic!("expected unexpected-response error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_provider_surfaces_api_error_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"message": "duplicate reference"})),
        )
        .mount(&server)
        .await;

    let provider = http_provider(&server);
    let err = provider.create_invoice(&sample_document()).await.unwrap_err();

    match err {
        ProviderError::Api { status, detail } => {
            assert_eq!(status, 422);
            assert_eq!(detail, "duplicate reference");
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_provider_reads_payment_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/documents/BN-202401-0001/payment-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "paid"})))
        .mount(&server)
        .await;

    let provider = http_provider(&server);
    let status = provider.get_payment_status("BN-202401-0001").await.unwrap();

    assert_eq!(status, "paid");
}

#[tokio::test]
async fn test_connection_probe_is_best_effort() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    assert!(http_provider(&server).is_connected().await);

    // No mock mounted for a fresh server: the probe fails quietly.
    let dead_server = MockServer::start().await;
    assert!(!http_provider(&dead_server).is_connected().await);
}

#[tokio::test]
async fn test_sync_catches_provider_errors() {
    let mut provider = MockAccountingProvider::new();
    provider
        .expect_create_bill()
        .returning(|_| Err(ProviderError::Transport("connection refused".to_string())));

    let payment = fixtures::settlement("DP-202401-0001", "Somchai P.", 1100);
    let jobs = vec![fixtures::job("JOB-202401-0003", Some(0), Some(1100))];

    let outcome = accounting::sync_driver_payment_to_bill(&provider, &payment, &jobs).await;

    assert!(!outcome.success);
    assert!(outcome.message.contains("connection refused"));
    assert_eq!(outcome.reference, None);
}

#[tokio::test]
async fn test_sync_reports_success_with_reference() {
    let mut provider = MockAccountingProvider::new();
    provider
        .expect_create_invoice()
        .withf(|doc| doc.line_items.len() == 2 && doc.subtotal == Decimal::from(1580))
        .returning(|doc| Ok(format!("ACC-{}", doc.reference)));

    let note = fixtures::settlement("BN-202401-0002", "Acme Logistics", 1580);
    let jobs = vec![
        fixtures::job("JOB-202401-0004", Some(1000), None),
        fixtures::job_with_extras(
            "JOB-202401-0005",
            Some(500),
            None,
            json!([{"type": "toll", "cost_driver": 50, "charge_cust": 80}]),
        ),
    ];

    let outcome = accounting::sync_billing_note_to_invoice(&provider, &note, &jobs).await;

    assert!(outcome.success);
    assert_eq!(outcome.reference.as_deref(), Some("ACC-BN-202401-0002"));
    assert!(outcome.message.contains("BN-202401-0002"));
}
