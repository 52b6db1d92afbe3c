//! Integration tests for the CRM client using wiremock: outcome
//! classification, query semantics, retry policy and the
//! external-id-in-URL contract.

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param_contains};
use wiremock::{Mock, MockServer, ResponseTemplate};

use erp_order_sync::crm::{CrmClient, CrmSettings, UpsertKind};
use erp_order_sync::SyncError;

fn settings(base: &str) -> CrmSettings {
    CrmSettings {
        sobject_base_url: format!("{}/services/data/v60.0/sobjects/OrderItem", base),
        external_id_field: "CA_IdExterno__c".to_string(),
        rest_base_url: format!("{}/services/data/v60.0", base),
        timeout: Duration::from_secs(5),
        query_retry_attempts: 2,
    }
}

fn client(server: &MockServer) -> CrmClient {
    CrmClient::new(settings(&server.uri())).unwrap()
}

const UPSERT_PATH: &str = "/services/data/v60.0/sobjects/OrderItem/CA_IdExterno__c/12345-1";

#[tokio::test]
async fn upsert_201_classifies_as_inserted_with_id() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(UPSERT_PATH))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"id": "X1", "success": true, "created": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server)
        .upsert_by_external_id("test-token", "12345-1", &json!({"OrderId": "801X"}))
        .await
        .unwrap();

    assert_eq!(outcome.kind, UpsertKind::Inserted);
    assert_eq!(outcome.status, 201);
    assert_eq!(outcome.record_id.as_deref(), Some("X1"));
}

#[tokio::test]
async fn upsert_204_classifies_as_updated() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(UPSERT_PATH))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let outcome = client(&server)
        .upsert_by_external_id("test-token", "12345-1", &json!({"OrderId": "801X"}))
        .await
        .unwrap();

    assert_eq!(outcome.kind, UpsertKind::Updated);
    assert_eq!(outcome.record_id, None);
}

#[tokio::test]
async fn upsert_other_2xx_is_acknowledged() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(UPSERT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let outcome = client(&server)
        .upsert_by_external_id("test-token", "12345-1", &json!({"OrderId": "801X"}))
        .await
        .unwrap();

    assert_eq!(outcome.kind, UpsertKind::Acknowledged);
}

#[tokio::test]
async fn upsert_failure_surfaces_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(UPSERT_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad field"))
        .mount(&server)
        .await;

    let err = client(&server)
        .upsert_by_external_id("test-token", "12345-1", &json!({"OrderId": "801X"}))
        .await
        .unwrap_err();

    assert_matches!(err, SyncError::CrmApi { status: 400, body } if body == "bad field");
}

#[tokio::test]
async fn upsert_is_never_retried() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(UPSERT_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .upsert_by_external_id("test-token", "12345-1", &json!({"OrderId": "801X"}))
        .await;

    assert!(result.is_err());
    // expect(1) verifies on drop: a retry would trip the mock
}

#[tokio::test]
async fn upsert_body_never_contains_the_external_id() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(UPSERT_PATH))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    client(&server)
        .upsert_by_external_id(
            "test-token",
            "12345-1",
            &json!({"OrderId": "801X", "Quantity": 4.0}),
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("CA_IdExterno__c").is_none());
    // the key rides in the URL instead
    assert!(requests[0].url.path().ends_with("/CA_IdExterno__c/12345-1"));
}

#[tokio::test]
async fn query_returns_first_record() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services/data/v60.0/query"))
        .and(query_param_contains("q", "FROM Order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 2,
            "done": true,
            "records": [
                {"Id": "801A", "Status": "Draft"},
                {"Id": "801B", "Status": "Draft"}
            ]
        })))
        .mount(&server)
        .await;

    let record = client(&server)
        .query_single("test-token", "SELECT Id, Status FROM Order LIMIT 1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record["Id"], "801A");
}

#[tokio::test]
async fn query_with_no_records_returns_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services/data/v60.0/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 0,
            "done": true,
            "records": []
        })))
        .mount(&server)
        .await;

    let record = client(&server)
        .query_single("test-token", "SELECT Id FROM Order LIMIT 1")
        .await
        .unwrap();

    assert!(record.is_none());
}

#[tokio::test]
async fn query_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services/data/v60.0/query"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/services/data/v60.0/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{"Id": "801A"}]
        })))
        .mount(&server)
        .await;

    let record = client(&server)
        .query_single("test-token", "SELECT Id FROM Order LIMIT 1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record["Id"], "801A");
}

#[tokio::test]
async fn query_gives_up_once_the_retry_budget_is_spent() {
    let server = MockServer::start().await;

    // query_retry_attempts = 2, so three calls total
    Mock::given(method("GET"))
        .and(path("/services/data/v60.0/query"))
        .respond_with(ResponseTemplate::new(503).set_body_string("still down"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .query_single("test-token", "SELECT Id FROM Order LIMIT 1")
        .await
        .unwrap_err();

    assert_matches!(err, SyncError::CrmApi { status: 503, body } if body == "still down");
}

#[tokio::test]
async fn query_client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services/data/v60.0/query"))
        .respond_with(ResponseTemplate::new(400).set_body_string("MALFORMED_QUERY"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .query_single("test-token", "SELECT bogus FROM Order")
        .await
        .unwrap_err();

    assert_matches!(err, SyncError::CrmApi { status: 400, .. });
}

#[tokio::test]
async fn patch_object_targets_the_rest_base() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/services/data/v60.0/sobjects/Order/801X"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .patch_object("test-token", "Order", "801X", &json!({"Pricebook2Id": "01s1"}))
        .await
        .unwrap();
}

#[tokio::test]
async fn patch_object_failure_carries_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/services/data/v60.0/sobjects/Order/801X"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"[{"errorCode":"FIELD_CUSTOM_VALIDATION_EXCEPTION"}]"#),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .patch_object("test-token", "Order", "801X", &json!({"Pricebook2Id": "01s1"}))
        .await
        .unwrap_err();

    assert!(err.is_validation_block());
}
