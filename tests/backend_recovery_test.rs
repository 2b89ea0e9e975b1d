mod common;

use common::CountingIdentity;
use openstack_telemetry_forwarder::backends::{AlarmBackend, MetricBackend};
use openstack_telemetry_forwarder::domain::{AlarmState, Severity};
use openstack_telemetry_forwarder::sender::{Backend, SendError, SendOptions, SendOutcome};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string, method, path},
};

fn metric_options() -> SendOptions {
    SendOptions {
        resource_id: Some("host-a".to_string()),
        unit: Some("MHz".to_string()),
        ..Default::default()
    }
}

fn alarm_options(state: AlarmState) -> SendOptions {
    SendOptions {
        resource_id: Some("host-a".to_string()),
        severity: Severity::Moderate,
        alarm_state: Some(state),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_metric_not_found_recreates_and_retries_once() {
    let mock_server = MockServer::start().await;
    let measures = r#"[{"value":2400.0,"timestamp":"2015-09-04T08:59:09.000000"}]"#;

    Mock::given(method("POST"))
        .and(path("/v1/metric/stale/measures"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/metric"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "fresh" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/metric/fresh/measures"))
        .and(body_string(measures))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = MetricBackend::new(None);
    backend
        .resolver()
        .cache()
        .insert("host-a@cpu.freq", "stale".to_string());
    let sender = common::sender(backend, CountingIdentity::new(mock_server.uri()));

    let outcome = sender
        .send("cpu.freq", measures, &metric_options(), 0)
        .await
        .unwrap();

    assert_eq!(outcome, SendOutcome::Delivered { status: 202 });
    assert_eq!(
        sender.backend().resolver().cache().get("host-a@cpu.freq").as_deref(),
        Some("fresh")
    );
}

#[tokio::test]
async fn test_metric_second_not_found_propagates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/metric"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "gone" })))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/metric/gone/measures"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&mock_server)
        .await;

    let sender = common::sender(MetricBackend::new(None), CountingIdentity::new(mock_server.uri()));

    let result = sender.send("cpu.freq", "[]", &metric_options(), 0).await;
    assert!(matches!(result, Err(SendError::NotFound { .. })));
}

#[tokio::test]
async fn test_alarm_update_uses_existing_alarm() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/alarms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "alarm_id": "a-1", "name": "link.status(host-a)" }
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v2/alarms/a-1/state"))
        .and(body_string("\"alarm\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    let sender = common::sender(AlarmBackend::new(), CountingIdentity::new(mock_server.uri()));

    for _ in 0..2 {
        let outcome = sender
            .send("link.status", "\"alarm\"", &alarm_options(AlarmState::Alarm), 0)
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Delivered { status: 200 });
    }
}

#[tokio::test]
async fn test_new_alarm_is_not_updated_after_creation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/alarms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/alarms"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "alarm_id": "a-9" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let sender = common::sender(AlarmBackend::new(), CountingIdentity::new(mock_server.uri()));

    let outcome = sender
        .send("link.status", "\"ok\"", &alarm_options(AlarmState::Ok), 0)
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::Skipped);
}

#[tokio::test]
async fn test_alarm_not_found_invalidates_then_resolves() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v2/alarms/stale/state"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/alarms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "alarm_id": "a-2", "name": "link.status(host-a)" }
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v2/alarms/a-2/state"))
        .and(body_string("\"insufficient data\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = AlarmBackend::new();
    backend
        .resolver()
        .cache()
        .insert("link.status(host-a)", "stale".to_string());
    let sender = common::sender(backend, CountingIdentity::new(mock_server.uri()));

    let outcome = sender
        .send(
            "link.status",
            "\"insufficient data\"",
            &alarm_options(AlarmState::InsufficientData),
            0,
        )
        .await
        .unwrap();

    assert_eq!(outcome, SendOutcome::Delivered { status: 200 });
    assert_eq!(
        sender.backend().resolver().cache().get("link.status(host-a)").as_deref(),
        Some("a-2")
    );
}

#[tokio::test]
async fn test_alarm_without_resource_id_is_rejected() {
    let mock_server = MockServer::start().await;
    let sender = common::sender(AlarmBackend::new(), CountingIdentity::new(mock_server.uri()));

    assert!(
        sender
            .backend()
            .derive_resource_name("link.status", &SendOptions::default())
            .is_none()
    );
    let result = sender
        .send("link.status", "\"ok\"", &SendOptions::default(), 0)
        .await;
    assert!(matches!(result, Err(SendError::InvalidRequest(_))));
}
