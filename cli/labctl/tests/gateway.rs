//! HTTP gateway tests against a mock marketplace API.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use labctl::client::{GatewayConfig, WaldurGateway};
use labctl::config::ProvisionSettings;
use labfleet_reconcile::{
    AddressPlan, ApplyConfig, Fleet, Gateway, GatewayError, InstanceId, ProvisionSpec,
    QuotaPolicy, Roster, Selector, StudentId,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer, timeout: Duration) -> WaldurGateway {
    WaldurGateway::new(GatewayConfig {
        base_url: format!("{}/api", server.uri()),
        token: "t0k".to_string(),
        project: "prj".to_string(),
        timeout,
        provision: ProvisionSettings {
            offering: "off".to_string(),
            subnet: "sub".to_string(),
            ..Default::default()
        },
    })
    .unwrap()
}

fn instance(uuid: &str, owner: &str, ip: &str) -> serde_json::Value {
    json!({
        "uuid": uuid,
        "name": format!("{}-vm", owner),
        "description": owner,
        "internal_ips": [ip],
        "internal_ips_set": [{ "allowed_address_pairs": [] }],
    })
}

#[tokio::test]
async fn test_list_sends_project_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/openstacktenant-instances/"))
        .and(query_param("project", "prj"))
        .and(header("authorization", "token t0k"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([instance("u1", "dan", "192.168.42.11")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let records = gateway(&server, Duration::from_secs(5))
        .list_instances()
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["uuid"], "u1");
}

#[tokio::test]
async fn test_list_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/openstacktenant-instances/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid token."))
        .mount(&server)
        .await;

    let err = gateway(&server, Duration::from_secs(5))
        .list_instances()
        .await
        .unwrap_err();

    match err {
        GatewayError::Api { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "Invalid token.");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_list_undecodable_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/openstacktenant-instances/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = gateway(&server, Duration::from_secs(5))
        .list_instances()
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Decode(_)));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/openstacktenant-instances/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = gateway(&server, Duration::from_millis(100))
        .list_instances()
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Timeout(d) if d == Duration::from_millis(100)));
}

#[tokio::test]
async fn test_create_orders_and_submits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/marketplace-cart-items/"))
        .and(body_partial_json(json!({
            "attributes": { "name": "eve-1", "description": "eve" }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"uuid": "cart"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/marketplace-cart-items/submit/"))
        .and(body_partial_json(json!({
            "project": format!("{}/api/projects/prj/", server.uri())
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let spec = ProvisionSpec::for_slot(StudentId::new_unchecked("eve"), 1);
    gateway(&server, Duration::from_secs(5))
        .create_instance(&spec)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_order_is_not_submitted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/marketplace-cart-items/"))
        .respond_with(ResponseTemplate::new(400).set_body_string("quota exceeded"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/marketplace-cart-items/submit/"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let spec = ProvisionSpec::for_slot(StudentId::new_unchecked("eve"), 1);
    let err = gateway(&server, Duration::from_secs(5))
        .create_instance(&spec)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Api { status: 400, .. }));
}

#[tokio::test]
async fn test_force_delete_releases_volumes_and_ips() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/openstacktenant-instances/u1/force_destroy/"))
        .and(query_param("delete_volumes", "true"))
        .and(query_param("release_floating_ips", "true"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server, Duration::from_secs(5))
        .force_delete_instance(&InstanceId::new_unchecked("u1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_allowed_address_pairs_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/openstacktenant-instances/u1/update_allowed_address_pairs/"))
        .and(body_partial_json(json!({
            "subnet": format!("{}/api/openstacktenant-subnets/sub/", server.uri()),
            "allowed_address_pairs": [
                { "ip_address": "192.168.100.12" },
                { "ip_address": "192.168.100.13" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server, Duration::from_secs(5))
        .update_allowed_address_pairs(
            &InstanceId::new_unchecked("u1"),
            &[Ipv4Addr::new(192, 168, 100, 12), Ipv4Addr::new(192, 168, 100, 13)],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_set_count_against_http_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/openstacktenant-instances/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([instance("u1", "dan", "192.168.42.11")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/marketplace-cart-items/"))
        .and(body_partial_json(json!({ "attributes": { "name": "dan-2" } })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/marketplace-cart-items/submit/"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let fleet = Fleet::new(
        Arc::new(gateway(&server, Duration::from_secs(5))),
        AddressPlan::default(),
        QuotaPolicy::default(),
        ApplyConfig {
            pacing: Duration::ZERO,
            max_concurrent_students: 1,
        },
    );

    let report = fleet
        .reconcile_quota(
            Roster::default(),
            &Selector::Student(StudentId::new_unchecked("dan")),
            2,
            |_| {},
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 0);
}
