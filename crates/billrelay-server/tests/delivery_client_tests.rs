//! Delivery client tests against a mock processing endpoint

use billrelay_server::delivery::{
    DeliveryClient, DeliveryConfig, DeliveryError, DeliveryOutcome, DeliveryRequest,
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> DeliveryClient {
    DeliveryClient::new(DeliveryConfig {
        endpoint: format!("{}/soap", server.uri()),
        user: None,
        pass: None,
        timeout_secs: 5,
        max_attempts: 3,
        base_backoff_ms: 1,
    })
    .unwrap()
}

fn request() -> DeliveryRequest {
    DeliveryRequest {
        entry_id: "r-1".to_string(),
        name: "alpha".to_string(),
        amount: "12.50".to_string(),
        currency: "EUR".to_string(),
        timestamp: "2026-03-01T00:00:00Z".to_string(),
    }
}

const SUCCESS_BODY: &str = "<Envelope><Body><ProcessTransactionResponse>\
    <result>SUCCESS</result></ProcessTransactionResponse></Body></Envelope>";

#[tokio::test]
async fn test_success_outcome_and_envelope_shape() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/soap"))
        .and(header("SOAPAction", "ProcessTransaction"))
        .and(body_string_contains("<prc:recordId>r-1</prc:recordId>"))
        .and(body_string_contains("<prc:correlationId>corr-77</prc:correlationId>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUCCESS_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client_for(&server).deliver(&request(), "corr-77").await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Success);
    server.verify().await;
}

#[tokio::test]
async fn test_explicit_rejection_outcome() {
    let body = "<Envelope><Body><ProcessTransactionResponse>\
        <result>REJECTED</result><message>amount out of range</message>\
        </ProcessTransactionResponse></Body></Envelope>";

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/soap"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    match client_for(&server).deliver(&request(), "corr-1").await.unwrap() {
        DeliveryOutcome::Rejected(reason) => {
            assert!(reason.contains("REJECTED"));
            assert!(reason.contains("amount out of range"));
        },
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_error_is_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/soap"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server).deliver(&request(), "corr-1").await.unwrap_err();
    assert!(matches!(err, DeliveryError::Transport(_)));
}

#[tokio::test]
async fn test_soap_fault_is_transport() {
    let body = "<Envelope><Body><Fault>\
        <faultcode>Server</faultcode><faultstring>backend unavailable</faultstring>\
        </Fault></Body></Envelope>";

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/soap"))
        .respond_with(ResponseTemplate::new(500).set_body_string(body))
        .mount(&server)
        .await;

    match client_for(&server).deliver(&request(), "corr-1").await.unwrap_err() {
        DeliveryError::Transport(message) => assert!(message.contains("backend unavailable")),
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreadable_envelope_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/soap"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<Envelope><Body/></Envelope>"))
        .mount(&server)
        .await;

    let err = client_for(&server).deliver(&request(), "corr-1").await.unwrap_err();
    assert!(matches!(err, DeliveryError::Envelope(_)));
}

#[tokio::test]
async fn test_connection_refused_is_transport() {
    // Bind-and-drop to get a port with no listener.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = DeliveryClient::new(DeliveryConfig {
        endpoint: format!("http://127.0.0.1:{}/soap", port),
        user: None,
        pass: None,
        timeout_secs: 2,
        max_attempts: 1,
        base_backoff_ms: 1,
    })
    .unwrap();

    let err = client.deliver(&request(), "corr-1").await.unwrap_err();
    assert!(matches!(err, DeliveryError::Transport(_)));
}
