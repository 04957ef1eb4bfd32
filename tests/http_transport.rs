//! `ApiClient` over the real `reqwest` transport against a local mock server.

use mockito::{Matcher, Server};
use resilient_api_client::transport::HttpTransport;
use resilient_api_client::{ApiClientBuilder, Error, RequestOptions, ResponseBody};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn client_for(base_url: &str) -> ApiClientBuilder {
    ApiClientBuilder::new()
        .base_url(base_url)
        .retry_delay(Duration::from_millis(10))
        .timeout(Duration::from_secs(5))
        .default_header("x-api-key", "k1")
}

#[tokio::test]
async fn test_get_json_with_default_headers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/prices/DE")
        .match_header("x-api-key", "k1")
        .match_header("x-request-id", Matcher::Regex("^[0-9a-f-]{36}$".into()))
        .with_status(200)
        .with_header("content-type", "application/json; charset=utf-8")
        .with_body(r#"{"country":"DE","vat":0.19}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server.url()).build().unwrap();
    let resp = client.get("/v1/prices/DE", RequestOptions::new()).await.unwrap();
    // Second call is served from the cache.
    let again = client.get("/v1/prices/DE", RequestOptions::new()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.as_json().unwrap()["vat"], 0.19);
    assert_eq!(resp, again);

    #[derive(serde::Deserialize)]
    struct Vat {
        country: String,
        vat: f64,
    }
    let vat: Vat = resp.json().unwrap();
    assert_eq!(vat.country, "DE");
    assert!((vat.vat - 0.19).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_plain_text_and_empty_bodies() {
    let mut server = Server::new_async().await;
    let _text = server
        .mock("GET", "/health")
        .with_status(200)
        .with_header("content-type", "text/plain")
        .with_body("ok")
        .create_async()
        .await;
    let _empty = server
        .mock("DELETE", "/v1/prices/DE")
        .with_status(204)
        .create_async()
        .await;

    let client = client_for(&server.url()).build().unwrap();
    let resp = assert_ok!(client.get("/health", RequestOptions::new()).await);
    assert_eq!(resp.body, ResponseBody::Text("ok".into()));

    let resp = client
        .delete("/v1/prices/DE", RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(resp.status, 204);
    assert!(resp.body.is_empty());
}

#[tokio::test]
async fn test_server_errors_are_retried_until_exhausted() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/prices/FR")
        .with_status(503)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"message":"maintenance"}}"#)
        .expect(3)
        .create_async()
        .await;

    let client = client_for(&server.url()).retries(2).build().unwrap();
    let err = client
        .get("/v1/prices/FR", RequestOptions::new())
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.message(), "maintenance");
    assert_eq!(
        err.data().and_then(|d| d.as_json()).unwrap()["error"]["message"],
        "maintenance"
    );
}

#[tokio::test]
async fn test_not_found_is_returned_after_one_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/prices/XX")
        .with_status(404)
        .with_body("no such country")
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server.url()).retries(3).build().unwrap();
    let err = assert_err!(client.get("/v1/prices/XX", RequestOptions::new()).await);

    mock.assert_async().await;
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.message(), "Request failed with status code 404");
    assert_eq!(err.data(), Some(&ResponseBody::Text("no such country".into())));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/quotes")
        .match_header("content-type", "application/json")
        .match_header("x-api-key", "override")
        .match_body(Matcher::Json(serde_json::json!({"sku": "A-1", "qty": 3})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"quote_id":"q-1"}"#)
        .create_async()
        .await;

    let client = client_for(&server.url()).build().unwrap();
    let resp = client
        .post(
            "/v1/quotes",
            &serde_json::json!({"sku": "A-1", "qty": 3}),
            RequestOptions::new().header("X-Api-Key", "override"),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(resp.status, 201);
    assert_eq!(resp.body.as_json().unwrap()["quote_id"], "q-1");
}

#[tokio::test]
async fn test_unreachable_host_is_a_connection_error() {
    let client = ApiClientBuilder::new()
        .base_url("http://127.0.0.1:1")
        .retries(1)
        .retry_delay(Duration::from_millis(10))
        .transport(Arc::new(HttpTransport::new().unwrap()))
        .build()
        .unwrap();

    let err = client
        .get("/v1/prices/DE", RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection { .. }), "got {:?}", err);
    assert!(err.is_network());
    assert_eq!(err.context().attempt, Some(1));
}

#[tokio::test]
async fn test_caller_request_id_is_sent_as_single_value() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/prices/NL")
        .match_header("x-request-id", Matcher::Exact("trace-42".into()))
        .with_status(200)
        .with_body("ok")
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server.url()).build().unwrap();
    let resp = client
        .get(
            "/v1/prices/NL",
            RequestOptions::new().header("X-Request-Id", "trace-42"),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(resp.status, 200);
}
