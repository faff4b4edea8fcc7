//! HTTP surface tests: the router is served on an ephemeral port and
//! exercised with a plain reqwest client.

mod common;

use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use solr_fusion::server::{router, AppState};
use solr_fusion::store::ConfigStore;

async fn spawn_app(store: Arc<ConfigStore>) -> String {
    let app = router(AppState::new(store));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let backend = MockServer::start().await;
    let (_tmp, store) = common::setup_store(backend.address().port(), false);
    let base = spawn_app(store).await;

    let body: Value = client()
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["config_version"], 1);
}

#[tokio::test]
async fn test_invalid_page_redirects_without_page() {
    let backend = MockServer::start().await;
    let (_tmp, store) = common::setup_store(backend.address().port(), false);
    let base = spawn_app(store).await;

    let response = client()
        .get(format!("{}/search/news?q=report&page=-1&f=bundle%3Anews", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 302);
    assert_eq!(
        response.headers()["location"].to_str().unwrap(),
        "/search/news?q=report&f=bundle%3Anews"
    );
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_status_follows_canonical_response() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/solr/site/select"))
        .and(query_param("start", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"numFound": 0, "docs": []}
        })))
        .expect(1)
        .mount(&backend)
        .await;

    let (_tmp, store) = common::setup_store(backend.address().port(), false);
    let base = spawn_app(store).await;

    let response = client()
        .get(format!("{}/search/news?q=report&page=2", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["body"]["numFound"], 0);

    let response = client()
        .get(format!("{}/search/search", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn test_suggest_without_text_is_empty_array() {
    let backend = MockServer::start().await;
    let (_tmp, store) = common::setup_store(backend.address().port(), false);
    let base = spawn_app(store).await;

    let body: Value = client()
        .get(format!("{}/suggest", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!([]));
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_signals_endpoint_uses_forwarded_ip() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/signals/web"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;

    let (_tmp, store) = common::setup_store(backend.address().port(), false);
    let base = spawn_app(store).await;

    let response = client()
        .post(format!("{}/signals", base))
        .header("x-forwarded-for", "198.51.100.4")
        .json(&json!({"bundle": "fusion_news", "type": "query"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"statusCode": 200, "statusMessage": "Success."}));

    let requests = backend.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["params"]["ip_address"], "198.51.100.4");
}

#[tokio::test]
async fn test_refresh_endpoint_queues_job() {
    let backend = MockServer::start().await;
    let (_tmp, store) = common::setup_store(backend.address().port(), false);
    let base = spawn_app(store).await;

    let response = client()
        .post(format!("{}/refresh", base))
        .json(&json!({"path": "/en/news/report", "user": "editor"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["queued"], true);
}
