mod support;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use reqwest::Client;
use serde_json::{json, Value};
use tower::ServiceExt;

use support::{app_state, session_token, spawn_server};

#[tokio::test]
async fn health_check_responds_ok() {
    let app = web_api::router(app_state());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn post_and_list_messages() {
    let server = spawn_server().await;
    let client = Client::new();
    let token = session_token(&server, "alice").await;

    for body in ["first", "second"] {
        let response = client
            .post(format!("{}/api/v1/messages", server.base_url()))
            .bearer_auth(&token)
            .json(&json!({ "body": body }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED.as_u16());
        let message: Value = response.json().await.unwrap();
        assert_eq!(message["username"], "alice");
        assert_eq!(message["body"], body);
    }

    let history: Vec<Value> = client
        .get(format!("{}/api/v1/messages?limit=1", server.base_url()))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["body"], "second");

    let history: Vec<Value> = client
        .get(format!("{}/api/v1/messages", server.base_url()))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let bodies: Vec<&str> = history.iter().map(|m| m["body"].as_str().unwrap()).collect();
    assert_eq!(bodies, vec!["first", "second"]);
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let server = spawn_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/v1/session", server.base_url()))
        .json(&json!({ "username": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST.as_u16());

    let token = session_token(&server, "bob").await;
    let response = client
        .post(format!("{}/api/v1/messages", server.base_url()))
        .bearer_auth(&token)
        .json(&json!({ "body": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST.as_u16());
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["code"], "INVALID_ARGUMENT");

    let response = client
        .post(format!("{}/api/v1/messages", server.base_url()))
        .json(&json!({ "body": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED.as_u16());

    let response = client
        .get(format!("{}/api/v1/messages", server.base_url()))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED.as_u16());
}
