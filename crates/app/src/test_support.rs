use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use kennel_storage::Database;
use serde_json::Value;
use tower::ServiceExt;

use crate::{router::AppState, telemetry};

pub async fn setup_state() -> AppState {
    setup_state_with_page_size(10).await
}

pub async fn setup_state_with_page_size(page_size: u32) -> AppState {
    let metrics = telemetry::init_metrics().expect("metrics init");
    let database = Database::connect("sqlite::memory:?cache=shared")
        .await
        .expect("connect");
    database.run_migrations().await.expect("migrations");
    AppState::new(metrics, database, page_size, None)
}

pub async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "testserver");
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&value).expect("serialize body"))
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).expect("request"))
        .await
        .expect("handler should respond")
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, None).await
}

pub async fn read_text(response: Response) -> String {
    let collected = response
        .into_body()
        .collect()
        .await
        .expect("body should read");
    String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8")
}

pub async fn read_json(response: Response) -> Value {
    serde_json::from_str(&read_text(response).await).expect("json body")
}
