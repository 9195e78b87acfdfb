//! Pieces shared by the dog and breed handlers: id and body parsing, page
//! selection, response rendering and per-request bookkeeping.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use kennel_core::pagination::{InvalidPage, PageRequest};
use kennel_core::projection::{projection_for, Action, Resource, TransferShape};
use kennel_core::validation::{FieldErrors, NON_FIELD_ERRORS};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::telemetry;

/// `GET /api`
pub async fn root(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let base = state.base_url(&headers);
    Json(json!({
        "dogs": Resource::Dogs.collection_url(&base),
        "breeds": Resource::Breeds.collection_url(&base),
    }))
}

/// Path ids that are not positive integers can never match a row.
pub fn parse_id(raw: &str) -> Result<i64, ProblemResponse> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ProblemResponse::not_found()),
    }
}

/// Decodes a JSON write body. An empty body reads as an empty object.
pub fn parse_body(body: &Bytes) -> Result<Value, ProblemResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|err| {
        ProblemResponse::validation(FieldErrors::single(
            NON_FIELD_ERRORS,
            format!("JSON parse error - {err}"),
        ))
    })
}

/// Reads `?page=N` from the raw query string. A repeated key resolves to its
/// last value, and anything that is not a page number is an invalid page.
pub fn page_request(
    state: &AppState,
    query: Option<&str>,
) -> Result<PageRequest, ProblemResponse> {
    PageRequest::parse(page_param(query), state.page_size()).map_err(invalid_page)
}

fn page_param(query: Option<&str>) -> Option<&str> {
    query?
        .split('&')
        .filter_map(|pair| match pair.split_once('=') {
            Some(("page", value)) => Some(value),
            None if pair == "page" => Some(""),
            _ => None,
        })
        .last()
}

pub fn invalid_page(err: InvalidPage) -> ProblemResponse {
    ProblemResponse::new(StatusCode::NOT_FOUND, "invalid_page", err.to_string())
}

/// Renders a successful action with the status and transfer shape it maps to.
pub fn respond<T: Serialize>(action: Action, body: T) -> Response {
    let projection = projection_for(action);
    let status = StatusCode::from_u16(projection.success_status).unwrap_or(StatusCode::OK);
    match projection.transfer {
        TransferShape::None => status.into_response(),
        TransferShape::List | TransferShape::Detail => (status, Json(body)).into_response(),
    }
}

/// Records metrics and the request log line for one finished action.
pub fn finish(
    resource: Resource,
    action: Action,
    started: Instant,
    outcome: Result<Response, ProblemResponse>,
) -> Result<Response, ProblemResponse> {
    let status = match &outcome {
        Ok(response) => response.status(),
        Err(problem) => problem.status(),
    };
    let result = result_label(status);
    telemetry::record_request(resource, action, result, started);

    let projection = projection_for(action);
    info!(
        stage = "api",
        resource = resource.as_str(),
        action = action.as_str(),
        query = ?projection.query,
        status = status.as_u16(),
        result,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    outcome
}

fn result_label(status: StatusCode) -> &'static str {
    match status {
        s if s.is_success() => "ok",
        StatusCode::BAD_REQUEST => "invalid",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::CONFLICT => "conflict",
        _ => "error",
    }
}
