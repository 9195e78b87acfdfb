use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use kennel_core::projection::{Action, BreedDetail, BreedListItem, Resource};
use kennel_core::validation::{parse_breed_changes, parse_new_breed, WriteMode};
use kennel_storage::BreedError;
use tracing::{error, warn};

use crate::api;
use crate::problem::ProblemResponse;
use crate::router::AppState;

const RESOURCE: Resource = Resource::Breeds;

/// `GET /api/breeds`
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = list_page(&state, &headers, query.as_deref()).await;
    api::finish(RESOURCE, Action::List, started, outcome)
}

/// `POST /api/breeds`
pub async fn create(State(state): State<AppState>, body: Bytes) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = create_breed(&state, &body).await;
    api::finish(RESOURCE, Action::Create, started, outcome)
}

/// `GET /api/breeds/:id`
pub async fn retrieve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = retrieve_breed(&state, &id).await;
    api::finish(RESOURCE, Action::Retrieve, started, outcome)
}

/// `PUT /api/breeds/:id`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = update_breed(&state, &id, &body, Action::Update).await;
    api::finish(RESOURCE, Action::Update, started, outcome)
}

/// `PATCH /api/breeds/:id`
pub async fn partial_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = update_breed(&state, &id, &body, Action::PartialUpdate).await;
    api::finish(RESOURCE, Action::PartialUpdate, started, outcome)
}

/// `DELETE /api/breeds/:id`
///
/// Refused with 409 while any dog still references the breed.
pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = destroy_breed(&state, &id).await;
    api::finish(RESOURCE, Action::Destroy, started, outcome)
}

async fn list_page(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Response, ProblemResponse> {
    let page = api::page_request(state, query)?;
    let repo = state.storage().breeds();
    let count = repo.count().await.map_err(problem)?;
    page.check(count).map_err(api::invalid_page)?;

    let base = state.base_url(headers);
    let results: Vec<BreedListItem> = repo
        .list_with_dog_count(page.limit(), page.offset())
        .await
        .map_err(problem)?
        .into_iter()
        .map(|row| BreedListItem::new(row, &base))
        .collect();
    let body = page.into_page(count, results, &RESOURCE.collection_url(&base));
    Ok(api::respond(Action::List, body))
}

async fn retrieve_breed(state: &AppState, raw_id: &str) -> Result<Response, ProblemResponse> {
    let detail = load_detail(state, api::parse_id(raw_id)?).await?;
    Ok(api::respond(Action::Retrieve, detail))
}

async fn create_breed(state: &AppState, body: &Bytes) -> Result<Response, ProblemResponse> {
    let payload = api::parse_body(body)?;
    let new_breed = parse_new_breed(&payload).map_err(ProblemResponse::validation)?;
    let breed = state
        .storage()
        .breeds()
        .insert(&new_breed)
        .await
        .map_err(problem)?;
    let detail = load_detail(state, breed.id).await?;
    Ok(api::respond(Action::Create, detail))
}

async fn update_breed(
    state: &AppState,
    raw_id: &str,
    body: &Bytes,
    action: Action,
) -> Result<Response, ProblemResponse> {
    let id = api::parse_id(raw_id)?;
    if !state.storage().breeds().exists(id).await.map_err(problem)? {
        return Err(ProblemResponse::not_found());
    }
    let payload = api::parse_body(body)?;
    let mode = match action {
        Action::PartialUpdate => WriteMode::Partial,
        _ => WriteMode::Replace,
    };
    let changes = parse_breed_changes(&payload, mode).map_err(ProblemResponse::validation)?;
    state
        .storage()
        .breeds()
        .update(id, &changes)
        .await
        .map_err(problem)?;
    let detail = load_detail(state, id).await?;
    Ok(api::respond(action, detail))
}

async fn destroy_breed(state: &AppState, raw_id: &str) -> Result<Response, ProblemResponse> {
    let id = api::parse_id(raw_id)?;
    state.storage().breeds().delete(id).await.map_err(problem)?;
    Ok(api::respond(Action::Destroy, ()))
}

async fn load_detail(state: &AppState, id: i64) -> Result<BreedDetail, ProblemResponse> {
    state.storage().breeds().fetch(id).await.map_err(problem)
}

fn problem(err: BreedError) -> ProblemResponse {
    match err {
        BreedError::NotFound => ProblemResponse::not_found(),
        BreedError::Protected { breed, dog_count } => {
            warn!(stage = "api", resource = RESOURCE.as_str(), %breed, dog_count, "breed delete refused");
            ProblemResponse::new(
                StatusCode::CONFLICT,
                "protected",
                format!(
                    "Cannot delete breed {breed} because {dog_count} dog(s) still reference it."
                ),
            )
        }
        err @ (BreedError::Decode(_) | BreedError::Database(_)) => {
            error!(stage = "api", resource = RESOURCE.as_str(), error = %err, "breed store failure");
            ProblemResponse::internal()
        }
    }
}
