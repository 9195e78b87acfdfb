use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::HeaderMap,
    response::Response,
};
use kennel_core::projection::{Action, DogDetail, DogListItem, Resource};
use kennel_core::validation::{
    parse_dog_changes, parse_new_dog, unknown_reference_message, FieldErrors, WriteMode,
};
use kennel_storage::DogError;
use tracing::error;

use crate::api;
use crate::problem::ProblemResponse;
use crate::router::AppState;

const RESOURCE: Resource = Resource::Dogs;

/// `GET /api/dogs`
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = list_page(&state, &headers, query.as_deref()).await;
    api::finish(RESOURCE, Action::List, started, outcome)
}

/// `POST /api/dogs`
pub async fn create(State(state): State<AppState>, body: Bytes) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = create_dog(&state, &body).await;
    api::finish(RESOURCE, Action::Create, started, outcome)
}

/// `GET /api/dogs/:id`
pub async fn retrieve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = retrieve_dog(&state, &id).await;
    api::finish(RESOURCE, Action::Retrieve, started, outcome)
}

/// `PUT /api/dogs/:id`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = update_dog(&state, &id, &body, Action::Update).await;
    api::finish(RESOURCE, Action::Update, started, outcome)
}

/// `PATCH /api/dogs/:id`
pub async fn partial_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = update_dog(&state, &id, &body, Action::PartialUpdate).await;
    api::finish(RESOURCE, Action::PartialUpdate, started, outcome)
}

/// `DELETE /api/dogs/:id`
pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ProblemResponse> {
    let started = Instant::now();
    let outcome = destroy_dog(&state, &id).await;
    api::finish(RESOURCE, Action::Destroy, started, outcome)
}

async fn list_page(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Response, ProblemResponse> {
    let page = api::page_request(state, query)?;
    let repo = state.storage().dogs();
    let count = repo.count().await.map_err(problem)?;
    page.check(count).map_err(api::invalid_page)?;

    let base = state.base_url(headers);
    let results: Vec<DogListItem> = repo
        .list_with_breed_average(page.limit(), page.offset())
        .await
        .map_err(problem)?
        .into_iter()
        .map(|row| DogListItem::new(row, &base))
        .collect();
    let body = page.into_page(count, results, &RESOURCE.collection_url(&base));
    Ok(api::respond(Action::List, body))
}

async fn retrieve_dog(state: &AppState, raw_id: &str) -> Result<Response, ProblemResponse> {
    let detail = load_detail(state, api::parse_id(raw_id)?).await?;
    Ok(api::respond(Action::Retrieve, detail))
}

async fn destroy_dog(state: &AppState, raw_id: &str) -> Result<Response, ProblemResponse> {
    let id = api::parse_id(raw_id)?;
    state.storage().dogs().delete(id).await.map_err(problem)?;
    Ok(api::respond(Action::Destroy, ()))
}

async fn create_dog(state: &AppState, body: &Bytes) -> Result<Response, ProblemResponse> {
    let payload = api::parse_body(body)?;
    let new_dog = parse_new_dog(&payload).map_err(ProblemResponse::validation)?;
    let dog = state.storage().dogs().insert(&new_dog).await.map_err(problem)?;
    let detail = load_detail(state, dog.id).await?;
    Ok(api::respond(Action::Create, detail))
}

async fn update_dog(
    state: &AppState,
    raw_id: &str,
    body: &Bytes,
    action: Action,
) -> Result<Response, ProblemResponse> {
    let id = api::parse_id(raw_id)?;
    if !state.storage().dogs().exists(id).await.map_err(problem)? {
        return Err(ProblemResponse::not_found());
    }
    let payload = api::parse_body(body)?;
    let mode = match action {
        Action::PartialUpdate => WriteMode::Partial,
        _ => WriteMode::Replace,
    };
    let changes = parse_dog_changes(&payload, mode).map_err(ProblemResponse::validation)?;
    state
        .storage()
        .dogs()
        .update(id, &changes)
        .await
        .map_err(problem)?;
    let detail = load_detail(state, id).await?;
    Ok(api::respond(action, detail))
}

async fn load_detail(state: &AppState, id: i64) -> Result<DogDetail, ProblemResponse> {
    let row = state
        .storage()
        .dogs()
        .fetch_with_same_breed_count(id)
        .await
        .map_err(problem)?;
    Ok(DogDetail::from(row))
}

fn problem(err: DogError) -> ProblemResponse {
    match err {
        DogError::NotFound => ProblemResponse::not_found(),
        DogError::UnknownBreed(id) => {
            ProblemResponse::validation(FieldErrors::single("breed", unknown_reference_message(id)))
        }
        err @ (DogError::Decode(_) | DogError::Database(_)) => {
            error!(stage = "api", resource = RESOURCE.as_str(), error = %err, "dog store failure");
            ProblemResponse::internal()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header, Method, StatusCode};
    use serde_json::{json, Value};

    use crate::router::app_router;
    use crate::test_support::{get, read_json, send, setup_state, setup_state_with_page_size};

    async fn create(app: &axum::Router, body: Value) -> Value {
        let response = send(app.clone(), Method::POST, "/api/dogs", Some(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await
    }

    async fn create_breed(app: &axum::Router, name: &str) -> i64 {
        let response = send(
            app.clone(),
            Method::POST,
            "/api/breeds",
            Some(json!({ "name": name })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await["id"].as_i64().expect("breed id")
    }

    #[tokio::test]
    async fn created_dog_round_trips_with_defaults() {
        let app = app_router(setup_state().await);
        let created = create(&app, json!({"name": "Lucia", "age": 3, "gender": "female"})).await;
        let id = created["id"].as_i64().expect("id");

        let response = get(app, &format!("/api/dogs/{id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body, created);
        assert_eq!(
            body,
            json!({
                "id": id,
                "name": "Lucia",
                "age": 3,
                "gender": "female",
                "breed": null,
                "color": "other",
                "favorite_food": null,
                "favorite_toy": null,
                "same_breed_count": null,
            })
        );
    }

    #[tokio::test]
    async fn list_carries_breed_average_and_links() {
        let app = app_router(setup_state().await);
        let bandog = create_breed(&app, "bandog").await;
        create(&app, json!({"name": "Bryee", "age": 3, "breed": bandog})).await;
        create(&app, json!({"name": "Dutty", "age": 4, "breed": bandog})).await;
        let stray = create(&app, json!({"name": "Stray", "age": 9})).await;

        let body = read_json(get(app.clone(), "/api/dogs").await).await;
        assert_eq!(body["count"], 3);
        assert_eq!(body["next"], Value::Null);
        assert_eq!(body["previous"], Value::Null);

        let results = body["results"].as_array().expect("results");
        assert_eq!(results[0]["name"], "Bryee");
        assert_eq!(results[0]["breed_avg_age"], 3.5);
        assert_eq!(results[1]["breed_avg_age"], 3.5);
        assert_eq!(results[2]["breed_avg_age"], Value::Null);
        assert_eq!(
            results[2]["detail_url"],
            format!("http://testserver/api/dogs/{}", stray["id"])
        );
        assert!(results[0].get("color").is_none());

        let again = read_json(get(app, "/api/dogs").await).await;
        assert_eq!(again, body);
    }

    #[tokio::test]
    async fn detail_counts_dogs_sharing_the_breed() {
        let app = app_router(setup_state().await);
        let bandog = create_breed(&app, "bandog").await;
        let first = create(&app, json!({"name": "Bryee", "age": 3, "breed": bandog})).await;
        assert_eq!(first["same_breed_count"], 1);
        create(&app, json!({"name": "Dutty", "age": 4, "breed": bandog})).await;

        let body = read_json(get(app, &format!("/api/dogs/{}", first["id"])).await).await;
        assert_eq!(body["same_breed_count"], 2);
        assert_eq!(body["breed"], bandog);
    }

    #[tokio::test]
    async fn pages_link_to_each_other() {
        let app = app_router(setup_state_with_page_size(2).await);
        for (name, age) in [("A", 1), ("B", 2), ("C", 3)] {
            create(&app, json!({"name": name, "age": age})).await;
        }

        let first = read_json(get(app.clone(), "/api/dogs").await).await;
        assert_eq!(first["results"].as_array().map(Vec::len), Some(2));
        assert_eq!(first["next"], "http://testserver/api/dogs?page=2");

        let second = read_json(get(app.clone(), "/api/dogs?page=2").await).await;
        assert_eq!(second["results"][0]["name"], "C");
        assert_eq!(second["previous"], "http://testserver/api/dogs");
        assert_eq!(second["next"], Value::Null);

        for uri in [
            "/api/dogs?page=3",
            "/api/dogs?page=0",
            "/api/dogs?page=last",
            "/api/dogs?page=2.5",
        ] {
            let response = get(app.clone(), uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "application/problem+json",
                "{uri}"
            );
            assert_eq!(read_json(response).await["detail"], "Invalid page.");
        }

        let repeated = read_json(get(app, "/api/dogs?page=1&page=2").await).await;
        assert_eq!(repeated, second);
    }

    #[tokio::test]
    async fn invalid_body_reports_every_field() {
        let app = app_router(setup_state().await);
        let response = send(
            app.clone(),
            Method::POST,
            "/api/dogs",
            Some(json!({"age": -1, "gender": "other", "breed": 42})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["errors"]["name"][0], "This field is required.");
        assert!(body["errors"]["age"].is_array());
        assert_eq!(body["errors"]["gender"][0], "\"other\" is not a valid choice.");

        let count = read_json(get(app, "/api/dogs").await).await["count"].clone();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn unknown_breed_is_a_field_error() {
        let app = app_router(setup_state().await);
        let response = send(
            app,
            Method::POST,
            "/api/dogs",
            Some(json!({"name": "Axe", "age": 3, "breed": 42})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(
            body["errors"]["breed"][0],
            "Invalid pk \"42\" - object does not exist."
        );
    }

    #[tokio::test]
    async fn put_requires_name_and_age_but_keeps_omitted_fields() {
        let app = app_router(setup_state().await);
        let created = create(
            &app,
            json!({"name": "Axe", "age": 3, "color": "brown", "favorite_toy": "rope"}),
        )
        .await;
        let uri = format!("/api/dogs/{}", created["id"]);

        let response = send(app.clone(), Method::PUT, &uri, Some(json!({"name": "Axel"}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["errors"]["age"][0], "This field is required.");

        let response = send(
            app.clone(),
            Method::PUT,
            &uri,
            Some(json!({"name": "Axel", "age": 4})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["name"], "Axel");
        assert_eq!(body["age"], 4);
        assert_eq!(body["color"], "brown");
        assert_eq!(body["favorite_toy"], "rope");
    }

    #[tokio::test]
    async fn patch_changes_only_supplied_fields() {
        let app = app_router(setup_state().await);
        let bandog = create_breed(&app, "bandog").await;
        let created = create(&app, json!({"name": "Axe", "age": 3, "breed": bandog})).await;
        let uri = format!("/api/dogs/{}", created["id"]);

        let response = send(
            app.clone(),
            Method::PATCH,
            &uri,
            Some(json!({"favorite_food": "kibble"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["favorite_food"], "kibble");
        assert_eq!(body["name"], "Axe");
        assert_eq!(body["same_breed_count"], 1);

        let response = send(app, Method::PATCH, &uri, Some(json!({"breed": null}))).await;
        let body = read_json(response).await;
        assert_eq!(body["breed"], Value::Null);
        assert_eq!(body["same_breed_count"], Value::Null);
    }

    #[tokio::test]
    async fn missing_dogs_are_not_found() {
        let app = app_router(setup_state().await);
        for (method, uri) in [
            (Method::GET, "/api/dogs/99"),
            (Method::GET, "/api/dogs/abc"),
            (Method::PATCH, "/api/dogs/99"),
            (Method::DELETE, "/api/dogs/99"),
        ] {
            let response = send(app.clone(), method.clone(), uri, Some(json!({}))).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn unknown_id_wins_over_invalid_body() {
        let app = app_router(setup_state().await);
        for (method, body) in [
            (Method::PUT, json!({"color": "x"})),
            (Method::PATCH, json!({"age": -1})),
        ] {
            let response = send(app.clone(), method.clone(), "/api/dogs/999", Some(body)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method}");
        }

        let created = create(&app, json!({"name": "Axe", "age": 3})).await;
        let uri = format!("/api/dogs/{}", created["id"]);
        let response = send(app, Method::PATCH, &uri, Some(json!({"age": -1}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_removes_the_dog() {
        let app = app_router(setup_state().await);
        let created = create(&app, json!({"name": "Axe", "age": 3})).await;
        let uri = format!("/api/dogs/{}", created["id"]);

        let response = send(app.clone(), Method::DELETE, &uri, None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(get(app, &uri).await.status(), StatusCode::NOT_FOUND);
    }
}
