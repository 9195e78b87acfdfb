//! Admin account bootstrap and the read-only console behind HTTP Basic auth.
//!
//! Passwords are stored as Argon2id PHC strings, which carry their own salt
//! and parameters.

use std::fmt;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use kennel_core::types::{Gender, Size};
use kennel_storage::{AdminAccount, AdminError, Database, NewAdminAccount};
use kennel_util::AdminCredentials;
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::problem::ProblemResponse;
use crate::router::AppState;

const REALM_CHALLENGE: &str = "Basic realm=\"kennel-admin\"";

#[derive(Debug, Error)]
pub enum AdminSetupError {
    #[error("admin username must not be empty")]
    EmptyUsername,
    #[error("admin password must not be empty")]
    EmptyPassword,
    #[error("failed to hash admin password")]
    Hasher,
    #[error(transparent)]
    Store(#[from] AdminError),
}

/// Result of `kennel init-admin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Created(String),
    AlreadyExists(String),
}

impl fmt::Display for InitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created(username) => write!(f, "created admin account `{username}`"),
            Self::AlreadyExists(username) => {
                write!(f, "admin account `{username}` already exists; nothing changed")
            }
        }
    }
}

/// Creates the admin account unless one with the same username exists.
pub async fn init_admin(
    database: &Database,
    credentials: &AdminCredentials,
) -> Result<InitOutcome, AdminSetupError> {
    let username = credentials.username.trim();
    if username.is_empty() {
        return Err(AdminSetupError::EmptyUsername);
    }
    if credentials.password.is_empty() {
        return Err(AdminSetupError::EmptyPassword);
    }

    let admins = database.admins();
    if admins.find_by_username(username).await?.is_some() {
        info!(stage = "admin", username, "admin account already present");
        return Ok(InitOutcome::AlreadyExists(username.to_string()));
    }

    let password_hash = hash_password(&credentials.password)?;
    let account = NewAdminAccount {
        username,
        email: credentials.email.trim(),
        password_hash: &password_hash,
        created_at: Utc::now(),
    };
    match admins.insert(account).await {
        Ok(stored) => {
            info!(stage = "admin", username = %stored.username, "admin account created");
            Ok(InitOutcome::Created(stored.username))
        }
        Err(AdminError::DuplicateUsername(username)) => Ok(InitOutcome::AlreadyExists(username)),
        Err(err) => Err(err.into()),
    }
}

fn hash_password(password: &str) -> Result<String, AdminSetupError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AdminSetupError::Hasher)
}

/// Checks `password` against the stored hash. An unparsable hash never matches.
fn verify_password(account: &AdminAccount, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(&account.password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AdminAccount, Response> {
    let Some((username, password)) = basic_credentials(headers) else {
        return Err(unauthorized("authentication credentials were not provided"));
    };

    let account = state
        .storage()
        .admins()
        .find_by_username(&username)
        .await
        .map_err(|err| {
            error!(stage = "admin", error = %err, "failed to load admin account");
            ProblemResponse::internal().into_response()
        })?;

    match account {
        Some(account) if verify_password(&account, &password) => Ok(account),
        _ => {
            counter!("admin_auth_failures_total").increment(1);
            warn!(stage = "admin", %username, "admin authentication failed");
            Err(unauthorized("invalid username or password"))
        }
    }
}

fn unauthorized(detail: &'static str) -> Response {
    let mut response =
        ProblemResponse::new(StatusCode::UNAUTHORIZED, "unauthorized", detail).into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(REALM_CHALLENGE),
    );
    response
}

#[derive(Debug, Serialize)]
pub struct ConsoleDog {
    id: i64,
    name: String,
    age: u16,
    gender: Gender,
    label: String,
}

#[derive(Debug, Serialize)]
pub struct ConsoleBreed {
    id: i64,
    name: String,
    size: Size,
    label: String,
}

/// `GET /admin/dogs`
pub async fn list_dogs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConsoleDog>>, Response> {
    let account = authenticate(&state, &headers).await?;
    let dogs = state.storage().dogs().list_all().await.map_err(|err| {
        error!(stage = "admin", error = %err, "failed to list dogs");
        ProblemResponse::internal().into_response()
    })?;
    info!(stage = "admin", username = %account.username, rows = dogs.len(), "console dogs listed");

    Ok(Json(
        dogs.into_iter()
            .map(|dog| ConsoleDog {
                label: dog.to_string(),
                id: dog.id,
                name: dog.name,
                age: dog.age,
                gender: dog.gender,
            })
            .collect(),
    ))
}

/// `GET /admin/breeds`
pub async fn list_breeds(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConsoleBreed>>, Response> {
    let account = authenticate(&state, &headers).await?;
    let breeds = state.storage().breeds().list_all().await.map_err(|err| {
        error!(stage = "admin", error = %err, "failed to list breeds");
        ProblemResponse::internal().into_response()
    })?;
    info!(stage = "admin", username = %account.username, rows = breeds.len(), "console breeds listed");

    Ok(Json(
        breeds
            .into_iter()
            .map(|breed| ConsoleBreed {
                label: breed.to_string(),
                id: breed.id,
                name: breed.name,
                size: breed.size,
            })
            .collect(),
    ))
}
