use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

use crate::{is_unique_violation, to_rfc3339};

/// Stored console account. `password_hash` is an Argon2id PHC string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating an account.
#[derive(Debug, Clone, Copy)]
pub struct NewAdminAccount<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AdminRepository {
    pool: SqlitePool,
}

impl AdminRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<AdminAccount>, AdminError> {
        let row = sqlx::query_as::<_, AdminRow>(
            r#"
SELECT id, username, email, password_hash, created_at
  FROM admin_accounts
 WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AdminRow::into_domain).transpose()
    }

    /// Inserts an account. A second account with the same username is rejected.
    pub async fn insert(&self, account: NewAdminAccount<'_>) -> Result<AdminAccount, AdminError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO admin_accounts \
             (username, email, password_hash, created_at) \
             VALUES (?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(account.username)
        .bind(account.email)
        .bind(account.password_hash)
        .bind(to_rfc3339(account.created_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AdminError::DuplicateUsername(account.username.to_string())
            } else {
                AdminError::Database(err)
            }
        })?;

        Ok(AdminAccount {
            id,
            username: account.username.to_string(),
            email: account.email.to_string(),
            password_hash: account.password_hash.to_string(),
            created_at: account.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AdminRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    created_at: String,
}

impl AdminRow {
    fn into_domain(self) -> Result<AdminAccount, AdminError> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|err| AdminError::Timestamp(err.to_string()))?
            .with_timezone(&Utc);
        Ok(AdminAccount {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            created_at,
        })
    }
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("admin account `{0}` already exists")]
    DuplicateUsername(String),
    #[error("failed to parse timestamp: {0}")]
    Timestamp(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
