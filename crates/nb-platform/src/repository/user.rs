//! User Repository

use async_trait::async_trait;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use tracing::debug;

use crate::domain::{Identity, StoredUser, User};
use crate::error::{PlatformError, Result};
use crate::persistence::mysql::execute;
use crate::persistence::{EntityStore, WriteTarget};
use crate::repository::UserStore;
use crate::service::auth::IdentityLookup;
use crate::service::users::EMAIL_TAKEN;

const USER_COLUMNS: &str = "id, first_name, last_name, email, contact, password, is_first_login, \
     active, created_by, updated_by, created_at, updated_at";

pub struct MySqlUserRepository {
    pool: MySqlPool,
}

impl MySqlUserRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
                first_name VARCHAR(255) NOT NULL,
                last_name VARCHAR(255) NOT NULL,
                email VARCHAR(255) NOT NULL,
                contact VARCHAR(12) NOT NULL,
                password TEXT NOT NULL,
                is_first_login BOOLEAN NOT NULL DEFAULT TRUE,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_by BIGINT UNSIGNED NULL,
                updated_by BIGINT UNSIGNED NULL,
                created_at TIMESTAMP NULL,
                updated_at TIMESTAMP NULL,
                active_email VARCHAR(255) GENERATED ALWAYS AS (IF(active, email, NULL)) STORED,
                UNIQUE KEY uq_users_active_email (active_email),
                INDEX idx_users_email_active (email, active)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// A second active row with the same email trips `uq_users_active_email`.
    fn map_email_conflict(err: PlatformError) -> PlatformError {
        match err {
            PlatformError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                PlatformError::conflict(EMAIL_TAKEN)
            }
            other => other,
        }
    }

    fn from_row(row: &MySqlRow) -> Result<User> {
        Ok(User::from_storage(StoredUser {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            contact: row.try_get("contact")?,
            password_hash: row.try_get("password")?,
            is_first_login: row.try_get("is_first_login")?,
            active: row.try_get("active")?,
            created_by: row.try_get("created_by")?,
            updated_by: row.try_get("updated_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

#[async_trait]
impl EntityStore<User> for MySqlUserRepository {
    async fn insert(&self, user: &mut User, target: &WriteTarget) -> Result<()> {
        let query = sqlx::query(
            "INSERT INTO users (first_name, last_name, email, contact, password, is_first_login, \
             active, created_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.first_name.as_str())
        .bind(user.last_name.as_str())
        .bind(user.email.as_str())
        .bind(user.contact.as_str())
        .bind(user.password_hash.as_str())
        .bind(user.is_first_login)
        .bind(user.active)
        .bind(user.created_by)
        .bind(user.created_at);

        let result = execute(&self.pool, target, query)
            .await
            .map_err(Self::map_email_conflict)?;
        user.id = Some(result.last_insert_id());
        debug!(user_id = result.last_insert_id(), "Inserted user");
        Ok(())
    }

    async fn update(&self, user: &mut User, target: &WriteTarget) -> Result<()> {
        let id = user
            .id
            .ok_or_else(|| PlatformError::internal("Cannot update a user that was never stored"))?;

        let query = sqlx::query(
            "UPDATE users SET first_name = ?, last_name = ?, email = ?, contact = ?, password = ?, \
             is_first_login = ?, active = ?, updated_by = ?, updated_at = ? WHERE id = ?",
        )
        .bind(user.first_name.as_str())
        .bind(user.last_name.as_str())
        .bind(user.email.as_str())
        .bind(user.contact.as_str())
        .bind(user.password_hash.as_str())
        .bind(user.is_first_login)
        .bind(user.active)
        .bind(user.updated_by)
        .bind(user.updated_at)
        .bind(id);

        let result = execute(&self.pool, target, query)
            .await
            .map_err(Self::map_email_conflict)?;
        if result.rows_affected() == 0 {
            return Err(PlatformError::not_found("User", id));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MySqlUserRepository {
    async fn find_by_id(&self, id: u64) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_active_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE email = ? AND active = TRUE LIMIT 1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::from_row).transpose()
    }
}

#[async_trait]
impl IdentityLookup for MySqlUserRepository {
    async fn find_active_subject(&self, id: u64) -> Result<Option<Identity>> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name FROM users WHERE id = ? AND active = TRUE",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Identity {
                id: row.try_get("id")?,
                first_name: row.try_get("first_name")?,
                last_name: row.try_get("last_name")?,
            })
        })
        .transpose()
    }
}
