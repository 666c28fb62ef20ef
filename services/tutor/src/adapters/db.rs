//! services/tutor/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `KeyValueStorage` and `AccountRepository` ports from the `core` crate. It keeps
//! everything in one local SQLite file using `sqlx`.

use async_trait::async_trait;
use chrono::Utc;
use professor_core::domain::{AuthSession, User, UserCredentials};
use professor_core::ports::{AccountRepository, KeyValueStorage, PortError, PortResult};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage and account ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database behind `url`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(url).await?;
        Ok(Self::new(pool))
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct AccountRecord {
    uid: String,
    name: Option<String>,
    email: String,
    hashed_password: String,
}

impl AccountRecord {
    fn to_credentials(self) -> UserCredentials {
        UserCredentials {
            uid: self.uid,
            name: self.name,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

//=========================================================================================
// `KeyValueStorage` Trait Implementation
//=========================================================================================

#[async_trait]
impl KeyValueStorage for DbAdapter {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value) VALUES (?, ?) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `AccountRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountRepository for DbAdapter {
    async fn create_account(
        &self,
        name: Option<&str>,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let uid = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO accounts (uid, name, email, hashed_password, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&uid)
        .bind(name)
        .bind(email)
        .bind(hashed_password)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let duplicate = e.as_database_error().map_or(false, |db| db.is_unique_violation());
            if duplicate {
                PortError::Unexpected(format!("An account already exists for {}", email))
            } else {
                unexpected(e)
            }
        })?;

        Ok(User {
            uid,
            name: name.map(str::to_string),
            email: Some(email.to_string()),
        })
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, AccountRecord>(
            "SELECT uid, name, email, hashed_password FROM accounts WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Account {} not found", email)))?;
        Ok(record.to_credentials())
    }

    async fn get_user_by_id(&self, uid: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, AccountRecord>(
            "SELECT uid, name, email, hashed_password FROM accounts WHERE uid = ?",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", uid)))?;
        Ok(record.to_credentials().to_user())
    }

    async fn create_auth_session(&self, session: &AuthSession) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, uid, expires_at) VALUES (?, ?, ?)")
            .bind(&session.id)
            .bind(&session.uid)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str, now: i64) -> PortResult<String> {
        sqlx::query_scalar::<_, String>(
            "SELECT uid FROM auth_sessions WHERE id = ? AND expires_at > ?",
        )
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

/// A migrated in-memory database for tests.
#[cfg(test)]
pub(crate) async fn memory_db() -> DbAdapter {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = DbAdapter::new(pool);
    db.run_migrations().await.unwrap();
    db
}
