//! Postgres backend.
//!
//! Rows that a transaction is about to transition (pending artifacts, sessions
//! being rotated) are read with `FOR UPDATE`, so a concurrent transaction blocks
//! until the first one finishes and then re-checks the row against its filter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Postgres, Row, Transaction,
};
use std::time::Duration;
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use super::{
    Account, Artifact, ArtifactKind, ArtifactStatus, Device, Session, Store, StoreError, StoreTx,
};

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const ACCOUNT_COLUMNS: &str =
    "id, name, username, email, avatar, password_hash, verified, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, account_id, device_id, device_type, user_agent, \
     refresh_token_hash, created_at, last_active_at, expires_at, revoked_at";
const ARTIFACT_COLUMNS: &str = "id, account_id, kind, token_hash, revoke_token_hash, \
     target_email, status, created_at, expires_at, resolved_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a bounded pool.
    ///
    /// # Errors
    /// Returns an error if the first connection cannot be established.
    pub async fn connect(dsn: &str, max_connections: u32, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .max_lifetime(Duration::from_secs(60 * 30))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist yet.
    ///
    /// # Errors
    /// Returns an error if any schema statement fails.
    pub async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(query_span("DDL", "schema.sql"))
            .await
            .context("failed to apply schema")?;
        Ok(())
    }
}

fn query_span(operation: &'static str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn classify(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        let constraint = match &err {
            sqlx::Error::Database(db_err) => db_err.constraint().unwrap_or("unique").to_string(),
            _ => "unique".to_string(),
        };
        return StoreError::Conflict(constraint);
    }
    match err {
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable("timed out acquiring a database connection".to_string())
        }
        other => StoreError::Backend(other),
    }
}

fn expect_one_row(affected: u64, entity: &str, id: Uuid) -> Result<(), StoreError> {
    if affected == 0 {
        return Err(StoreError::Integrity(format!("{entity} {id} does not exist")));
    }
    Ok(())
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    Ok(Account {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        avatar: row.try_get("avatar")?,
        password_hash: row.try_get("password_hash")?,
        verified: row.try_get("verified")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<Session, StoreError> {
    Ok(Session {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        device_id: row.try_get("device_id")?,
        device_type: row.try_get("device_type")?,
        user_agent: row.try_get("user_agent")?,
        refresh_token_hash: row.try_get("refresh_token_hash")?,
        created_at: row.try_get("created_at")?,
        last_active_at: row.try_get("last_active_at")?,
        expires_at: row.try_get("expires_at")?,
        revoked_at: row.try_get("revoked_at")?,
    })
}

fn artifact_from_row(row: &PgRow) -> Result<Artifact, StoreError> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    Ok(Artifact {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        kind: kind.parse().map_err(StoreError::Integrity)?,
        token_hash: row.try_get("token_hash")?,
        revoke_token_hash: row.try_get("revoke_token_hash")?,
        target_email: row.try_get("target_email")?,
        status: status.parse().map_err(StoreError::Integrity)?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(classify)?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let query = "SELECT 1";
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .map_err(classify)?;
        Ok(())
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn fetch_account(
        &mut self,
        filter: &str,
        value: &str,
    ) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {filter} = $1");
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(classify)?;
        row.as_ref().map(account_from_row).transpose()
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO accounts
                (id, name, username, email, avatar, password_hash, verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ";
        sqlx::query(query)
            .bind(account.id)
            .bind(&account.name)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.avatar)
            .bind(&account.password_hash)
            .bind(account.verified)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&mut *self.tx)
            .instrument(query_span("INSERT", query))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET name = $2, username = $3, email = $4, avatar = $5,
                password_hash = $6, verified = $7, updated_at = $8
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(account.id)
            .bind(&account.name)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.avatar)
            .bind(&account.password_hash)
            .bind(account.verified)
            .bind(account.updated_at)
            .execute(&mut *self.tx)
            .instrument(query_span("UPDATE", query))
            .await
            .map_err(classify)?;
        expect_one_row(result.rows_affected(), "account", account.id)
    }

    async fn account_by_id(&mut self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(classify)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn account_by_email(&mut self, email: &str) -> Result<Option<Account>, StoreError> {
        self.fetch_account("email", email).await
    }

    async fn account_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        self.fetch_account("username", username).await
    }

    async fn insert_session(&mut self, session: &Session) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO sessions
                (id, account_id, device_id, device_type, user_agent, refresh_token_hash,
                 created_at, last_active_at, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ";
        sqlx::query(query)
            .bind(session.id)
            .bind(session.account_id)
            .bind(&session.device_id)
            .bind(&session.device_type)
            .bind(&session.user_agent)
            .bind(&session.refresh_token_hash)
            .bind(session.created_at)
            .bind(session.last_active_at)
            .bind(session.expires_at)
            .bind(session.revoked_at)
            .execute(&mut *self.tx)
            .instrument(query_span("INSERT", query))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn update_session(&mut self, session: &Session) -> Result<(), StoreError> {
        let query = r"
            UPDATE sessions
            SET user_agent = $2, refresh_token_hash = $3, last_active_at = $4,
                expires_at = $5, revoked_at = $6
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(session.id)
            .bind(&session.user_agent)
            .bind(&session.refresh_token_hash)
            .bind(session.last_active_at)
            .bind(session.expires_at)
            .bind(session.revoked_at)
            .execute(&mut *self.tx)
            .instrument(query_span("UPDATE", query))
            .await
            .map_err(classify)?;
        expect_one_row(result.rows_affected(), "session", session.id)
    }

    async fn session_by_id(
        &mut self,
        account_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<Session>, StoreError> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 AND account_id = $2 FOR UPDATE"
        );
        let row = sqlx::query(&query)
            .bind(session_id)
            .bind(account_id)
            .fetch_optional(&mut *self.tx)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(classify)?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn session_by_refresh_hash(
        &mut self,
        account_id: Uuid,
        refresh_token_hash: &[u8],
    ) -> Result<Option<Session>, StoreError> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE account_id = $1 AND refresh_token_hash = $2 FOR UPDATE"
        );
        let row = sqlx::query(&query)
            .bind(account_id)
            .bind(refresh_token_hash)
            .fetch_optional(&mut *self.tx)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(classify)?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn live_session_for_device(
        &mut self,
        account_id: Uuid,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE account_id = $1 AND device_id = $2 AND device_type = $3 \
               AND revoked_at IS NULL AND expires_at > $4 \
             ORDER BY last_active_at DESC LIMIT 1 FOR UPDATE"
        );
        let row = sqlx::query(&query)
            .bind(account_id)
            .bind(&device.device_id)
            .bind(&device.device_type)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(classify)?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn live_sessions(
        &mut self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE account_id = $1 AND revoked_at IS NULL AND expires_at > $2 \
             ORDER BY last_active_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(account_id)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(classify)?;
        rows.iter().map(session_from_row).collect()
    }

    async fn revoke_sessions(
        &mut self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let query = r"
            UPDATE sessions
            SET revoked_at = $2
            WHERE account_id = $1 AND revoked_at IS NULL
            RETURNING id
        ";
        let rows = sqlx::query(query)
            .bind(account_id)
            .bind(at)
            .fetch_all(&mut *self.tx)
            .instrument(query_span("UPDATE", query))
            .await
            .map_err(classify)?;
        rows.iter()
            .map(|row| row.try_get("id").map_err(StoreError::from))
            .collect()
    }

    async fn insert_artifact(&mut self, artifact: &Artifact) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO verification_artifacts
                (id, account_id, kind, token_hash, revoke_token_hash, target_email,
                 status, created_at, expires_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ";
        sqlx::query(query)
            .bind(artifact.id)
            .bind(artifact.account_id)
            .bind(artifact.kind.as_str())
            .bind(&artifact.token_hash)
            .bind(&artifact.revoke_token_hash)
            .bind(&artifact.target_email)
            .bind(artifact.status.as_str())
            .bind(artifact.created_at)
            .bind(artifact.expires_at)
            .bind(artifact.resolved_at)
            .execute(&mut *self.tx)
            .instrument(query_span("INSERT", query))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn pending_artifact(
        &mut self,
        account_id: Uuid,
        kind: ArtifactKind,
    ) -> Result<Option<Artifact>, StoreError> {
        let query = format!(
            "SELECT {ARTIFACT_COLUMNS} FROM verification_artifacts \
             WHERE account_id = $1 AND kind = $2 AND status = 'pending' FOR UPDATE"
        );
        let row = sqlx::query(&query)
            .bind(account_id)
            .bind(kind.as_str())
            .fetch_optional(&mut *self.tx)
            .instrument(query_span("SELECT", &query))
            .await
            .map_err(classify)?;
        row.as_ref().map(artifact_from_row).transpose()
    }

    async fn resolve_artifact(
        &mut self,
        artifact_id: Uuid,
        status: ArtifactStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE verification_artifacts
            SET status = $2, resolved_at = $3
            WHERE id = $1 AND status = 'pending'
        ";
        let result = sqlx::query(query)
            .bind(artifact_id)
            .bind(status.as_str())
            .bind(at)
            .execute(&mut *self.tx)
            .instrument(query_span("UPDATE", query))
            .await
            .map_err(classify)?;
        expect_one_row(result.rows_affected(), "pending artifact", artifact_id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(classify)
    }
}
