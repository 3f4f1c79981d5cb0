//! SQLite-backed mapping store.
//!
//! Per-key uniqueness is a partial unique index over live rows, so the duplicate
//! gate holds across processes sharing the database file.

use crate::model::{MappingStats, MappingStatus, MessageMapping, NewMapping, RemoteIds};
use crate::store::{claim_stamp, cutoff, MappingStore};
use crate::{Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const SELECT_COLUMNS: &str = "id, session_id, native_message_id, remote_message_id, \
    remote_conversation_id, counterpart_phone, direction, status, kind, content, \
    display_name, from_self, sent_at, phone_rules, created_at, updated_at";

/// Mapping store on a SQLite pool.
#[derive(Clone)]
pub struct SqliteMappingStore {
    pool: SqlitePool,
}

impl SqliteMappingStore {
    /// Open (creating if missing) the database at `database_url` and ensure the schema.
    ///
    /// `sqlite::memory:` gets a single connection, since every connection to an
    /// in-memory database sees its own empty database.
    pub async fn open(database_url: &str) -> Result<Self> {
        info!("Opening mapping store: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let in_memory = database_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 8 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating the schema if needed.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS message_mappings (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                native_message_id TEXT NOT NULL,
                remote_message_id TEXT,
                remote_conversation_id TEXT,
                counterpart_phone TEXT NOT NULL,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                kind TEXT NOT NULL,
                content TEXT,
                display_name TEXT,
                from_self INTEGER NOT NULL DEFAULT 0,
                sent_at INTEGER,
                phone_rules TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_mappings_live_key \
             ON message_mappings(session_id, native_message_id) \
             WHERE status IN ('pending', 'synced')",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_mappings_session_status \
             ON message_mappings(session_id, status, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_mappings_remote \
             ON message_mappings(session_id, remote_message_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_mappings_conversation \
             ON message_mappings(session_id, remote_conversation_id)",
        )
        .execute(&self.pool)
        .await?;

        debug!("Mapping schema ready");
        Ok(())
    }

    async fn insert(&self, mapping: MessageMapping) -> Result<MessageMapping> {
        let result = sqlx::query(
            r#"
            INSERT INTO message_mappings (id, session_id, native_message_id, remote_message_id,
                remote_conversation_id, counterpart_phone, direction, status, kind, content,
                display_name, from_self, sent_at, phone_rules, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&mapping.id)
        .bind(&mapping.session_id)
        .bind(&mapping.native_message_id)
        .bind(&mapping.remote_message_id)
        .bind(&mapping.remote_conversation_id)
        .bind(&mapping.counterpart_phone)
        .bind(mapping.direction.as_str())
        .bind(mapping.status.as_str())
        .bind(mapping.kind.as_str())
        .bind(&mapping.content)
        .bind(&mapping.display_name)
        .bind(mapping.from_self)
        .bind(mapping.sent_at.map(|at| at.timestamp_millis()))
        .bind(&mapping.phone_rules)
        .bind(mapping.created_at.timestamp_millis())
        .bind(mapping.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(mapping),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                StoreError::duplicate(&mapping.session_id, &mapping.native_message_id),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn transition(
        &self,
        mapping_id: &str,
        to: MappingStatus,
        remote: Option<RemoteIds>,
    ) -> Result<()> {
        let (remote_message_id, remote_conversation_id) = match remote {
            Some(remote) => (Some(remote.message_id), Some(remote.conversation_id)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE message_mappings
            SET status = ?,
                remote_message_id = COALESCE(?, remote_message_id),
                remote_conversation_id = COALESCE(?, remote_conversation_id),
                updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(to.as_str())
        .bind(remote_message_id)
        .bind(remote_conversation_id)
        .bind(Utc::now().timestamp_millis())
        .bind(mapping_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.get(mapping_id).await? {
            Some(existing) => Err(StoreError::InvalidTransition {
                id: mapping_id.to_string(),
                from: existing.status,
                to,
            }),
            None => Err(StoreError::NotFound(mapping_id.to_string())),
        }
    }

    async fn fetch_all(&self, sql: &str, binds: &[&str], tail: &[i64]) -> Result<Vec<MessageMapping>> {
        let mut query = sqlx::query_as::<_, MappingRow>(sql);
        for bind in binds {
            query = query.bind(*bind);
        }
        for bind in tail {
            query = query.bind(*bind);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(MessageMapping::try_from).collect()
    }
}

#[async_trait]
impl MappingStore for SqliteMappingStore {
    async fn is_mapped(&self, session_id: &str, native_message_id: &str) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM message_mappings WHERE session_id = ? AND native_message_id = ?)",
        )
        .bind(session_id)
        .bind(native_message_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_pending(&self, new: NewMapping) -> Result<MessageMapping> {
        self.insert(MessageMapping::from_new(new, MappingStatus::Pending))
            .await
    }

    async fn record_synced(&self, new: NewMapping, remote: RemoteIds) -> Result<MessageMapping> {
        let mut mapping = MessageMapping::from_new(new, MappingStatus::Synced);
        mapping.remote_message_id = Some(remote.message_id);
        mapping.remote_conversation_id = Some(remote.conversation_id);
        self.insert(mapping).await
    }

    async fn mark_synced(&self, mapping_id: &str, remote: RemoteIds) -> Result<()> {
        self.transition(mapping_id, MappingStatus::Synced, Some(remote))
            .await
    }

    async fn mark_failed(&self, mapping_id: &str) -> Result<()> {
        self.transition(mapping_id, MappingStatus::Failed, None).await
    }

    async fn get(&self, mapping_id: &str) -> Result<Option<MessageMapping>> {
        let sql = format!("SELECT {} FROM message_mappings WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, MappingRow>(&sql)
            .bind(mapping_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(MessageMapping::try_from).transpose()
    }

    async fn find_by_remote_message(
        &self,
        session_id: &str,
        remote_message_id: &str,
    ) -> Result<Option<MessageMapping>> {
        let sql = format!(
            "SELECT {} FROM message_mappings WHERE session_id = ? AND remote_message_id = ? \
             ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, MappingRow>(&sql)
            .bind(session_id)
            .bind(remote_message_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(MessageMapping::try_from).transpose()
    }

    async fn list_pending(
        &self,
        session_id: &str,
        limit: usize,
        min_age: Duration,
    ) -> Result<Vec<MessageMapping>> {
        let sql = format!(
            "SELECT {} FROM message_mappings \
             WHERE session_id = ? AND status = 'pending' AND created_at <= ? AND updated_at <= ? \
             ORDER BY created_at ASC LIMIT ?",
            SELECT_COLUMNS
        );
        let cutoff = cutoff(min_age).timestamp_millis();
        self.fetch_all(&sql, &[session_id], &[cutoff, cutoff, clamp_limit(limit)])
            .await
    }

    async fn list_failed(&self, session_id: &str, limit: usize) -> Result<Vec<MessageMapping>> {
        let sql = format!(
            "SELECT {} FROM message_mappings WHERE session_id = ? AND status = 'failed' \
             ORDER BY updated_at DESC LIMIT ?",
            SELECT_COLUMNS
        );
        self.fetch_all(&sql, &[session_id], &[clamp_limit(limit)]).await
    }

    async fn claim_pending(&self, mapping_id: &str, seen_updated_at: DateTime<Utc>) -> Result<bool> {
        let seen = seen_updated_at.timestamp_millis();
        let result = sqlx::query(
            "UPDATE message_mappings SET updated_at = ? \
             WHERE id = ? AND status = 'pending' AND updated_at = ?",
        )
        .bind(claim_stamp(from_millis(seen)?).timestamp_millis())
        .bind(mapping_id)
        .bind(seen)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.get(mapping_id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(mapping_id.to_string())),
        }
    }

    async fn list_synced_inbound_for_conversation(
        &self,
        session_id: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageMapping>> {
        let sql = format!(
            "SELECT {} FROM message_mappings \
             WHERE session_id = ? AND remote_conversation_id = ? \
               AND direction = 'inbound' AND status = 'synced' \
             ORDER BY created_at DESC LIMIT ?",
            SELECT_COLUMNS
        );
        self.fetch_all(&sql, &[session_id, conversation_id], &[clamp_limit(limit)])
            .await
    }

    async fn stats(&self, session_id: &str) -> Result<MappingStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM message_mappings WHERE session_id = ? GROUP BY status",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = MappingStats::default();
        for (status, count) in rows {
            let status = MappingStatus::from_str(&status).map_err(StoreError::Corrupt)?;
            stats.add(status, count.max(0) as u64);
        }
        Ok(stats)
    }

    async fn delete_older_than(&self, session_id: &str, age: Duration) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM message_mappings WHERE session_id = ? AND created_at <= ?")
                .bind(session_id)
                .bind(cutoff(age).timestamp_millis())
                .execute(&self.pool)
                .await?;

        info!(
            session_id,
            deleted = result.rows_affected(),
            "Deleted expired mappings"
        );
        Ok(result.rows_affected())
    }
}

fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[derive(Debug, FromRow)]
struct MappingRow {
    id: String,
    session_id: String,
    native_message_id: String,
    remote_message_id: Option<String>,
    remote_conversation_id: Option<String>,
    counterpart_phone: String,
    direction: String,
    status: String,
    kind: String,
    content: Option<String>,
    display_name: Option<String>,
    from_self: bool,
    sent_at: Option<i64>,
    phone_rules: String,
    created_at: i64,
    updated_at: i64,
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", millis)))
}

impl TryFrom<MappingRow> for MessageMapping {
    type Error = StoreError;

    fn try_from(row: MappingRow) -> Result<Self> {
        Ok(Self {
            direction: row.direction.parse().map_err(StoreError::Corrupt)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            kind: row.kind.parse().map_err(StoreError::Corrupt)?,
            sent_at: row.sent_at.map(from_millis).transpose()?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
            id: row.id,
            session_id: row.session_id,
            native_message_id: row.native_message_id,
            remote_message_id: row.remote_message_id,
            remote_conversation_id: row.remote_conversation_id,
            counterpart_phone: row.counterpart_phone,
            content: row.content,
            display_name: row.display_name,
            from_self: row.from_self,
            phone_rules: row.phone_rules,
        })
    }
}
