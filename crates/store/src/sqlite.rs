//! SQLite store.
//!
//! One database file with four tables:
//! - `users` — identity, onboarding flag, profile (JSON column)
//! - `messages` — append-only conversation log, `id` is the cursor
//! - `memories` — unique on `(user_id, category, key)`, upserted in place
//! - `protocols` — unique on `name`, seeded insert-if-absent
//!
//! Timestamps are RFC 3339 text with microsecond precision so that
//! lexical order equals chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use disha_core::error::StoreError;
use disha_core::memory::{Importance, MemoryCategory, MemoryRecord, MemoryStore, NewMemory};
use disha_core::message::{ConversationStore, Message, MessageId, Role};
use disha_core::protocol::{Protocol, ProtocolRegistry};
use disha_core::user::{Profile, ProfileStore, User};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed implementation of every store trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url`.
    ///
    /// Accepts `sqlite://path.db`, a bare path, or `sqlite::memory:` for an
    /// ephemeral database. Tables and indexes are created automatically.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // Every pooled connection to `:memory:` would see its own empty
        // database, so the ephemeral store pins a single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {url}");
        Ok(store)
    }

    /// Create tables and indexes if they do not exist yet.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&str, &str); 6] = [
            (
                "users table",
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                    username             TEXT UNIQUE NOT NULL,
                    onboarding_completed INTEGER NOT NULL DEFAULT 0,
                    profile              TEXT NOT NULL DEFAULT '{}',
                    created_at           TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id     INTEGER NOT NULL REFERENCES users(id),
                    role        TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    token_count INTEGER NOT NULL DEFAULT 0,
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_user_id ON messages(user_id, id DESC)",
            ),
            (
                "memories table",
                r#"
                CREATE TABLE IF NOT EXISTS memories (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id    INTEGER NOT NULL REFERENCES users(id),
                    category   TEXT NOT NULL,
                    key        TEXT NOT NULL,
                    value      TEXT NOT NULL,
                    importance INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE(user_id, category, key)
                )
                "#,
            ),
            (
                "memories index",
                "CREATE INDEX IF NOT EXISTS idx_memories_rank ON memories(user_id, importance DESC, updated_at DESC)",
            ),
            (
                "protocols table",
                r#"
                CREATE TABLE IF NOT EXISTS protocols (
                    id                INTEGER PRIMARY KEY AUTOINCREMENT,
                    name              TEXT UNIQUE NOT NULL,
                    category          TEXT NOT NULL,
                    keywords          TEXT NOT NULL DEFAULT '[]',
                    response_template TEXT NOT NULL,
                    priority          INTEGER NOT NULL DEFAULT 5
                )
                "#,
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }
}

fn now_str() -> String {
    format_ts(Utc::now())
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn query_failed(e: sqlx::Error) -> StoreError {
    StoreError::QueryFailed(e.to_string())
}

fn row_to_user(row: &SqliteRow) -> Result<User, StoreError> {
    let profile_json: String = column(row, "profile")?;
    let profile: Profile = serde_json::from_str(&profile_json)
        .map_err(|e| StoreError::Corrupt(format!("profile json: {e}")))?;
    let created_at: String = column(row, "created_at")?;
    let onboarding_completed: i64 = column(row, "onboarding_completed")?;

    Ok(User {
        id: column(row, "id")?,
        username: column(row, "username")?,
        onboarding_completed: onboarding_completed != 0,
        profile,
        created_at: parse_ts(&created_at)?,
    })
}

fn row_to_message(row: &SqliteRow) -> Result<Message, StoreError> {
    let role: String = column(row, "role")?;
    let created_at: String = column(row, "created_at")?;
    let token_count: i64 = column(row, "token_count")?;

    Ok(Message {
        id: column(row, "id")?,
        user_id: column(row, "user_id")?,
        role: Role::from_str(&role).map_err(StoreError::Corrupt)?,
        content: column(row, "content")?,
        token_count: token_count.max(0) as usize,
        created_at: parse_ts(&created_at)?,
    })
}

fn row_to_memory(row: &SqliteRow) -> Result<MemoryRecord, StoreError> {
    let category: String = column(row, "category")?;
    let importance: i64 = column(row, "importance")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(MemoryRecord {
        id: column(row, "id")?,
        user_id: column(row, "user_id")?,
        category: MemoryCategory::from_str(&category).map_err(StoreError::Corrupt)?,
        key: column(row, "key")?,
        value: column(row, "value")?,
        importance: Importance::clamped(importance),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn row_to_protocol(row: &SqliteRow) -> Result<Protocol, StoreError> {
    let keywords_json: String = column(row, "keywords")?;
    let priority: i64 = column(row, "priority")?;

    Ok(Protocol {
        name: column(row, "name")?,
        category: column(row, "category")?,
        keywords: serde_json::from_str(&keywords_json)
            .map_err(|e| StoreError::Corrupt(format!("keywords json: {e}")))?,
        response_template: column(row, "response_template")?,
        priority: priority.clamp(1, 10) as u8,
    })
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn get_or_create(&self, username: &str) -> Result<User, StoreError> {
        let inserted = sqlx::query("INSERT OR IGNORE INTO users (username, created_at) VALUES (?, ?)")
            .bind(username)
            .bind(now_str())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        if inserted.rows_affected() > 0 {
            info!(username, "Created user");
        }

        self.get(username)
            .await?
            .ok_or_else(|| StoreError::UserNotFound(username.to_string()))
    }

    async fn get(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn update_profile(
        &self,
        username: &str,
        profile: Profile,
        onboarding_completed: bool,
    ) -> Result<User, StoreError> {
        let profile_json = serde_json::to_string(&profile)
            .map_err(|e| StoreError::Storage(format!("profile json: {e}")))?;

        let result =
            sqlx::query("UPDATE users SET profile = ?, onboarding_completed = ? WHERE username = ?")
                .bind(profile_json)
                .bind(onboarding_completed as i64)
                .bind(username)
                .execute(&self.pool)
                .await
                .map_err(query_failed)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UserNotFound(username.to_string()));
        }

        self.get(username)
            .await?
            .ok_or_else(|| StoreError::UserNotFound(username.to_string()))
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn append(
        &self,
        user_id: i64,
        role: Role,
        content: &str,
        token_count: usize,
    ) -> Result<Message, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO messages (user_id, role, content, token_count, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .bind(token_count as i64)
        .bind(now_str())
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed)?;

        row_to_message(&row)
    }

    async fn fetch(
        &self,
        user_id: i64,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE user_id = ? AND (? IS NULL OR id < ?)
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(before)
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.iter().map(row_to_message).collect()
    }

    async fn count(&self, user_id: i64) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM messages WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        let n: i64 = column(&row, "n")?;
        Ok(n as usize)
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn upsert(&self, user_id: i64, memory: NewMemory) -> Result<MemoryRecord, StoreError> {
        let now = now_str();
        let row = sqlx::query(
            r#"
            INSERT INTO memories (user_id, category, key, value, importance, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, category, key) DO UPDATE SET
                value = excluded.value,
                importance = excluded.importance,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(memory.category.as_str())
        .bind(&memory.key)
        .bind(&memory.value)
        .bind(memory.importance.get() as i64)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(query_failed)?;

        row_to_memory(&row)
    }

    async fn top_k(
        &self,
        user_id: i64,
        k: usize,
        min_importance: Importance,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM memories
            WHERE user_id = ? AND importance >= ?
            ORDER BY importance DESC, updated_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(min_importance.get() as i64)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.iter().map(row_to_memory).collect()
    }

    async fn list(&self, user_id: i64) -> Result<Vec<MemoryRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM memories WHERE user_id = ? ORDER BY importance DESC, updated_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.iter().map(row_to_memory).collect()
    }
}

#[async_trait]
impl ProtocolRegistry for SqliteStore {
    async fn list(&self) -> Result<Vec<Protocol>, StoreError> {
        let rows = sqlx::query("SELECT * FROM protocols ORDER BY priority DESC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;

        rows.iter().map(row_to_protocol).collect()
    }

    async fn seed(&self, protocols: &[Protocol]) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for protocol in protocols {
            let keywords = serde_json::to_string(&protocol.keywords)
                .map_err(|e| StoreError::Storage(format!("keywords json: {e}")))?;
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO protocols (name, category, keywords, response_template, priority)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&protocol.name)
            .bind(&protocol.category)
            .bind(keywords)
            .bind(&protocol.response_template)
            .bind(protocol.priority as i64)
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
            inserted += result.rows_affected() as usize;
        }

        if inserted > 0 {
            info!(inserted, "Seeded protocols");
        }
        Ok(inserted)
    }
}
