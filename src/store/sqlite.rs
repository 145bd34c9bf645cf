//! SQLite store on a single shared connection

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, types::Value, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::security::EncryptedSecret;
use crate::store::models::{
    format_timestamp, parse_timestamp, stored_now, Generation, GenerationFilter, NewGeneration,
    Page, PageRequest, User, UserSettings, UserSettingsPatch,
};
use crate::store::{StoreError, StoreResult, StudioStore};

const SCHEMA: &str = "
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
PRAGMA foreign_keys=ON;
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS user_settings (
    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    display_name TEXT,
    aspect_ratio TEXT NOT NULL,
    blur_strength INTEGER NOT NULL,
    theme TEXT NOT NULL,
    language TEXT NOT NULL,
    encrypted_api_key TEXT,
    api_key_iv TEXT,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS generations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    image_count INTEGER NOT NULL,
    aspect_ratio TEXT NOT NULL,
    prompt TEXT,
    result_urls TEXT NOT NULL,
    failed_slots TEXT NOT NULL,
    status TEXT NOT NULL,
    error_message TEXT,
    processing_time_ms INTEGER,
    model_used TEXT,
    is_favorite INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_generations_user_created ON generations(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_generations_user_status ON generations(user_id, status);
";

const GENERATION_COLUMNS: &str = "id, user_id, image_count, aspect_ratio, prompt, result_urls, \
     failed_slots, status, error_message, processing_time_ms, model_used, is_favorite, \
     created_at, updated_at, completed_at";

const SETTINGS_COLUMNS: &str = "user_id, display_name, aspect_ratio, blur_strength, theme, \
     language, encrypted_api_key, api_key_iv, updated_at";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Database(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        debug!("SQLite schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn call<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unexpected(e.to_string()))?
    }
}

struct SettingsRow {
    user_id: String,
    display_name: Option<String>,
    aspect_ratio: String,
    blur_strength: i64,
    theme: String,
    language: String,
    encrypted_api_key: Option<String>,
    api_key_iv: Option<String>,
    updated_at: String,
}

impl SettingsRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            display_name: row.get(1)?,
            aspect_ratio: row.get(2)?,
            blur_strength: row.get(3)?,
            theme: row.get(4)?,
            language: row.get(5)?,
            encrypted_api_key: row.get(6)?,
            api_key_iv: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_settings(self) -> StoreResult<UserSettings> {
        let api_key = match (self.encrypted_api_key, self.api_key_iv) {
            (Some(encrypted), Some(iv)) => Some(EncryptedSecret { encrypted, iv }),
            _ => None,
        };
        Ok(UserSettings {
            user_id: self.user_id,
            display_name: self.display_name,
            aspect_ratio: self.aspect_ratio.parse().map_err(StoreError::Corrupt)?,
            blur_strength: u8::try_from(self.blur_strength)
                .map_err(|_| StoreError::Corrupt(format!("blur_strength {}", self.blur_strength)))?,
            theme: self.theme.parse().map_err(StoreError::Corrupt)?,
            language: self.language,
            api_key,
            updated_at: timestamp(&self.updated_at)?,
        })
    }
}

struct GenerationRow {
    id: String,
    user_id: String,
    image_count: i64,
    aspect_ratio: String,
    prompt: Option<String>,
    result_urls: String,
    failed_slots: String,
    status: String,
    error_message: Option<String>,
    processing_time_ms: Option<i64>,
    model_used: Option<String>,
    is_favorite: bool,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl GenerationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            image_count: row.get(2)?,
            aspect_ratio: row.get(3)?,
            prompt: row.get(4)?,
            result_urls: row.get(5)?,
            failed_slots: row.get(6)?,
            status: row.get(7)?,
            error_message: row.get(8)?,
            processing_time_ms: row.get(9)?,
            model_used: row.get(10)?,
            is_favorite: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            completed_at: row.get(14)?,
        })
    }

    fn into_generation(self) -> StoreResult<Generation> {
        Ok(Generation {
            image_count: u32::try_from(self.image_count)
                .map_err(|_| StoreError::Corrupt(format!("image_count {}", self.image_count)))?,
            aspect_ratio: self.aspect_ratio.parse().map_err(StoreError::Corrupt)?,
            result_urls: serde_json::from_str(&self.result_urls)
                .map_err(|e| StoreError::Corrupt(format!("result_urls: {}", e)))?,
            failed_slots: serde_json::from_str(&self.failed_slots)
                .map_err(|e| StoreError::Corrupt(format!("failed_slots: {}", e)))?,
            status: self.status.parse().map_err(StoreError::Corrupt)?,
            processing_time_ms: self.processing_time_ms.and_then(|ms| u64::try_from(ms).ok()),
            created_at: timestamp(&self.created_at)?,
            updated_at: timestamp(&self.updated_at)?,
            completed_at: self.completed_at.as_deref().map(timestamp).transpose()?,
            id: self.id,
            user_id: self.user_id,
            prompt: self.prompt,
            error_message: self.error_message,
            model_used: self.model_used,
            is_favorite: self.is_favorite,
        })
    }
}

fn timestamp(text: &str) -> StoreResult<DateTime<Utc>> {
    parse_timestamp(text).map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", text, e)))
}

fn read_user(conn: &Connection, sql: &str, key: &str) -> StoreResult<Option<User>> {
    let row = conn
        .query_row(sql, params![key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .optional()?;

    row.map(|(id, email, name, created_at)| {
        Ok(User {
            id,
            email,
            name,
            created_at: timestamp(&created_at)?,
        })
    })
    .transpose()
}

fn read_settings(conn: &Connection, user_id: &str) -> StoreResult<Option<UserSettings>> {
    let sql = format!(
        "SELECT {} FROM user_settings WHERE user_id = ?1",
        SETTINGS_COLUMNS
    );
    conn.query_row(&sql, params![user_id], SettingsRow::from_row)
        .optional()?
        .map(SettingsRow::into_settings)
        .transpose()
}

fn read_generation(conn: &Connection, id: &str, user_id: &str) -> StoreResult<Generation> {
    let sql = format!(
        "SELECT {} FROM generations WHERE id = ?1 AND user_id = ?2",
        GENERATION_COLUMNS
    );
    conn.query_row(&sql, params![id, user_id], GenerationRow::from_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound("Generation".to_string()))?
        .into_generation()
}

fn json_text<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Database(e.to_string()))
}

#[async_trait]
impl StudioStore for SqliteStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_string();
        self.call(move |conn| {
            read_user(
                conn,
                "SELECT id, email, name, created_at FROM users WHERE email = ?1",
                &email,
            )
        })
        .await
    }

    async fn ensure_user(&self, email: &str, name: Option<&str>) -> StoreResult<User> {
        let email = email.to_string();
        let name = name.map(str::to_string);
        self.call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    email,
                    name,
                    format_timestamp(&stored_now())
                ],
            )?;
            read_user(
                conn,
                "SELECT id, email, name, created_at FROM users WHERE email = ?1",
                &email,
            )?
            .ok_or_else(|| StoreError::NotFound("User".to_string()))
        })
        .await
    }

    async fn get_user_settings(&self, user_id: &str) -> StoreResult<Option<UserSettings>> {
        let user_id = user_id.to_string();
        self.call(move |conn| read_settings(conn, &user_id)).await
    }

    async fn upsert_user_settings(
        &self,
        user_id: &str,
        patch: UserSettingsPatch,
    ) -> StoreResult<UserSettings> {
        let user_id = user_id.to_string();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let mut settings = match read_settings(&tx, &user_id)? {
                Some(existing) => existing,
                None => {
                    let user = read_user(
                        &tx,
                        "SELECT id, email, name, created_at FROM users WHERE id = ?1",
                        &user_id,
                    )?
                    .ok_or_else(|| StoreError::NotFound("User".to_string()))?;
                    UserSettings::defaults_for(&user)
                }
            };
            settings.apply(patch);

            let (encrypted, iv) = match &settings.api_key {
                Some(secret) => (Some(secret.encrypted.as_str()), Some(secret.iv.as_str())),
                None => (None, None),
            };
            tx.execute(
                "INSERT INTO user_settings (user_id, display_name, aspect_ratio, blur_strength, \
                 theme, language, encrypted_api_key, api_key_iv, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(user_id) DO UPDATE SET display_name = excluded.display_name, \
                 aspect_ratio = excluded.aspect_ratio, blur_strength = excluded.blur_strength, \
                 theme = excluded.theme, language = excluded.language, \
                 encrypted_api_key = excluded.encrypted_api_key, api_key_iv = excluded.api_key_iv, \
                 updated_at = excluded.updated_at",
                params![
                    settings.user_id,
                    settings.display_name,
                    settings.aspect_ratio.as_str(),
                    i64::from(settings.blur_strength),
                    settings.theme.as_str(),
                    settings.language,
                    encrypted,
                    iv,
                    format_timestamp(&settings.updated_at),
                ],
            )?;
            tx.commit()?;
            Ok(settings)
        })
        .await
    }

    async fn clear_api_key(&self, user_id: &str) -> StoreResult<bool> {
        let user_id = user_id.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE user_settings SET encrypted_api_key = NULL, api_key_iv = NULL, \
                 updated_at = ?2 WHERE user_id = ?1 AND encrypted_api_key IS NOT NULL",
                params![user_id, format_timestamp(&stored_now())],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn create_generation(&self, generation: NewGeneration) -> StoreResult<Generation> {
        self.call(move |conn| {
            let record = generation.into_generation(Uuid::new_v4().to_string(), stored_now());
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO generations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, \
                     ?10, ?11, ?12, ?13, ?14, ?15)",
                    GENERATION_COLUMNS
                ),
                params![
                    record.id,
                    record.user_id,
                    i64::from(record.image_count),
                    record.aspect_ratio.as_str(),
                    record.prompt,
                    json_text(&record.result_urls)?,
                    json_text(&record.failed_slots)?,
                    record.status.as_str(),
                    record.error_message,
                    record.processing_time_ms.and_then(|ms| i64::try_from(ms).ok()),
                    record.model_used,
                    record.is_favorite,
                    format_timestamp(&record.created_at),
                    format_timestamp(&record.updated_at),
                    record.completed_at.as_ref().map(format_timestamp),
                ],
            );
            match inserted {
                Ok(_) => Ok(record),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::NotFound("User".to_string()))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn list_generations(
        &self,
        user_id: &str,
        filter: &GenerationFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<Generation>> {
        let mut clauses = vec!["user_id = ?".to_string()];
        let mut args: Vec<Value> = vec![Value::Text(user_id.to_string())];
        if let Some(status) = filter.status {
            clauses.push("status = ?".to_string());
            args.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(favorite) = filter.favorite {
            clauses.push("is_favorite = ?".to_string());
            args.push(Value::Integer(i64::from(favorite)));
        }
        if let Some(start) = filter.start_date {
            clauses.push("created_at >= ?".to_string());
            args.push(Value::Text(format_timestamp(&start)));
        }
        if let Some(end) = filter.end_date {
            clauses.push("created_at <= ?".to_string());
            args.push(Value::Text(format_timestamp(&end)));
        }
        let where_clause = clauses.join(" AND ");
        let page = *page;

        self.call(move |conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM generations WHERE {}", where_clause),
                rusqlite::params_from_iter(args.iter()),
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {} FROM generations WHERE {} ORDER BY {} {}, rowid {} LIMIT {} OFFSET {}",
                GENERATION_COLUMNS,
                where_clause,
                page.sort_by.column(),
                page.sort_order.keyword(),
                page.sort_order.keyword(),
                page.limit,
                page.offset()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(args.iter()), GenerationRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let items = rows
                .into_iter()
                .map(GenerationRow::into_generation)
                .collect::<StoreResult<Vec<_>>>()?;

            Ok(Page {
                items,
                total: u64::try_from(total).unwrap_or(0),
                page: page.page,
                limit: page.limit,
            })
        })
        .await
    }

    async fn get_generation(&self, id: &str, user_id: &str) -> StoreResult<Generation> {
        let (id, user_id) = (id.to_string(), user_id.to_string());
        self.call(move |conn| read_generation(conn, &id, &user_id))
            .await
    }

    async fn update_generation_favorite(
        &self,
        id: &str,
        user_id: &str,
        is_favorite: bool,
    ) -> StoreResult<Generation> {
        let (id, user_id) = (id.to_string(), user_id.to_string());
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE generations SET is_favorite = ?3, updated_at = ?4 \
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id, is_favorite, format_timestamp(&stored_now())],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("Generation".to_string()));
            }
            read_generation(conn, &id, &user_id)
        })
        .await
    }

    async fn delete_generation(&self, id: &str, user_id: &str) -> StoreResult<()> {
        let (id, user_id) = (id.to_string(), user_id.to_string());
        self.call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM generations WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("Generation".to_string()));
            }
            Ok(())
        })
        .await
    }
}
