use serde::{Deserialize, Deserializer, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, FromRow};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;
use tracing::{info, instrument};

const RECENT_VISITS_LIMIT: i64 = 100;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS leads (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL DEFAULT '',
        business TEXT NOT NULL DEFAULT '',
        playback TEXT NOT NULL DEFAULT '',
        email TEXT NOT NULL DEFAULT '',
        message TEXT NOT NULL DEFAULT '',
        palette TEXT NOT NULL DEFAULT '',
        hours_est INTEGER NOT NULL DEFAULT 0,
        store_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS analytics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ip TEXT NOT NULL DEFAULT '',
        user_agent TEXT NOT NULL DEFAULT '',
        path TEXT NOT NULL DEFAULT '',
        method TEXT NOT NULL DEFAULT '',
        country TEXT NOT NULL DEFAULT '',
        city TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// A contact form submission.
///
/// The browser sends `system` for the playback setup and the two estimate
/// fields as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub business: String,
    #[serde(rename = "system")]
    pub playback: String,
    pub email: String,
    pub message: String,
    pub palette: String,
    #[serde(deserialize_with = "int_or_numeric_string")]
    pub hours_est: i64,
    #[serde(deserialize_with = "int_or_numeric_string")]
    pub store_count: i64,
    pub created_at: String,
}

/// One tracked request, enriched with its location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct Visit {
    pub id: i64,
    pub ip: String,
    pub user_agent: String,
    pub path: String,
    pub method: String,
    pub country: String,
    pub city: String,
    pub created_at: String,
}

fn int_or_numeric_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Persistence for leads and analytics visits.
pub trait Store: Send + Sync {
    fn save_lead(&self, lead: Lead) -> StoreFuture<'_, ()>;

    fn save_visit(&self, visit: Visit) -> StoreFuture<'_, ()>;

    /// All leads, newest first.
    fn recent_leads(&self) -> StoreFuture<'_, Vec<Lead>>;

    /// The latest visits, newest first.
    fn recent_visits(&self) -> StoreFuture<'_, Vec<Visit>>;

    /// Round-trips to the database.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and ensures the schema.
    #[instrument(err(Debug))]
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!(path = %path.display(), "Database ready");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Store for SqliteStore {
    #[instrument(skip_all, err(Debug))]
    fn save_lead(&self, lead: Lead) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO leads (name, business, playback, email, message, palette, hours_est, store_count)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(lead.name)
            .bind(lead.business)
            .bind(lead.playback)
            .bind(lead.email)
            .bind(lead.message)
            .bind(lead.palette)
            .bind(lead.hours_est)
            .bind(lead.store_count)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    #[instrument(skip_all, err(Debug))]
    fn save_visit(&self, visit: Visit) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO analytics (ip, user_agent, path, method, country, city)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(visit.ip)
            .bind(visit.user_agent)
            .bind(visit.path)
            .bind(visit.method)
            .bind(visit.country)
            .bind(visit.city)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn recent_leads(&self) -> StoreFuture<'_, Vec<Lead>> {
        Box::pin(async move {
            let leads = sqlx::query_as::<_, Lead>(
                "SELECT id, name, business, playback, email, message, palette, hours_est, store_count, created_at
                 FROM leads ORDER BY created_at DESC, id DESC",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(leads)
        })
    }

    fn recent_visits(&self) -> StoreFuture<'_, Vec<Visit>> {
        Box::pin(async move {
            let visits = sqlx::query_as::<_, Visit>(
                "SELECT id, ip, user_agent, path, method, country, city, created_at
                 FROM analytics ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(RECENT_VISITS_LIMIT)
            .fetch_all(&self.pool)
            .await?;
            Ok(visits)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await?;
            Ok(())
        })
    }
}
