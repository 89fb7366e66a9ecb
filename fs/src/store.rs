//! SQLite-backed FeedStore

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::lock::SingletonLock;
use crate::model::{Article, Feed, NewArticle};
use crate::{INTERVAL_KEY, Result, StoreError, WORKERS_KEY};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS feeds (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    url         TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_feeds_updated_at ON feeds(updated_at);

CREATE TABLE IF NOT EXISTS articles (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_id      INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    title        TEXT NOT NULL,
    link         TEXT NOT NULL,
    description  TEXT NOT NULL DEFAULT '',
    published_at TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_articles_title ON articles(title);
CREATE INDEX IF NOT EXISTS idx_articles_feed_id ON articles(feed_id);

CREATE TABLE IF NOT EXISTS settings (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
"#;

/// Raw feed row before timestamp parsing
type FeedRow = (i64, String, String, String, String);

/// Raw article row before timestamp parsing
type ArticleRow = (i64, i64, String, String, String, Option<String>, String, String);

/// Persistent store for feeds, articles and settings
#[derive(Debug)]
pub struct FeedStore {
    path: PathBuf,
    conn: Mutex<Connection>,
    lock: SingletonLock,
}

impl FeedStore {
    /// Open (or create) the database at `path` and apply the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "FeedStore::open: called");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!(%mode, "FeedStore::open: journal mode set");
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;

        let lock = SingletonLock::new(lock_path_for(&path));
        info!(?path, "FeedStore opened");

        Ok(Self {
            path,
            conn: Mutex::new(conn),
            lock,
        })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // === Settings ===

    /// Persist default settings where nothing is stored yet
    pub fn seed_defaults(&self, interval: &str, workers: usize) -> Result<()> {
        debug!(%interval, workers, "FeedStore::seed_defaults: called");
        let conn = self.conn();
        let now = now_text();
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![INTERVAL_KEY, interval, now],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![WORKERS_KEY, workers.to_string(), now],
        )?;
        Ok(())
    }

    /// Read a raw setting value
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        debug!(%key, "FeedStore::get_setting: called");
        let value = self
            .conn()
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Write a raw setting value
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        debug!(%key, %value, "FeedStore::set_setting: called");
        self.conn().execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_text()],
        )?;
        Ok(())
    }

    /// Persisted poll interval text (e.g. `3m`)
    pub fn interval(&self) -> Result<String> {
        self.get_setting(INTERVAL_KEY)?
            .ok_or_else(|| StoreError::NotFound(format!("setting '{}'", INTERVAL_KEY)))
    }

    /// Persist the poll interval text
    pub fn set_interval(&self, interval: &str) -> Result<()> {
        if interval.trim().is_empty() {
            return Err(StoreError::Validation("interval cannot be empty".to_string()));
        }
        self.set_setting(INTERVAL_KEY, interval.trim())
    }

    /// Persisted worker count
    pub fn worker_count(&self) -> Result<usize> {
        let raw = self
            .get_setting(WORKERS_KEY)?
            .ok_or_else(|| StoreError::NotFound(format!("setting '{}'", WORKERS_KEY)))?;
        raw.trim()
            .parse()
            .map_err(|_| StoreError::InvalidData(format!("worker count '{}' is not a number", raw)))
    }

    /// Persist the worker count
    pub fn set_worker_count(&self, workers: usize) -> Result<()> {
        self.set_setting(WORKERS_KEY, &workers.to_string())
    }

    // === Feeds ===

    /// Whether a feed with this name or url is registered
    pub fn feed_exists(&self, name: &str, url: &str) -> Result<bool> {
        debug!(%name, %url, "FeedStore::feed_exists: called");
        let exists = self.conn().query_row(
            "SELECT EXISTS (SELECT 1 FROM feeds WHERE name = ?1 OR url = ?2)",
            params![name, url],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Register a new feed
    pub fn add_feed(&self, name: &str, url: &str) -> Result<Feed> {
        debug!(%name, %url, "FeedStore::add_feed: called");
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || url.is_empty() {
            return Err(StoreError::Validation("name and url cannot be empty".to_string()));
        }
        if self.feed_exists(name, url)? {
            return Err(StoreError::Duplicate(format!("feed with name '{}' or url '{}'", name, url)));
        }

        let now = Utc::now();
        let now_str = to_text(&now);
        let conn = self.conn();
        conn.execute(
            "INSERT INTO feeds (name, url, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, url, now_str],
        )?;
        let id = conn.last_insert_rowid();
        info!(id, %name, %url, "Feed added");

        Ok(Feed {
            id,
            name: name.to_string(),
            url: url.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// List feeds, newest registered first
    pub fn list_feeds(&self, limit: usize) -> Result<Vec<Feed>> {
        debug!(limit, "FeedStore::list_feeds: called");
        let rows: Vec<FeedRow> = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT id, name, url, created_at, updated_at FROM feeds
                 ORDER BY created_at DESC, id DESC LIMIT ?1",
            )?;
            stmt.query_map(params![limit as i64], read_feed_row)?
                .collect::<std::result::Result<_, _>>()?
        };
        rows.into_iter().map(feed_from_row).collect()
    }

    /// Delete a feed (and its articles) by name
    pub fn delete_feed(&self, name: &str) -> Result<()> {
        debug!(%name, "FeedStore::delete_feed: called");
        let deleted = self.conn().execute("DELETE FROM feeds WHERE name = ?1", params![name])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("feed '{}'", name)));
        }
        info!(%name, "Feed deleted");
        Ok(())
    }

    /// Claim up to `limit` feeds most overdue for a refresh
    ///
    /// Feeds come back ordered by last refresh, oldest first, and every
    /// returned feed has its `updated_at` advanced to now in the same
    /// transaction.
    pub fn claim_due_feeds(&self, limit: usize) -> Result<Vec<Feed>> {
        debug!(limit, "FeedStore::claim_due_feeds: called");
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let now_str = to_text(&now);
        let rows: Vec<FeedRow> = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let rows: Vec<FeedRow> = {
                let mut stmt = tx.prepare(
                    "SELECT id, name, url, created_at, updated_at FROM feeds
                     ORDER BY updated_at ASC, id ASC LIMIT ?1",
                )?;
                stmt.query_map(params![limit as i64], read_feed_row)?
                    .collect::<std::result::Result<_, _>>()?
            };
            for row in &rows {
                tx.execute("UPDATE feeds SET updated_at = ?1 WHERE id = ?2", params![now_str, row.0])?;
            }
            tx.commit()?;
            rows
        };

        debug!(claimed = rows.len(), "FeedStore::claim_due_feeds: claimed");
        rows.into_iter()
            .map(|row| {
                let mut feed = feed_from_row(row)?;
                feed.updated_at = now;
                Ok(feed)
            })
            .collect()
    }

    // === Articles ===

    /// Whether an article with this title has been ingested
    pub fn article_exists(&self, title: &str) -> Result<bool> {
        let exists = self.conn().query_row(
            "SELECT EXISTS (SELECT 1 FROM articles WHERE title = ?1)",
            params![title],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Insert an article for a feed, returning its id
    pub fn insert_article(&self, feed_id: i64, article: &NewArticle) -> Result<i64> {
        debug!(feed_id, title = %article.title, "FeedStore::insert_article: called");
        let now = now_text();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO articles (feed_id, title, link, description, published_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                feed_id,
                article.title,
                article.link,
                article.description,
                article.published_at.as_ref().map(to_text),
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List the latest articles, optionally restricted to one feed
    pub fn list_articles(&self, feed_name: Option<&str>, limit: usize) -> Result<Vec<Article>> {
        debug!(?feed_name, limit, "FeedStore::list_articles: called");
        let rows: Vec<ArticleRow> = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT a.id, a.feed_id, a.title, a.link, a.description, a.published_at, a.created_at, a.updated_at
                 FROM articles a JOIN feeds f ON f.id = a.feed_id
                 WHERE ?1 IS NULL OR f.name = ?1
                 ORDER BY COALESCE(a.published_at, a.created_at) DESC, a.id DESC
                 LIMIT ?2",
            )?;
            stmt.query_map(params![feed_name, limit as i64], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?
        };

        rows.into_iter()
            .map(|(id, feed_id, title, link, description, published_at, created_at, updated_at)| {
                Ok(Article {
                    id,
                    feed_id,
                    title,
                    link,
                    description,
                    published_at: published_at.as_deref().map(from_text).transpose()?,
                    created_at: from_text(&created_at)?,
                    updated_at: from_text(&updated_at)?,
                })
            })
            .collect()
    }

    /// Total number of stored articles
    pub fn article_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // === Singleton lock ===

    /// Try to become the single running poller for this database
    pub fn try_acquire_singleton(&self) -> Result<bool> {
        self.lock.try_acquire()
    }

    /// Give up the single-poller lock
    pub fn release_singleton(&self) -> Result<()> {
        self.lock.release()
    }

    /// PID of the process that last held the single-poller lock
    pub fn singleton_holder_pid(&self) -> Option<u32> {
        self.lock.holder_pid()
    }
}

fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut raw = db_path.as_os_str().to_owned();
    raw.push(".lock");
    PathBuf::from(raw)
}

fn read_feed_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeedRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn feed_from_row((id, name, url, created_at, updated_at): FeedRow) -> Result<Feed> {
    Ok(Feed {
        id,
        name,
        url,
        created_at: from_text(&created_at)?,
        updated_at: from_text(&updated_at)?,
    })
}

// Fixed-width UTC text so lexical order in SQLite matches time order
fn to_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now_text() -> String {
    to_text(&Utc::now())
}

fn from_text(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("timestamp '{}': {}", raw, e)))
}
