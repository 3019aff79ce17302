use crate::error::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;
use trawl_scanner::Item;

/// Record of items written by earlier runs.
pub struct Archive {
    conn: Connection,
}

/// Archive key of an item: `{category}:{context}:{node}`.
pub fn archive_key(category: &str, item: &Item) -> String {
    let context = item
        .metadata
        .get("context")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    format!("{}:{}:{}", category, context, item.node)
}

impl Archive {
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        let archive = Archive { conn };
        archive.init_schema()?;
        Ok(archive)
    }

    pub fn in_memory() -> Result<Self> {
        let archive = Archive {
            conn: Connection::open_in_memory()?,
        };
        archive.init_schema()?;
        Ok(archive)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS archive (
                entry TEXT PRIMARY KEY,
                recorded_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Records `entry`. Recording an entry twice keeps the first timestamp.
    pub fn record(&self, entry: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO archive (entry, recorded_at) VALUES (?1, ?2)",
            params![entry, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// When `entry` was first recorded, or `None` if it never was.
    pub fn recorded_at(&self, entry: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT recorded_at FROM archive WHERE entry = ?1",
                params![entry],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM archive", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
