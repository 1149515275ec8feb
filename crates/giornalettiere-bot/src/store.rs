//! Persistent list of file names already published to the channel.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::settings::Settings;

/// Sent-file list backend.
pub trait FileListStore: Send {
    /// Every recorded name.
    fn list(&self) -> Result<Vec<String>>;

    /// Record `name`. Recording a present name is a no-op.
    fn add(&mut self, name: &str) -> Result<()>;

    /// Forget `name`. Forgetting an absent name is a no-op.
    fn remove(&mut self, name: &str) -> Result<()>;

    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.list()?.iter().any(|n| n == name))
    }
}

/// Open the backend selected by `json_db`.
pub fn open(settings: &Settings) -> Result<Box<dyn FileListStore>> {
    if settings.json_db {
        info!("using JSON file list {}", settings.file_list_path().display());
        Ok(Box::new(JsonFileList::open(settings.file_list_path())?))
    } else {
        info!("using SQLite file list {}", settings.db_path().display());
        Ok(Box::new(SqliteFileList::open(&settings.db_path())?))
    }
}

// ─────────────────────── SQLite ───────────────────────

/// Sent-file list stored in a SQLite table.
pub struct SqliteFileList {
    db: Connection,
}

impl SqliteFileList {
    /// Open or create the database and its `files` table.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let db = Connection::open(path)
            .with_context(|| format!("failed to open file list db: {}", path.display()))?;

        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS files (
                file_name TEXT,
                UNIQUE(file_name)
            );",
        )
        .context("failed to create files table")?;

        Ok(Self { db })
    }
}

impl FileListStore for SqliteFileList {
    fn list(&self) -> Result<Vec<String>> {
        let mut stmt = self.db.prepare("SELECT file_name FROM files")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn add(&mut self, name: &str) -> Result<()> {
        self.db
            .execute("INSERT OR IGNORE INTO files (file_name) VALUES (?1)", params![name])
            .with_context(|| format!("failed to record {name}"))?;
        info!("appended to DB file list [{name}]");
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        self.db
            .execute("DELETE FROM files WHERE file_name = ?1", params![name])
            .with_context(|| format!("failed to remove {name}"))?;
        Ok(())
    }

    fn contains(&self, name: &str) -> Result<bool> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM files WHERE file_name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

// ─────────────────────── JSON ───────────────────────

/// Sent-file list stored as a JSON array of names.
///
/// The file is re-read on every access so that manual edits are honoured.
pub struct JsonFileList {
    path: PathBuf,
}

impl JsonFileList {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Vec<String> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("stored file list not found, using an empty one");
                return Vec::new();
            }
            Err(e) => {
                warn!("cannot read {}: {e}, using an empty file list", self.path.display());
                return Vec::new();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("cannot decode the stored file list ({e}), using an empty one");
            Vec::new()
        })
    }

    fn write(&self, names: &[String]) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(names)?)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl FileListStore for JsonFileList {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.read())
    }

    fn add(&mut self, name: &str) -> Result<()> {
        let mut names = self.read();
        if names.iter().any(|n| n == name) {
            return Ok(());
        }
        names.push(name.to_string());
        self.write(&names)?;
        info!("appended to JSON file list [{name}]");
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        let mut names = self.read();
        let before = names.len();
        names.retain(|n| n != name);
        if names.len() != before {
            self.write(&names)?;
        }
        Ok(())
    }
}
