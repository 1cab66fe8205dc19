use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{StorageError, StorageResult};

pub const API_KEY: &str = "OPENROUTER_API_KEY";
pub const DEFAULT_MODEL: &str = "DEFAULT_MODEL";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub default_model: Option<String>,
}

/// Durable key-value settings that survive restarts.
///
/// Nothing is cached: every accessor queries the database, so a key saved by
/// another process is picked up by the next call.
pub struct CredentialStore {
    conn: Mutex<Connection>,
}

impl CredentialStore {
    pub fn open(db_path: &Path) -> StorageResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                context: format!("creating {}", parent.display()),
                source,
            })?;
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Blank values read back as absent.
    pub fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let value: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.filter(|v| !v.trim().is_empty()))
    }

    pub fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> StorageResult<()> {
        self.conn
            .lock()
            .execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn api_key(&self) -> StorageResult<Option<String>> {
        self.get(API_KEY)
    }

    pub fn default_model(&self) -> StorageResult<Option<String>> {
        self.get(DEFAULT_MODEL)
    }

    pub fn load(&self) -> StorageResult<Credentials> {
        Ok(Credentials {
            api_key: self.api_key()?,
            default_model: self.default_model()?,
        })
    }

    /// Explicit save action; `None` leaves the stored value untouched.
    pub fn save(&self, api_key: Option<&str>, default_model: Option<&str>) -> StorageResult<()> {
        if let Some(key) = api_key {
            self.set(API_KEY, key.trim())?;
        }
        if let Some(model) = default_model {
            self.set(DEFAULT_MODEL, model.trim())?;
        }
        log::info!("Settings saved");
        Ok(())
    }

    pub fn reset(&self) -> StorageResult<()> {
        self.remove(API_KEY)?;
        self.remove(DEFAULT_MODEL)?;
        log::info!("Settings reset");
        Ok(())
    }
}
