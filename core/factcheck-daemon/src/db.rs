//! SQLite persistence for factcheck-daemon.
//!
//! The daemon is the only writer. State is a small key/value table so the
//! record stays readable with the sqlite3 shell: every field of
//! `PersistedState` is one row holding its JSON encoding.

use factcheck_protocol::{PersistedState, STATE_SCHEMA_VERSION};
use rusqlite::{params, Connection, OpenFlags};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Row keys paired with the field names of the serialized state.
const FIELD_KEYS: &[(&str, &str)] = &[
    ("schema_version", "version"),
    ("request_id", "requestId"),
    ("selectedText", "selectedText"),
    ("status", "status"),
    ("result", "result"),
    ("error", "error"),
    ("timestamp", "timestamp"),
    ("theme", "theme"),
];

pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> Result<Self, String> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn save_state(&self, state: &PersistedState) -> Result<(), String> {
        let encoded = serde_json::to_value(state)
            .map_err(|err| format!("Failed to serialize state: {}", err))?;
        let fields = match encoded {
            Value::Object(fields) => fields,
            _ => return Err("State did not serialize to an object".to_string()),
        };
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .map_err(|err| format!("Failed to start state transaction: {}", err))?;
            for (key, field) in FIELD_KEYS {
                let value = fields.get(*field).cloned().unwrap_or(Value::Null);
                tx.execute(
                    "INSERT INTO state (key, value, updated_at) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                     updated_at = excluded.updated_at",
                    params![key, value.to_string(), updated_at],
                )
                .map_err(|err| format!("Failed to write state key {}: {}", key, err))?;
            }
            tx.commit()
                .map_err(|err| format!("Failed to commit state: {}", err))?;
            Ok(())
        })
    }

    /// Returns `None` when nothing has been stored yet, or when the stored
    /// record was written by an incompatible schema version.
    pub fn load_state(&self) -> Result<Option<PersistedState>, String> {
        let rows = self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT key, value FROM state")
                .map_err(|err| format!("Failed to prepare state query: {}", err))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|err| format!("Failed to read state rows: {}", err))?;

            let mut stored = Vec::new();
            for row in rows {
                stored.push(row.map_err(|err| format!("Failed to decode state row: {}", err))?);
            }
            Ok(stored)
        })?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut fields = Map::new();
        for (key, raw) in rows {
            let Some((_, field)) = FIELD_KEYS.iter().find(|(stored, _)| *stored == key) else {
                tracing::debug!(key = %key, "Ignoring unknown state key");
                continue;
            };
            let value: Value = serde_json::from_str(&raw)
                .map_err(|err| format!("Failed to parse state key {}: {}", key, err))?;
            fields.insert(field.to_string(), value);
        }

        let version = fields.get("version").and_then(Value::as_u64);
        if version != Some(u64::from(STATE_SCHEMA_VERSION)) {
            tracing::warn!(
                found = ?version,
                expected = STATE_SCHEMA_VERSION,
                "Stored state has an unsupported schema version; starting fresh"
            );
            return Ok(None);
        }

        serde_json::from_value(Value::Object(fields))
            .map(Some)
            .map_err(|err| format!("Failed to decode stored state: {}", err))
    }

    fn init_schema(&self) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS state (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                 );",
            )
            .map_err(|err| format!("Failed to initialize schema: {}", err))
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, String>,
    ) -> Result<T, String> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection, String> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| format!("Failed to create daemon data dir: {}", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| format!("Failed to open sqlite db: {}", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| format!("Failed to enable WAL: {}", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| format!("Failed to set synchronous: {}", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| format!("Failed to set busy_timeout: {}", err))?;

        Ok(conn)
    }
}
