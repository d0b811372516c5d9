// src/client/local_store.rs

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thiserror::Error;

/// Tamanho do anel de respostas dinâmicas guardadas para uso offline.
pub const DATA_RING_CAPACITY: usize = 50;

#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("erro no SQLite local: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("lock do armazenamento local envenenado")]
    LockPoisoned,
    #[error("payload inválido na fila: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("valor inesperado na coluna {column}: '{value}'")]
    Corrupt { column: &'static str, value: String },
}

/// Resposta HTTP guardada no cache local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

/// Armazenamento durável do aparelho (um arquivo SQLite): fila offline e caches.
/// Sobrevive a reinícios; toda escrita passa pelo mesmo lock.
#[derive(Debug, Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LocalStoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LocalStoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LocalStoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS offline_queue (
                 seq INTEGER PRIMARY KEY AUTOINCREMENT,
                 id TEXT NOT NULL UNIQUE,
                 table_name TEXT NOT NULL,
                 action TEXT NOT NULL,
                 payload TEXT NOT NULL,
                 state TEXT NOT NULL DEFAULT 'QUEUED',
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_offline_queue_table ON offline_queue (table_name);
             CREATE TABLE IF NOT EXISTS asset_cache (
                 url TEXT PRIMARY KEY,
                 status INTEGER NOT NULL,
                 content_type TEXT,
                 body BLOB NOT NULL,
                 stored_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS data_cache (
                 seq INTEGER PRIMARY KEY AUTOINCREMENT,
                 url TEXT NOT NULL UNIQUE,
                 status INTEGER NOT NULL,
                 content_type TEXT,
                 body BLOB NOT NULL,
                 stored_at TEXT NOT NULL
             );",
        )?;

        // Entradas gravadas por versões antigas do app não têm as colunas de retentativa
        let existing_columns: Vec<String> = {
            let mut stmt = conn.prepare("PRAGMA table_info(offline_queue)")?;
            stmt.query_map([], |row| row.get::<_, String>(1))?
                .collect::<Result<Vec<_>, _>>()?
        };
        if !existing_columns.iter().any(|name| name == "retries") {
            conn.execute("ALTER TABLE offline_queue ADD COLUMN retries INTEGER", [])?;
        }
        if !existing_columns.iter().any(|name| name == "last_retry_at") {
            conn.execute("ALTER TABLE offline_queue ADD COLUMN last_retry_at TEXT", [])?;
        }

        // Um processo que morreu no meio do envio deixa a entrada IN_FLIGHT
        let recovered = conn.execute(
            "UPDATE offline_queue SET state = 'QUEUED' WHERE state = 'IN_FLIGHT'",
            [],
        )?;
        if recovered > 0 {
            tracing::warn!(recovered, "Entradas IN_FLIGHT devolvidas para a fila após reinício");
        }

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, LocalStoreError>,
    ) -> Result<T, LocalStoreError> {
        let guard = self.conn.lock().map_err(|_| LocalStoreError::LockPoisoned)?;
        f(&guard)
    }

    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, LocalStoreError>,
    ) -> Result<T, LocalStoreError> {
        let mut guard = self.conn.lock().map_err(|_| LocalStoreError::LockPoisoned)?;
        let tx = guard.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // --- Cache de arquivos estáticos (cache-first) ---

    pub fn get_asset(&self, url: &str) -> Result<Option<StoredResponse>, LocalStoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT url, status, content_type, body, stored_at FROM asset_cache WHERE url = ?1",
                    params![url],
                    read_stored_response,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn put_asset(&self, response: &StoredResponse) -> Result<(), LocalStoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO asset_cache (url, status, content_type, body, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(url) DO UPDATE SET
                   status = excluded.status,
                   content_type = excluded.content_type,
                   body = excluded.body,
                   stored_at = excluded.stored_at",
                params![
                    response.url,
                    response.status,
                    response.content_type,
                    response.body,
                    response.stored_at.to_rfc3339()
                ],
            )?;
            Ok(())
        })
    }

    // --- Anel de respostas dinâmicas (network-first) ---

    pub fn get_data(&self, url: &str) -> Result<Option<StoredResponse>, LocalStoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT url, status, content_type, body, stored_at FROM data_cache WHERE url = ?1",
                    params![url],
                    read_stored_response,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Grava como a entrada mais recente e descarta as mais antigas além da capacidade.
    pub fn put_data(&self, response: &StoredResponse) -> Result<(), LocalStoreError> {
        self.with_tx(|tx| {
            tx.execute("DELETE FROM data_cache WHERE url = ?1", params![response.url])?;
            tx.execute(
                "INSERT INTO data_cache (url, status, content_type, body, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    response.url,
                    response.status,
                    response.content_type,
                    response.body,
                    response.stored_at.to_rfc3339()
                ],
            )?;
            tx.execute(
                "DELETE FROM data_cache WHERE seq NOT IN
                   (SELECT seq FROM data_cache ORDER BY seq DESC LIMIT ?1)",
                params![DATA_RING_CAPACITY as i64],
            )?;
            Ok(())
        })
    }

    pub fn data_len(&self) -> Result<usize, LocalStoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM data_cache", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}

fn read_stored_response(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredResponse> {
    let stored_at: String = row.get(4)?;
    Ok(StoredResponse {
        url: row.get(0)?,
        status: row.get(1)?,
        content_type: row.get(2)?,
        body: row.get(3)?,
        stored_at: parse_timestamp(&stored_at).unwrap_or_default(),
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(url: &str) -> StoredResponse {
        StoredResponse {
            url: url.to_string(),
            status: 200,
            content_type: Some("application/json".into()),
            body: br#"{"ok":true}"#.to_vec(),
            stored_at: Utc::now(),
        }
    }

    #[test]
    fn data_ring_evicts_oldest_first() {
        let store = LocalStore::open_in_memory().unwrap();
        for i in 0..(DATA_RING_CAPACITY + 5) {
            store.put_data(&response(&format!("https://app.local/api/slots?page={i}"))).unwrap();
        }
        assert_eq!(store.data_len().unwrap(), DATA_RING_CAPACITY);
        assert!(store.get_data("https://app.local/api/slots?page=0").unwrap().is_none());
        assert!(store.get_data("https://app.local/api/slots?page=54").unwrap().is_some());
    }

    #[test]
    fn refreshing_an_entry_makes_it_newest() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put_data(&response("https://app.local/a")).unwrap();
        for i in 0..(DATA_RING_CAPACITY - 1) {
            store.put_data(&response(&format!("https://app.local/{i}"))).unwrap();
        }
        store.put_data(&response("https://app.local/a")).unwrap();
        store.put_data(&response("https://app.local/extra")).unwrap();
        assert!(store.get_data("https://app.local/a").unwrap().is_some());
        assert!(store.get_data("https://app.local/0").unwrap().is_none());
    }

    #[test]
    fn legacy_queue_schema_gains_retry_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE offline_queue (
                     seq INTEGER PRIMARY KEY AUTOINCREMENT,
                     id TEXT NOT NULL UNIQUE,
                     table_name TEXT NOT NULL,
                     action TEXT NOT NULL,
                     payload TEXT NOT NULL,
                     state TEXT NOT NULL DEFAULT 'QUEUED',
                     created_at TEXT NOT NULL
                 );
                 INSERT INTO offline_queue (id, table_name, action, payload, created_at)
                 VALUES ('a', 'bookings', 'CREATE', '{}', '2025-03-01T10:00:00Z');",
            )
            .unwrap();
        }

        let store = LocalStore::open(&path).unwrap();
        let retries: Option<i64> = store
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT retries FROM offline_queue WHERE id = 'a'", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(retries, None);
    }
}
