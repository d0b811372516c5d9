// src/client/queue.rs

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::local_store::{parse_timestamp, LocalStore, LocalStoreError};

pub const BOOKINGS_TABLE: &str = "bookings";

/// Mutação feita pelo entregador que ainda não foi confirmada pelo servidor.
/// O `action_id` é o ID lógico da ação: o servidor deduplica por ele no replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingAction {
    #[serde(rename_all = "camelCase")]
    Create {
        action_id: Uuid,
        slot_id: Uuid,
        metadata: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    Cancel {
        action_id: Uuid,
        booking_id: Uuid,
        reason: Option<String>,
    },
}

impl BookingAction {
    pub fn action_id(&self) -> Uuid {
        match self {
            BookingAction::Create { action_id, .. } | BookingAction::Cancel { action_id, .. } => *action_id,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            BookingAction::Create { .. } => "CREATE",
            BookingAction::Cancel { .. } => "CANCEL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Queued,
    InFlight,
}

impl EntryState {
    fn as_str(self) -> &'static str {
        match self {
            EntryState::Queued => "QUEUED",
            EntryState::InFlight => "IN_FLIGHT",
        }
    }

    fn parse(raw: &str) -> Result<Self, LocalStoreError> {
        match raw {
            "QUEUED" => Ok(EntryState::Queued),
            "IN_FLIGHT" => Ok(EntryState::InFlight),
            other => Err(LocalStoreError::Corrupt { column: "state", value: other.to_string() }),
        }
    }
}

/// Forma persistida: `{id, table, action, payload, createdAt, retries, lastRetryAt}`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub id: Uuid,
    pub seq: i64,
    pub table: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub state: EntryState,
    pub created_at: DateTime<Utc>,
    /// Ausente em entradas antigas: vale 0.
    pub retries: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn booking_action(&self) -> Result<BookingAction, LocalStoreError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

struct RawEntry {
    id: String,
    seq: i64,
    table: String,
    action: String,
    payload: String,
    state: String,
    created_at: String,
    retries: Option<i64>,
    last_retry_at: Option<String>,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            seq: row.get(1)?,
            table: row.get(2)?,
            action: row.get(3)?,
            payload: row.get(4)?,
            state: row.get(5)?,
            created_at: row.get(6)?,
            retries: row.get(7)?,
            last_retry_at: row.get(8)?,
        })
    }

    fn decode(self) -> Result<QueueEntry, LocalStoreError> {
        let id = Uuid::parse_str(&self.id).map_err(|_| LocalStoreError::Corrupt { column: "id", value: self.id.clone() })?;
        let created_at = parse_timestamp(&self.created_at).ok_or_else(|| LocalStoreError::Corrupt {
            column: "created_at",
            value: self.created_at.clone(),
        })?;
        Ok(QueueEntry {
            id,
            seq: self.seq,
            table: self.table,
            action: self.action,
            payload: serde_json::from_str(&self.payload)?,
            state: EntryState::parse(&self.state)?,
            created_at,
            retries: self.retries.unwrap_or(0).max(0) as u32,
            last_retry_at: self.last_retry_at.as_deref().and_then(parse_timestamp),
        })
    }
}

const ENTRY_COLUMNS: &str =
    "id, seq, table_name, action, payload, state, created_at, retries, last_retry_at";

/// Fila durável de ações offline, em ordem de chegada (FIFO).
#[derive(Debug, Clone)]
pub struct OfflineQueue {
    store: LocalStore,
}

impl OfflineQueue {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub fn enqueue(&self, action: &BookingAction, now: DateTime<Utc>) -> Result<QueueEntry, LocalStoreError> {
        let payload = serde_json::to_value(action)?;
        let id = action.action_id();
        self.store.with_tx(|tx| {
            tx.execute(
                "INSERT INTO offline_queue (id, table_name, action, payload, state, created_at, retries)
                 VALUES (?1, ?2, ?3, ?4, 'QUEUED', ?5, 0)",
                params![
                    id.to_string(),
                    BOOKINGS_TABLE,
                    action.tag(),
                    payload.to_string(),
                    now.to_rfc3339()
                ],
            )?;
            let raw = tx.query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM offline_queue WHERE id = ?1"),
                params![id.to_string()],
                RawEntry::from_row,
            )?;
            raw.decode()
        })
    }

    /// Todas as entradas QUEUED em ordem de inserção.
    pub fn pending(&self) -> Result<Vec<QueueEntry>, LocalStoreError> {
        self.select(
            &format!("SELECT {ENTRY_COLUMNS} FROM offline_queue WHERE state = 'QUEUED' ORDER BY seq ASC"),
            None,
        )
    }

    /// Usa o índice secundário por tabela.
    pub fn pending_for_table(&self, table: &str) -> Result<Vec<QueueEntry>, LocalStoreError> {
        self.select(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM offline_queue
                 WHERE table_name = ?1 AND state = 'QUEUED' ORDER BY seq ASC"
            ),
            Some(table),
        )
    }

    fn select(&self, sql: &str, table: Option<&str>) -> Result<Vec<QueueEntry>, LocalStoreError> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = match table {
                Some(t) => stmt.query_map(params![t], RawEntry::from_row)?.collect::<Result<Vec<_>, _>>()?,
                None => stmt.query_map([], RawEntry::from_row)?.collect::<Result<Vec<_>, _>>()?,
            };
            rows.into_iter().map(RawEntry::decode).collect()
        })
    }

    pub fn get(&self, id: Uuid) -> Result<Option<QueueEntry>, LocalStoreError> {
        self.store.with_conn(|conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM offline_queue WHERE id = ?1"),
                    params![id.to_string()],
                    RawEntry::from_row,
                )
                .optional()?;
            raw.map(RawEntry::decode).transpose()
        })
    }

    /// QUEUED → IN_FLIGHT. Falso se a entrada sumiu ou já estava em envio.
    pub fn mark_in_flight(&self, id: Uuid) -> Result<bool, LocalStoreError> {
        self.set_state(id, EntryState::Queued, EntryState::InFlight)
    }

    /// IN_FLIGHT → QUEUED sem contar falha (envio interrompido antes de sair).
    pub fn release(&self, id: Uuid) -> Result<bool, LocalStoreError> {
        self.set_state(id, EntryState::InFlight, EntryState::Queued)
    }

    fn set_state(&self, id: Uuid, from: EntryState, to: EntryState) -> Result<bool, LocalStoreError> {
        self.store.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE offline_queue SET state = ?3 WHERE id = ?1 AND state = ?2",
                params![id.to_string(), from.as_str(), to.as_str()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Conta uma tentativa falha e devolve a entrada para QUEUED. Retorna o novo total.
    pub fn record_failure(&self, id: Uuid, at: DateTime<Utc>) -> Result<u32, LocalStoreError> {
        self.store.with_tx(|tx| {
            tx.execute(
                "UPDATE offline_queue
                 SET retries = COALESCE(retries, 0) + 1, last_retry_at = ?2, state = 'QUEUED'
                 WHERE id = ?1",
                params![id.to_string(), at.to_rfc3339()],
            )?;
            let retries: Option<i64> = tx
                .query_row(
                    "SELECT retries FROM offline_queue WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            Ok(retries.unwrap_or(0).max(0) as u32)
        })
    }

    pub fn remove(&self, id: Uuid) -> Result<bool, LocalStoreError> {
        self.store.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM offline_queue WHERE id = ?1", params![id.to_string()])?;
            Ok(removed == 1)
        })
    }

    /// Remove só se ainda estiver QUEUED (nunca no meio de um envio).
    pub fn discard_queued(&self, id: Uuid) -> Result<bool, LocalStoreError> {
        self.store.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM offline_queue WHERE id = ?1 AND state = 'QUEUED'",
                params![id.to_string()],
            )?;
            Ok(removed == 1)
        })
    }

    pub fn len(&self) -> Result<usize, LocalStoreError> {
        self.store.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM offline_queue", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    pub fn is_empty(&self) -> Result<bool, LocalStoreError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_action() -> BookingAction {
        BookingAction::Create {
            action_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            metadata: json!({ "pedidos": 3 }),
        }
    }

    #[test]
    fn entries_come_back_in_fifo_order() {
        let queue = OfflineQueue::new(LocalStore::open_in_memory().unwrap());
        let first = create_action();
        let second = BookingAction::Cancel {
            action_id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            reason: Some("chuva".into()),
        };
        queue.enqueue(&first, Utc::now()).unwrap();
        queue.enqueue(&second, Utc::now()).unwrap();

        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].booking_action().unwrap(), first);
        assert_eq!(pending[1].action, "CANCEL");
        assert_eq!(queue.pending_for_table(BOOKINGS_TABLE).unwrap().len(), 2);
        assert!(queue.pending_for_table("outra").unwrap().is_empty());
    }

    #[test]
    fn new_entries_start_with_zero_retries() {
        let queue = OfflineQueue::new(LocalStore::open_in_memory().unwrap());
        let entry = queue.enqueue(&create_action(), Utc::now()).unwrap();
        assert_eq!(entry.retries, 0);
        assert_eq!(entry.state, EntryState::Queued);
        assert!(entry.last_retry_at.is_none());
    }

    #[test]
    fn failures_increment_retries_and_requeue() {
        let queue = OfflineQueue::new(LocalStore::open_in_memory().unwrap());
        let entry = queue.enqueue(&create_action(), Utc::now()).unwrap();

        assert!(queue.mark_in_flight(entry.id).unwrap());
        assert!(queue.pending().unwrap().is_empty());
        assert!(!queue.mark_in_flight(entry.id).unwrap());

        assert_eq!(queue.record_failure(entry.id, Utc::now()).unwrap(), 1);
        assert_eq!(queue.record_failure(entry.id, Utc::now()).unwrap(), 2);
        let stored = queue.get(entry.id).unwrap().unwrap();
        assert_eq!(stored.state, EntryState::Queued);
        assert_eq!(stored.retries, 2);
        assert!(stored.last_retry_at.is_some());
    }

    #[test]
    fn in_flight_entries_are_requeued_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fila.db");
        let entry_id = {
            let queue = OfflineQueue::new(LocalStore::open(&path).unwrap());
            let entry = queue.enqueue(&create_action(), Utc::now()).unwrap();
            queue.mark_in_flight(entry.id).unwrap();
            entry.id
        };

        let queue = OfflineQueue::new(LocalStore::open(&path).unwrap());
        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, entry_id);
    }

    #[test]
    fn in_flight_entries_cannot_be_discarded() {
        let queue = OfflineQueue::new(LocalStore::open_in_memory().unwrap());
        let entry = queue.enqueue(&create_action(), Utc::now()).unwrap();
        queue.mark_in_flight(entry.id).unwrap();
        assert!(!queue.discard_queued(entry.id).unwrap());
        queue.release(entry.id).unwrap();
        assert!(queue.discard_queued(entry.id).unwrap());
        assert!(queue.is_empty().unwrap());
    }
}
