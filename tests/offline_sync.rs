// tests/offline_sync.rs
//
// Fila offline + replayer contra uma API roteirizada.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use agenda_entregas::client::{
    BookingApi, ClientError, Connectivity, LocalStore, OfflineBookingClient, OfflineQueue, RemoteError, Submission,
    SyncEvent, SyncReplayer,
};
use agenda_entregas::common::clock::{Clock, SystemClock};
use agenda_entregas::common::error::ErrorCode;
use agenda_entregas::common::retry::RetryPolicy;
use agenda_entregas::models::booking::{Booking, BookingKind, BookingStatus, CreateBookingResponse, Disposition};

fn booking(slot_id: Uuid, status: BookingStatus) -> Booking {
    let now = Utc::now();
    Booking {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        slot_id,
        driver_id: Uuid::new_v4(),
        status,
        kind: BookingKind::Standard,
        client_action_id: None,
        metadata: json!({}),
        created_at: now,
        updated_at: now,
        cancelled_at: None,
        cancelled_by: None,
        cancel_reason: None,
    }
}

fn rejected(code: ErrorCode) -> RemoteError {
    RemoteError::Rejected { code, message: format!("{code:?}") }
}

/// API falsa: responde o que foi roteirizado e, sem roteiro, sucesso.
#[derive(Default)]
struct ScriptedApi {
    creates: Mutex<VecDeque<Result<CreateBookingResponse, RemoteError>>>,
    cancels: Mutex<VecDeque<Result<Booking, RemoteError>>>,
    lookups: Mutex<VecDeque<Result<Option<Booking>, RemoteError>>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedApi {
    fn script_create(&self, result: Result<CreateBookingResponse, RemoteError>) {
        self.creates.lock().unwrap().push_back(result);
    }

    fn script_cancel(&self, result: Result<Booking, RemoteError>) {
        self.cancels.lock().unwrap().push_back(result);
    }

    fn script_lookup(&self, result: Result<Option<Booking>, RemoteError>) {
        self.lookups.lock().unwrap().push_back(result);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BookingApi for ScriptedApi {
    async fn create(
        &self,
        _action_id: Uuid,
        slot_id: Uuid,
        _metadata: serde_json::Value,
    ) -> Result<CreateBookingResponse, RemoteError> {
        self.calls.lock().unwrap().push("create");
        let scripted = self.creates.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(CreateBookingResponse {
                disposition: Disposition::Confirmed,
                booking: booking(slot_id, BookingStatus::Active),
            })
        })
    }

    async fn cancel(&self, _booking_id: Uuid, _reason: Option<String>) -> Result<Booking, RemoteError> {
        self.calls.lock().unwrap().push("cancel");
        let scripted = self.cancels.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(booking(Uuid::new_v4(), BookingStatus::Cancelled)))
    }

    async fn find_by_action(&self, _action_id: Uuid) -> Result<Option<Booking>, RemoteError> {
        self.calls.lock().unwrap().push("lookup");
        let scripted = self.lookups.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(None))
    }
}

struct Device {
    api: Arc<ScriptedApi>,
    queue: OfflineQueue,
    connectivity: Connectivity,
    trigger: Arc<Notify>,
    client: OfflineBookingClient,
    replayer: Arc<SyncReplayer>,
}

impl Device {
    fn new(store: LocalStore, online: bool) -> Self {
        let api = Arc::new(ScriptedApi::default());
        let queue = OfflineQueue::new(store);
        let connectivity = Connectivity::new(online);
        let trigger = Arc::new(Notify::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let client = OfflineBookingClient::new(api.clone(), queue.clone(), connectivity.clone(), trigger.clone(), clock.clone())
            .with_lookup_policy(RetryPolicy::new(1, 1, 1, 0.0));
        let replayer = Arc::new(SyncReplayer::new(api.clone(), queue.clone(), clock));
        Self { api, queue, connectivity, trigger, client, replayer }
    }

    fn in_memory(online: bool) -> Self {
        Self::new(LocalStore::open_in_memory().unwrap(), online)
    }
}

fn drain_events(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn three_failed_syncs_drop_the_entry_and_report_exhaustion() {
    let device = Device::in_memory(false);
    let mut events = device.replayer.subscribe();

    let submission = device.client.create_booking(Uuid::new_v4(), json!({})).await.unwrap();
    let Submission::PendingSync { entry_id } = submission else {
        panic!("sem rede a ação deveria ir para a fila");
    };
    assert_eq!(device.queue.get(entry_id).unwrap().unwrap().retries, 0);

    for _ in 0..3 {
        device.api.script_create(Err(RemoteError::Unreachable("sem sinal".into())));
    }

    for expected in 1..=2 {
        let report = device.replayer.run_once().await.unwrap();
        assert!(report.halted);
        assert_eq!(device.queue.get(entry_id).unwrap().unwrap().retries, expected);
    }

    let report = device.replayer.run_once().await.unwrap();
    assert_eq!(report.exhausted, 1);
    assert!(device.queue.get(entry_id).unwrap().is_none());

    let exhausted: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::RetryExhausted { entry_id, code, retries, .. } => Some((entry_id, code, retries)),
            _ => None,
        })
        .collect();
    assert_eq!(exhausted, vec![(entry_id, ErrorCode::SyncRetryExhausted, 3)]);

    // Nunca uma quarta tentativa
    device.replayer.run_once().await.unwrap();
    assert_eq!(device.api.calls(), vec!["create", "create", "create"]);
}

#[tokio::test]
async fn duplicate_on_replay_counts_as_success() {
    let device = Device::in_memory(false);
    let mut events = device.replayer.subscribe();
    device.client.create_booking(Uuid::new_v4(), json!({})).await.unwrap();
    device.api.script_create(Err(rejected(ErrorCode::DuplicateBooking)));

    let report = device.replayer.run_once().await.unwrap();
    assert_eq!((report.succeeded, report.failed), (1, 0));
    assert!(device.queue.is_empty().unwrap());
    assert!(drain_events(&mut events)
        .iter()
        .all(|event| !matches!(event, SyncEvent::Rejected { .. } | SyncEvent::RetryExhausted { .. })));
}

#[tokio::test]
async fn cancel_of_an_already_closed_booking_is_benign() {
    let device = Device::in_memory(false);
    device.client.cancel_booking(Uuid::new_v4(), None).await.unwrap();
    device.api.script_cancel(Err(rejected(ErrorCode::AlreadyTerminal)));

    let report = device.replayer.run_once().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(device.queue.is_empty().unwrap());
}

#[tokio::test]
async fn replay_is_fifo_and_stops_at_the_first_retryable_failure() {
    let device = Device::in_memory(false);
    device.client.create_booking(Uuid::new_v4(), json!({})).await.unwrap();
    device.client.cancel_booking(Uuid::new_v4(), Some("chuva".into())).await.unwrap();
    device.client.create_booking(Uuid::new_v4(), json!({})).await.unwrap();
    device.api.script_cancel(Err(RemoteError::Server { status: 503, message: "ocupado".into() }));

    let report = device.replayer.run_once().await.unwrap();
    assert_eq!((report.succeeded, report.failed, report.remaining), (1, 1, 2));
    assert!(report.halted);
    assert_eq!(device.api.calls(), vec!["create", "cancel"]);

    let report = device.replayer.run_once().await.unwrap();
    assert_eq!((report.succeeded, report.remaining), (2, 0));
    assert_eq!(device.api.calls(), vec!["create", "cancel", "cancel", "create"]);
}

#[tokio::test]
async fn business_rejection_is_removed_and_reported() {
    let device = Device::in_memory(false);
    let mut events = device.replayer.subscribe();
    device.client.create_booking(Uuid::new_v4(), json!({})).await.unwrap();
    device.client.create_booking(Uuid::new_v4(), json!({})).await.unwrap();
    device.api.script_create(Err(rejected(ErrorCode::SlotFull)));

    let report = device.replayer.run_once().await.unwrap();
    assert_eq!((report.rejected, report.succeeded, report.remaining), (1, 1, 0));
    assert!(!report.halted);
    assert!(drain_events(&mut events).iter().any(|event| matches!(
        event,
        SyncEvent::Rejected { code: Some(ErrorCode::SlotFull), .. }
    )));
}

#[tokio::test]
async fn timed_out_replay_is_resolved_by_action_lookup() {
    let device = Device::in_memory(false);
    device.client.create_booking(Uuid::new_v4(), json!({})).await.unwrap();
    device.api.script_create(Err(RemoteError::Timeout));
    device.api.script_lookup(Ok(Some(booking(Uuid::new_v4(), BookingStatus::Active))));

    let report = device.replayer.run_once().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(device.api.calls(), vec!["create", "lookup"]);
}

#[tokio::test]
async fn online_create_timeout_requeries_before_queueing() {
    let device = Device::in_memory(true);
    let slot_id = Uuid::new_v4();

    device.api.script_create(Err(RemoteError::Timeout));
    device.api.script_lookup(Ok(Some(booking(slot_id, BookingStatus::Pending))));
    let applied = device.client.create_booking(slot_id, json!({})).await.unwrap();
    match applied {
        Submission::Applied(response) => assert_eq!(response.disposition, Disposition::Waitlisted),
        other => panic!("esperava resultado aplicado, veio {other:?}"),
    }
    assert!(device.queue.is_empty().unwrap());

    device.api.script_create(Err(RemoteError::Timeout));
    device.api.script_lookup(Ok(None));
    let pending = device.client.create_booking(slot_id, json!({})).await.unwrap();
    assert!(pending.is_pending());
    assert_eq!(device.queue.len().unwrap(), 1);
}

#[tokio::test]
async fn online_actions_wait_behind_older_queued_ones() {
    let device = Device::in_memory(false);
    device.client.create_booking(Uuid::new_v4(), json!({})).await.unwrap();

    device.connectivity.set_online(true);
    let second = device.client.cancel_booking(Uuid::new_v4(), None).await.unwrap();
    assert!(second.is_pending());
    assert!(device.api.calls().is_empty());
    assert_eq!(device.client.pending_actions().unwrap().len(), 2);
}

#[tokio::test]
async fn business_rejection_online_is_surfaced_not_queued() {
    let device = Device::in_memory(true);
    device.api.script_create(Err(rejected(ErrorCode::TimeConflict)));

    let err = device.client.create_booking(Uuid::new_v4(), json!({})).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected { code: ErrorCode::TimeConflict, .. }));
    assert!(device.queue.is_empty().unwrap());
}

#[tokio::test]
async fn pending_creates_can_be_discarded_before_sync() {
    let device = Device::in_memory(false);
    let Submission::PendingSync { entry_id } = device.client.create_booking(Uuid::new_v4(), json!({})).await.unwrap() else {
        panic!("deveria ficar pendente");
    };
    assert!(device.client.discard_pending(entry_id).unwrap());
    assert!(!device.client.discard_pending(entry_id).unwrap());
    assert!(device.client.pending_actions().unwrap().is_empty());
}

#[tokio::test]
async fn queued_actions_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aparelho.db");

    {
        let device = Device::new(LocalStore::open(&path).unwrap(), false);
        device.client.create_booking(Uuid::new_v4(), json!({ "pedidos": 4 })).await.unwrap();
        device.client.cancel_booking(Uuid::new_v4(), None).await.unwrap();
    }

    let device = Device::new(LocalStore::open(&path).unwrap(), true);
    let report = device.replayer.run_once().await.unwrap();
    assert_eq!((report.succeeded, report.remaining), (2, 0));
    assert_eq!(device.api.calls(), vec!["create", "cancel"]);
}

#[tokio::test]
async fn background_replayer_drains_when_connectivity_returns() {
    let device = Device::in_memory(false);
    device.client.create_booking(Uuid::new_v4(), json!({})).await.unwrap();
    let mut events = device.replayer.subscribe();

    let shutdown = CancellationToken::new();
    let handle = device
        .replayer
        .clone()
        .spawn(device.connectivity.clone(), device.trigger.clone(), shutdown.clone());

    device.connectivity.set_online(true);
    let complete = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(SyncEvent::SyncComplete { succeeded, failed }) = events.recv().await {
                return (succeeded, failed);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(complete, (1, 0));
    assert!(device.queue.is_empty().unwrap());

    shutdown.cancel();
    handle.await.unwrap();
}
