// src/client/replayer.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::connectivity::Connectivity;
use crate::client::local_store::LocalStoreError;
use crate::client::queue::{BookingAction, OfflineQueue};
use crate::client::remote::{BookingApi, RemoteError};
use crate::common::clock::Clock;
use crate::common::error::ErrorCode;
use crate::common::retry::{Retryable, RetryPolicy};

const EVENT_CAPACITY: usize = 64;

/// Avisos do replayer para a interface.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Applied { entry_id: Uuid },
    /// O servidor recusou a ação; ela não foi aplicada e saiu da fila.
    Rejected {
        entry_id: Uuid,
        code: Option<ErrorCode>,
        message: String,
    },
    /// Falhou em todas as tentativas; a ação NÃO foi aplicada.
    RetryExhausted {
        entry_id: Uuid,
        code: ErrorCode,
        retries: u32,
        message: String,
    },
    SyncComplete { succeeded: usize, failed: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub succeeded: usize,
    pub failed: usize,
    pub rejected: usize,
    pub exhausted: usize,
    pub remaining: usize,
    /// A passada parou numa falha retentável; o resto fica para a próxima.
    pub halted: bool,
}

/// Drena a fila offline contra a API, uma entrada por vez, em ordem FIFO.
pub struct SyncReplayer {
    api: Arc<dyn BookingApi>,
    queue: OfflineQueue,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    events: broadcast::Sender<SyncEvent>,
    pass_lock: Mutex<()>,
}

impl SyncReplayer {
    pub fn new(api: Arc<dyn BookingApi>, queue: OfflineQueue, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            queue,
            clock,
            policy: RetryPolicy::offline_sync(),
            events,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        // Sem ouvintes não é erro
        let _ = self.events.send(event);
    }

    /// Uma passada completa sobre as entradas QUEUED. Passadas nunca se sobrepõem.
    pub async fn run_once(&self) -> Result<SyncReport, LocalStoreError> {
        let _pass = self.pass_lock.lock().await;
        let mut report = SyncReport::default();

        for entry in self.queue.pending()? {
            // Descartada pelo usuário entre a leitura e o envio
            if !self.queue.mark_in_flight(entry.id)? {
                continue;
            }

            let action = match entry.booking_action() {
                Ok(action) => action,
                Err(err) => {
                    tracing::warn!(entry_id = %entry.id, error = %err, "Entrada ilegível removida da fila");
                    self.queue.remove(entry.id)?;
                    report.failed += 1;
                    report.rejected += 1;
                    self.emit(SyncEvent::Rejected {
                        entry_id: entry.id,
                        code: None,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            match self.submit(&action).await {
                Ok(()) => {
                    self.queue.remove(entry.id)?;
                    report.succeeded += 1;
                    self.emit(SyncEvent::Applied { entry_id: entry.id });
                }
                Err(err) if !err.is_retryable() => {
                    tracing::warn!(entry_id = %entry.id, error = %err, "Ação recusada na sincronização");
                    self.queue.remove(entry.id)?;
                    report.failed += 1;
                    report.rejected += 1;
                    self.emit(SyncEvent::Rejected {
                        entry_id: entry.id,
                        code: err.code(),
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    let retries = self.queue.record_failure(entry.id, self.clock.now())?;
                    report.failed += 1;
                    if self.policy.exhausted(retries) {
                        tracing::warn!(
                            entry_id = %entry.id,
                            retries,
                            error = %err,
                            "Tentativas esgotadas; ação removida sem ser aplicada"
                        );
                        self.queue.remove(entry.id)?;
                        report.exhausted += 1;
                        self.emit(SyncEvent::RetryExhausted {
                            entry_id: entry.id,
                            code: ErrorCode::SyncRetryExhausted,
                            retries,
                            message: err.to_string(),
                        });
                    } else {
                        tracing::debug!(entry_id = %entry.id, retries, error = %err, "Falha retentável");
                    }
                    // Não passa à frente de uma ação anterior do mesmo entregador
                    report.halted = true;
                    break;
                }
            }
        }

        report.remaining = self.queue.len()?;
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            remaining = report.remaining,
            "Sincronização concluída"
        );
        self.emit(SyncEvent::SyncComplete {
            succeeded: report.succeeded,
            failed: report.failed,
        });
        Ok(report)
    }

    async fn submit(&self, action: &BookingAction) -> Result<(), RemoteError> {
        match action {
            BookingAction::Create { action_id, slot_id, metadata } => {
                match self.api.create(*action_id, *slot_id, metadata.clone()).await {
                    Ok(_) => Ok(()),
                    // Reenvio de algo que já entrou: sucesso
                    Err(RemoteError::Rejected { code: ErrorCode::DuplicateBooking, .. }) => Ok(()),
                    Err(RemoteError::Timeout) => match self.api.find_by_action(*action_id).await? {
                        Some(_) => Ok(()),
                        None => Err(RemoteError::Timeout),
                    },
                    Err(err) => Err(err),
                }
            }
            BookingAction::Cancel { booking_id, reason, .. } => {
                match self.api.cancel(*booking_id, reason.clone()).await {
                    Ok(_) => Ok(()),
                    Err(RemoteError::Rejected { code: ErrorCode::AlreadyTerminal, .. }) => Ok(()),
                    Err(err) => Err(err),
                }
            }
        }
    }

    async fn drain_logged(&self) -> bool {
        match self.run_once().await {
            Ok(report) => report.halted && report.remaining > 0,
            Err(err) => {
                tracing::error!(error = %err, "Falha no armazenamento local durante a sincronização");
                true
            }
        }
    }

    /// Tarefa de fundo: drena ao voltar a rede, a cada gatilho manual e, enquanto
    /// sobrar entrada travada, após um atraso crescente. Para no `shutdown`.
    pub fn spawn(
        self: Arc<Self>,
        connectivity: Connectivity,
        trigger: Arc<Notify>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let mut online_rx = connectivity.subscribe();
        tokio::spawn(async move {
            let mut backoff_attempt: u32 = 0;
            let mut stalled = connectivity.is_online() && self.drain_logged().await;

            loop {
                let backoff = if stalled && connectivity.is_online() {
                    Some(self.policy.delay_for(backoff_attempt))
                } else {
                    None
                };

                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        tracing::debug!("Replayer encerrado");
                        break;
                    }
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !*online_rx.borrow_and_update() {
                            continue;
                        }
                        backoff_attempt = 0;
                    }
                    _ = trigger.notified() => {}
                    _ = sleep_or_wait(backoff) => {}
                }

                // Gatilho manual sem rede só queimaria tentativas
                if !connectivity.is_online() {
                    continue;
                }
                stalled = self.drain_logged().await;
                backoff_attempt = if stalled { backoff_attempt.saturating_add(1) } else { 0 };
            }
        })
    }
}

async fn sleep_or_wait(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending::<()>().await,
    }
}
