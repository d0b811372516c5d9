// src/client/booking_client.rs

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::client::connectivity::Connectivity;
use crate::client::local_store::LocalStoreError;
use crate::client::queue::{BookingAction, OfflineQueue, QueueEntry};
use crate::client::remote::{BookingApi, RemoteError};
use crate::common::clock::Clock;
use crate::common::error::ErrorCode;
use crate::common::retry::{Retryable, RetryPolicy};
use crate::models::booking::{Booking, BookingStatus, CreateBookingResponse, Disposition};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] LocalStoreError),
    /// Recusa de negócio (conflito, lotação, liberação...). Não entra na fila.
    #[error("{message}")]
    Rejected { code: ErrorCode, message: String },
    #[error(transparent)]
    Remote(RemoteError),
}

/// Resultado visto pela interface: aplicado agora ou pendente de sincronização.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission<T> {
    Applied(T),
    PendingSync { entry_id: Uuid },
}

impl<T> Submission<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Submission::PendingSync { .. })
    }
}

/// Frente offline-first das mutações do entregador.
///
/// Online, chama a API direto. Sem rede (ou com a fila ainda não drenada, para não
/// inverter a ordem das ações) grava na fila durável e acorda o replayer.
#[derive(Clone)]
pub struct OfflineBookingClient {
    api: Arc<dyn BookingApi>,
    queue: OfflineQueue,
    connectivity: Connectivity,
    sync_trigger: Arc<Notify>,
    clock: Arc<dyn Clock>,
    lookup_policy: RetryPolicy,
}

impl OfflineBookingClient {
    pub fn new(
        api: Arc<dyn BookingApi>,
        queue: OfflineQueue,
        connectivity: Connectivity,
        sync_trigger: Arc<Notify>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            queue,
            connectivity,
            sync_trigger,
            clock,
            lookup_policy: RetryPolicy::default_network(),
        }
    }

    pub fn with_lookup_policy(mut self, policy: RetryPolicy) -> Self {
        self.lookup_policy = policy;
        self
    }

    fn must_queue(&self) -> Result<bool, ClientError> {
        Ok(!self.connectivity.is_online() || !self.queue.is_empty()?)
    }

    fn enqueue(&self, action: BookingAction) -> Result<Uuid, ClientError> {
        let entry = self.queue.enqueue(&action, self.clock.now())?;
        tracing::info!(entry_id = %entry.id, action = action.tag(), "Ação guardada para sincronizar depois");
        if self.connectivity.is_online() {
            self.sync_trigger.notify_one();
        }
        Ok(entry.id)
    }

    pub async fn create_booking(
        &self,
        slot_id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<Submission<CreateBookingResponse>, ClientError> {
        let action_id = Uuid::new_v4();
        let action = BookingAction::Create { action_id, slot_id, metadata: metadata.clone() };

        if self.must_queue()? {
            return Ok(Submission::PendingSync { entry_id: self.enqueue(action)? });
        }

        match self.api.create(action_id, slot_id, metadata).await {
            Ok(response) => Ok(Submission::Applied(response)),
            // Resultado desconhecido: a escrita pode ter acontecido e só a resposta se perdeu
            Err(RemoteError::Timeout) => match self.resolve_unknown_create(action_id).await {
                Some(booking) => Ok(Submission::Applied(response_from(booking))),
                None => Ok(Submission::PendingSync { entry_id: self.enqueue(action)? }),
            },
            Err(err) if err.is_retryable() => {
                tracing::warn!(error = %err, "Falha de rede ao agendar");
                Ok(Submission::PendingSync { entry_id: self.enqueue(action)? })
            }
            Err(err) => Err(surface(err)),
        }
    }

    async fn resolve_unknown_create(&self, action_id: Uuid) -> Option<Booking> {
        let api = self.api.clone();
        let lookup = self
            .lookup_policy
            .retry_async(|_| {
                let api = api.clone();
                async move { api.find_by_action(action_id).await }
            })
            .await;
        match lookup {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(%action_id, error = %err, "Não foi possível consultar o resultado do agendamento");
                None
            }
        }
    }

    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        reason: Option<String>,
    ) -> Result<Submission<Booking>, ClientError> {
        let action = BookingAction::Cancel {
            action_id: Uuid::new_v4(),
            booking_id,
            reason: reason.clone(),
        };

        if self.must_queue()? {
            return Ok(Submission::PendingSync { entry_id: self.enqueue(action)? });
        }

        match self.api.cancel(booking_id, reason).await {
            Ok(booking) => Ok(Submission::Applied(booking)),
            Err(err) if err.is_retryable() => {
                tracing::warn!(%booking_id, error = %err, "Falha de rede ao cancelar");
                Ok(Submission::PendingSync { entry_id: self.enqueue(action)? })
            }
            Err(err) => Err(surface(err)),
        }
    }

    /// Desiste de uma ação que ainda não saiu do aparelho.
    pub fn discard_pending(&self, entry_id: Uuid) -> Result<bool, ClientError> {
        Ok(self.queue.discard_queued(entry_id)?)
    }

    pub fn pending_actions(&self) -> Result<Vec<QueueEntry>, ClientError> {
        Ok(self.queue.pending()?)
    }
}

fn response_from(booking: Booking) -> CreateBookingResponse {
    let disposition = if booking.status == BookingStatus::Pending {
        Disposition::Waitlisted
    } else {
        Disposition::Confirmed
    };
    CreateBookingResponse { disposition, booking }
}

fn surface(err: RemoteError) -> ClientError {
    match err {
        RemoteError::Rejected { code, message } => ClientError::Rejected { code, message },
        other => ClientError::Remote(other),
    }
}
