// src/services/booking_service.rs

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::{
    common::{clock::Clock, error::AppError},
    db::{ActivationWrite, AdmissionGuard, AdmissionWrite, BookingStore, TransitionWrite},
    models::{
        auth::Identity,
        booking::{
            Booking, BookingKind, BookingStatus, CreateBookingResponse, Disposition, NewBooking,
            StatusChange,
        },
        policy::DriverTier,
        slot::Slot,
    },
    services::{
        conflict::find_conflict,
        tier_policy::{EligibilityReason, PolicyResolver},
    },
};

/// Pedido de criação. `action_id` é o ID lógico da ação no cliente (idempotência).
#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub slot_id: Uuid,
    pub action_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

// Quem está pedindo e quais travas se aplicam
#[derive(Debug, Clone, Copy)]
struct Applicant {
    tenant_id: Uuid,
    driver_id: Uuid,
    tier: DriverTier,
    kind: BookingKind,
    bypass_tier_gate: bool,
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    policies: PolicyResolver,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, policies: PolicyResolver, clock: Arc<dyn Clock>) -> Self {
        Self { store, policies, clock }
    }

    // --- CRIAÇÃO ---

    pub async fn create(&self, identity: &Identity, request: CreateBooking) -> Result<CreateBookingResponse, AppError> {
        let applicant = Applicant {
            tenant_id: identity.tenant_id,
            driver_id: identity.user_id,
            tier: identity.tier,
            kind: BookingKind::Standard,
            bypass_tier_gate: false,
        };
        self.create_logged(applicant, request).await
    }

    /// Lançamento administrativo (tipo SPECIAL). Pula só a trava de nível; turno encerrado,
    /// mesmo dia desativado, conflito e capacidade continuam valendo.
    pub async fn create_on_behalf(
        &self,
        admin: &Identity,
        driver_id: Uuid,
        request: CreateBooking,
    ) -> Result<CreateBookingResponse, AppError> {
        require_admin(admin)?;
        let applicant = Applicant {
            tenant_id: admin.tenant_id,
            driver_id,
            tier: DriverTier::highest(),
            kind: BookingKind::Special,
            bypass_tier_gate: true,
        };
        self.create_logged(applicant, request).await
    }

    async fn create_logged(&self, applicant: Applicant, request: CreateBooking) -> Result<CreateBookingResponse, AppError> {
        let start = Instant::now();
        let slot_id = request.slot_id;
        let result = self.admit(applicant, request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => tracing::info!(
                tenant_id = %applicant.tenant_id,
                driver_id = %applicant.driver_id,
                %slot_id,
                booking_id = %response.booking.id,
                disposition = ?response.disposition,
                elapsed_ms,
                "📅 Agendamento criado"
            ),
            Err(e) => tracing::info!(
                tenant_id = %applicant.tenant_id,
                driver_id = %applicant.driver_id,
                %slot_id,
                code = ?e.code(),
                elapsed_ms,
                "Agendamento recusado"
            ),
        }
        result
    }

    async fn admit(&self, applicant: Applicant, request: CreateBooking) -> Result<CreateBookingResponse, AppError> {
        // 1. Ação já aplicada? (replay do cliente offline)
        if let Some(action_id) = request.action_id {
            if let Some(existing) = self.store.find_booking_by_action(applicant.tenant_id, action_id).await? {
                return already_applied(existing, applicant.driver_id);
            }
        }

        // 2. Agenda e elegibilidade, com leitura fresca
        let slot = self.load_slot(applicant.tenant_id, request.slot_id).await?;
        let policy = self.policies.resolve(applicant.tenant_id).await?;
        let eligibility = policy.evaluate(applicant.tier, slot.date, &slot.window, self.clock.now());
        let tier_gate_only = eligibility.reason == EligibilityReason::NotYetReleased;
        if !(applicant.bypass_tier_gate && tier_gate_only) {
            eligibility.into_result()?;
        }

        // 3. Duplicidade e conflito com os turnos do próprio entregador
        let shifts = self
            .store
            .list_driver_shifts(applicant.tenant_id, applicant.driver_id, slot.date)
            .await?;
        if let Some(same) = shifts.iter().find(|s| s.slot_id == slot.id) {
            return Err(AppError::DuplicateBooking { booking_id: same.booking_id });
        }
        if let Some(clash) = find_conflict(&shifts, slot.date, &slot.window, None) {
            return Err(clash.into());
        }

        // 4. Ocupação real, contada agora
        let occupancy = self
            .store
            .count_active(applicant.tenant_id, &[slot.id])
            .await?
            .get(&slot.id)
            .copied()
            .unwrap_or(0);
        let full = occupancy >= i64::from(slot.capacity);
        if full && !slot.allow_reservation {
            return Err(AppError::SlotFull);
        }

        // 5. Escrita condicional na store
        let write = self.insert(applicant, &request, &slot, !full).await?;
        let write = match write {
            // Perdeu a corrida pela última vaga: vira reserva se a agenda aceitar
            AdmissionWrite::SlotFull if slot.allow_reservation => self.insert(applicant, &request, &slot, false).await?,
            other => other,
        };

        match write {
            AdmissionWrite::Admitted(booking) => {
                let disposition = if booking.status == BookingStatus::Pending {
                    Disposition::Waitlisted
                } else {
                    Disposition::Confirmed
                };
                Ok(CreateBookingResponse { disposition, booking })
            }
            AdmissionWrite::SlotFull => Err(AppError::SlotFull),
            AdmissionWrite::Duplicate(existing) => {
                if request.action_id.is_some() && existing.client_action_id == request.action_id {
                    already_applied(existing, applicant.driver_id)
                } else {
                    Err(AppError::DuplicateBooking { booking_id: existing.id })
                }
            }
            AdmissionWrite::Conflict(clash) => Err((&clash).into()),
            AdmissionWrite::SlotUnavailable => Err(AppError::SlotNotFound(slot.id)),
        }
    }

    async fn insert(
        &self,
        applicant: Applicant,
        request: &CreateBooking,
        slot: &Slot,
        confirmed: bool,
    ) -> Result<AdmissionWrite, AppError> {
        let (status, kind) = if confirmed {
            (BookingStatus::Active, applicant.kind)
        } else {
            (BookingStatus::Pending, BookingKind::Waitlist)
        };
        let new = NewBooking {
            id: Uuid::new_v4(),
            tenant_id: applicant.tenant_id,
            slot_id: slot.id,
            driver_id: applicant.driver_id,
            status,
            kind,
            client_action_id: request.action_id,
            metadata: request.metadata.clone(),
        };
        let guard = AdmissionGuard {
            enforce_capacity: confirmed,
            date: slot.date,
            window: slot.window,
        };
        self.store.insert_booking(new, guard).await
    }

    // --- CANCELAMENTO ---

    /// Motorista cancela só os próprios agendamentos; administrador cancela qualquer um.
    /// Se o agendamento estava ACTIVE, a vaga liberada é oferecida à lista de espera.
    pub async fn cancel(&self, identity: &Identity, booking_id: Uuid, reason: Option<String>) -> Result<Booking, AppError> {
        let start = Instant::now();

        let booking = self.get_booking(identity, booking_id).await?;
        if booking.status.is_terminal() {
            return Err(AppError::AlreadyTerminal { status: booking.status });
        }

        let change = StatusChange {
            to: BookingStatus::Cancelled,
            actor_id: identity.user_id,
            reason,
            at: self.clock.now(),
        };
        let (previous, cancelled) = match self.store.transition_booking(identity.tenant_id, booking_id, change).await? {
            TransitionWrite::Applied { previous, booking } => (previous, booking),
            TransitionWrite::Rejected(current) => {
                return Err(AppError::AlreadyTerminal { status: current.status });
            }
            TransitionWrite::Missing => return Err(AppError::BookingNotFound(booking_id)),
        };

        tracing::info!(
            tenant_id = %identity.tenant_id,
            %booking_id,
            slot_id = %cancelled.slot_id,
            from = ?previous,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "❌ Agendamento cancelado"
        );

        if previous == BookingStatus::Active {
            // A falha na promoção não desfaz o cancelamento
            if let Err(e) = self.promote_waitlist(identity.tenant_id, cancelled.slot_id).await {
                tracing::error!(slot_id = %cancelled.slot_id, error = %e, "Falha ao promover lista de espera");
            }
        }

        Ok(cancelled)
    }

    // --- LISTA DE ESPERA ---

    /// Oferece as vagas livres aos PENDING mais antigos (FIFO). Quem agora conflita com
    /// outro turno do próprio entregador é pulado.
    pub async fn promote_waitlist(&self, tenant_id: Uuid, slot_id: Uuid) -> Result<Vec<Booking>, AppError> {
        let slot = self.load_slot(tenant_id, slot_id).await?;
        let policy = self.policies.resolve(tenant_id).await?;
        if policy.shift_ended(slot.date, &slot.window, self.clock.now()) {
            return Ok(Vec::new());
        }

        let guard = AdmissionGuard {
            enforce_capacity: true,
            date: slot.date,
            window: slot.window,
        };
        let mut promoted = Vec::new();
        for pending in self.store.list_waitlist(tenant_id, slot_id).await? {
            let start = Instant::now();
            match self.store.activate_booking(tenant_id, pending.id, guard).await? {
                ActivationWrite::Activated(booking) => {
                    tracing::info!(
                        %tenant_id,
                        booking_id = %booking.id,
                        %slot_id,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "⬆️ Reserva promovida da lista de espera"
                    );
                    promoted.push(booking);
                }
                ActivationWrite::SlotFull => break,
                ActivationWrite::Conflict(clash) => {
                    tracing::info!(booking_id = %pending.id, conflicting = %clash.booking_id, "Reserva pulada por conflito de horário");
                }
                ActivationWrite::NotPending(_) | ActivationWrite::Missing => {}
            }
        }
        Ok(promoted)
    }

    /// PENDING → ACTIVE pelo administrador, sob a mesma guarda de capacidade.
    pub async fn confirm(&self, admin: &Identity, booking_id: Uuid) -> Result<Booking, AppError> {
        require_admin(admin)?;
        let start = Instant::now();

        let booking = self.get_booking(admin, booking_id).await?;
        ensure_transition(booking.status, BookingStatus::Active)?;
        let slot = self.load_slot(admin.tenant_id, booking.slot_id).await?;
        let guard = AdmissionGuard {
            enforce_capacity: true,
            date: slot.date,
            window: slot.window,
        };

        let activated = match self.store.activate_booking(admin.tenant_id, booking_id, guard).await? {
            ActivationWrite::Activated(b) => b,
            ActivationWrite::SlotFull => return Err(AppError::SlotFull),
            ActivationWrite::Conflict(clash) => return Err((&clash).into()),
            ActivationWrite::NotPending(current) => {
                ensure_transition(current.status, BookingStatus::Active)?;
                return Err(AppError::InvalidTransition { from: current.status, to: BookingStatus::Active });
            }
            ActivationWrite::Missing => return Err(AppError::BookingNotFound(booking_id)),
        };

        tracing::info!(
            tenant_id = %admin.tenant_id,
            %booking_id,
            slot_id = %activated.slot_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "✅ Agendamento confirmado"
        );
        Ok(activated)
    }

    /// ACTIVE → COMPLETED | NO_SHOW. Chamado pela varredura externa de fim de turno.
    pub async fn close(&self, admin: &Identity, booking_id: Uuid, outcome: BookingStatus) -> Result<Booking, AppError> {
        require_admin(admin)?;
        if !matches!(outcome, BookingStatus::Completed | BookingStatus::NoShow) {
            return Err(AppError::InvalidTransition { from: BookingStatus::Active, to: outcome });
        }
        let start = Instant::now();

        let change = StatusChange {
            to: outcome,
            actor_id: admin.user_id,
            reason: None,
            at: self.clock.now(),
        };
        let closed = match self.store.transition_booking(admin.tenant_id, booking_id, change).await? {
            TransitionWrite::Applied { booking, .. } => booking,
            TransitionWrite::Rejected(current) => {
                ensure_transition(current.status, outcome)?;
                return Err(AppError::InvalidTransition { from: current.status, to: outcome });
            }
            TransitionWrite::Missing => return Err(AppError::BookingNotFound(booking_id)),
        };

        tracing::info!(
            tenant_id = %admin.tenant_id,
            %booking_id,
            outcome = ?outcome,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Agendamento encerrado"
        );
        Ok(closed)
    }

    // --- CONSULTAS ---

    pub async fn get_booking(&self, identity: &Identity, booking_id: Uuid) -> Result<Booking, AppError> {
        let booking = self
            .store
            .get_booking(identity.tenant_id, booking_id)
            .await?
            .ok_or(AppError::BookingNotFound(booking_id))?;
        ensure_visible(identity, &booking)?;
        Ok(booking)
    }

    /// Reconsulta pelo ID lógico da ação, usada pelo cliente quando um create estoura o timeout.
    pub async fn find_by_action(&self, identity: &Identity, action_id: Uuid) -> Result<Option<Booking>, AppError> {
        let booking = self.store.find_booking_by_action(identity.tenant_id, action_id).await?;
        match booking {
            Some(b) if ensure_visible(identity, &b).is_err() => Ok(None),
            other => Ok(other),
        }
    }

    async fn load_slot(&self, tenant_id: Uuid, slot_id: Uuid) -> Result<Slot, AppError> {
        let record = self
            .store
            .get_slot(tenant_id, slot_id)
            .await?
            .ok_or(AppError::SlotNotFound(slot_id))?;
        let slot = record.into_slot()?;
        if !slot.active {
            return Err(AppError::SlotNotFound(slot_id));
        }
        Ok(slot)
    }
}

pub(crate) fn require_admin(identity: &Identity) -> Result<(), AppError> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn ensure_visible(identity: &Identity, booking: &Booking) -> Result<(), AppError> {
    if identity.is_admin() || booking.driver_id == identity.user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn ensure_transition(from: BookingStatus, to: BookingStatus) -> Result<(), AppError> {
    if from.is_terminal() {
        return Err(AppError::AlreadyTerminal { status: from });
    }
    if !from.can_transition_to(to) {
        return Err(AppError::InvalidTransition { from, to });
    }
    Ok(())
}

fn already_applied(existing: Booking, driver_id: Uuid) -> Result<CreateBookingResponse, AppError> {
    // Mesmo ID de ação vindo de outro entregador não é replay
    if existing.driver_id != driver_id {
        return Err(AppError::Forbidden);
    }
    Ok(CreateBookingResponse {
        disposition: Disposition::AlreadyApplied,
        booking: existing,
    })
}
