// src/db/store.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        booking::{BookedShift, Booking, BookingStatus, NewBooking, StatusChange},
        policy::ReleasePolicyRecord,
        slot::{NewRegion, NewShift, NewSlot, Region, Shift, ShiftWindow, SlotChanges, SlotRecord},
    },
};

/// Condição avaliada atomicamente junto com a escrita do agendamento.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionGuard {
    /// Só escreve se `ativos < capacidade` (contados na hora, não o contador).
    pub enforce_capacity: bool,
    pub date: NaiveDate,
    pub window: ShiftWindow,
}

#[derive(Debug, Clone)]
pub enum AdmissionWrite {
    Admitted(Booking),
    SlotFull,
    /// O entregador já tem agendamento vivo nesta agenda, ou o `client_action_id` já existe.
    Duplicate(Booking),
    Conflict(BookedShift),
    /// A agenda foi desativada (ou sumiu) entre a leitura e a escrita.
    SlotUnavailable,
}

#[derive(Debug, Clone)]
pub enum ActivationWrite {
    Activated(Booking),
    SlotFull,
    Conflict(BookedShift),
    NotPending(Booking),
    Missing,
}

#[derive(Debug, Clone)]
pub enum TransitionWrite {
    Applied { previous: BookingStatus, booking: Booking },
    Rejected(Booking),
    Missing,
}

#[derive(Debug, Clone)]
pub enum SlotUpdate {
    Updated(SlotRecord),
    BelowOccupancy { occupancy: i64 },
    Missing,
}

/// Acesso ao armazenamento relacional. Toda escrita de agendamento é uma escrita
/// condicional: a checagem e o insert/update acontecem de forma indivisível.
#[async_trait]
pub trait BookingStore: Send + Sync {
    // --- Leituras ---
    async fn get_slot(&self, tenant_id: Uuid, slot_id: Uuid) -> Result<Option<SlotRecord>, AppError>;

    /// Agendas ativas da empresa com data >= `from`.
    async fn list_open_slots(&self, tenant_id: Uuid, from: NaiveDate) -> Result<Vec<SlotRecord>, AppError>;

    /// Contagem real de agendamentos ACTIVE por agenda.
    async fn count_active(&self, tenant_id: Uuid, slot_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>, AppError>;

    /// Agendamentos vivos do entregador em agendas com data >= `from`.
    async fn list_driver_shifts(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
        from: NaiveDate,
    ) -> Result<Vec<BookedShift>, AppError>;

    async fn get_booking(&self, tenant_id: Uuid, booking_id: Uuid) -> Result<Option<Booking>, AppError>;

    async fn find_booking_by_action(
        &self,
        tenant_id: Uuid,
        action_id: Uuid,
    ) -> Result<Option<Booking>, AppError>;

    /// Lista de espera (PENDING) da agenda em ordem de chegada.
    async fn list_waitlist(&self, tenant_id: Uuid, slot_id: Uuid) -> Result<Vec<Booking>, AppError>;

    async fn get_release_policy(&self, tenant_id: Uuid) -> Result<Option<ReleasePolicyRecord>, AppError>;

    // --- Escritas condicionais ---
    async fn insert_booking(&self, new: NewBooking, guard: AdmissionGuard) -> Result<AdmissionWrite, AppError>;

    /// PENDING → ACTIVE sob a mesma guarda de capacidade e conflito.
    async fn activate_booking(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        guard: AdmissionGuard,
    ) -> Result<ActivationWrite, AppError>;

    /// Aplica a mudança só se o estado atual permitir; recalcula a ocupação quando um
    /// agendamento ACTIVE sai desse estado.
    async fn transition_booking(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        change: StatusChange,
    ) -> Result<TransitionWrite, AppError>;

    // --- Administração ---
    async fn insert_shift(&self, new: NewShift) -> Result<Shift, AppError>;
    async fn insert_region(&self, new: NewRegion) -> Result<Region, AppError>;
    async fn insert_slot(&self, new: NewSlot) -> Result<SlotRecord, AppError>;
    async fn update_slot(&self, tenant_id: Uuid, slot_id: Uuid, changes: SlotChanges) -> Result<SlotUpdate, AppError>;
}
