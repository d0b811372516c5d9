// src/models/booking.rs

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::slot::ShiftWindow;

// --- Enums ---
/// Estado do agendamento. `ACTIVE` é o único nome do estado ativo em todo o sistema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "booking_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Active,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Completed | BookingStatus::NoShow
        )
    }

    /// Ocupa a janela de horário do entregador (entra na checagem de conflito).
    pub fn is_live(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Active)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Cancelled)
                | (Active, Cancelled)
                | (Active, Completed)
                | (Active, NoShow)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "booking_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingKind {
    Standard,
    /// Reserva: criada PENDING quando a agenda está lotada mas aceita lista de espera.
    Waitlist,
    /// Lançado pelo administrador em nome do entregador.
    Special,
}

// --- Agendamento ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub slot_id: Uuid,
    pub driver_id: Uuid,
    pub status: BookingStatus,
    pub kind: BookingKind,
    /// ID lógico da ação no cliente; garante idempotência do replay.
    pub client_action_id: Option<Uuid>,
    #[schema(value_type = Object, example = json!({"cliente": "Loja Centro", "pedidos": 14}))]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancel_reason: Option<String>,
}

/// Agendamento vivo de um entregador junto com a janela do turno da agenda.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BookedShift {
    pub booking_id: Uuid,
    pub slot_id: Uuid,
    pub slot_date: NaiveDate,
    pub shift_name: String,
    pub shift_start: NaiveTime,
    pub shift_end: NaiveTime,
    pub status: BookingStatus,
}

impl BookedShift {
    pub fn window(&self) -> ShiftWindow {
        ShiftWindow {
            start: self.shift_start,
            end: self.shift_end,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub slot_id: Uuid,
    pub driver_id: Uuid,
    pub status: BookingStatus,
    pub kind: BookingKind,
    pub client_action_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

/// Mudança de estado pedida à store.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub to: BookingStatus,
    pub actor_id: Uuid,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

// --- Resposta de criação ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    Confirmed,
    Waitlisted,
    /// O mesmo `actionId` já tinha sido aplicado; nada foi escrito.
    AlreadyApplied,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingResponse {
    pub disposition: Disposition,
    pub booking: Booking,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_never_transition() {
        use BookingStatus::*;
        for terminal in [Cancelled, Completed, NoShow] {
            assert!(terminal.is_terminal());
            for next in [Pending, Active, Cancelled, Completed, NoShow] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(Pending.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn unknown_status_literal_is_rejected() {
        assert!(serde_json::from_str::<BookingStatus>("\"AGENDADO\"").is_err());
        assert_eq!(
            serde_json::from_str::<BookingStatus>("\"NO_SHOW\"").unwrap(),
            BookingStatus::NoShow
        );
    }
}
