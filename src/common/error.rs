// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::middleware::i18n::Locale;
use crate::models::booking::BookingStatus;

/// Códigos estáveis do protocolo. O mesmo enum é serializado pelo servidor e lido pelo
/// cliente offline; um código desconhecido é erro de decodificação, nunca um palpite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotYetReleased,
    SameDayDisabled,
    ShiftEnded,
    TimeConflict,
    SlotFull,
    DuplicateBooking,
    AlreadyTerminal,
    StructuralInvalid,
    NetworkUnavailable,
    SyncRetryExhausted,
    SlotNotFound,
    BookingNotFound,
    InvalidTransition,
    CapacityBelowOccupancy,
    ValidationFailed,
    InvalidToken,
    TenantMismatch,
    Forbidden,
    Internal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Agenda ainda não liberada para o seu nível (libera às {release_at})")]
    NotYetReleased { release_at: NaiveTime },

    #[error("Agendamento no mesmo dia desativado pela empresa")]
    SameDayDisabled,

    #[error("O turno já começou ou terminou")]
    ShiftEnded,

    #[error("Conflito de horário com o agendamento {booking_id} ({shift_name} {start}-{end})")]
    TimeConflict {
        booking_id: Uuid,
        shift_name: String,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("Agenda lotada")]
    SlotFull,

    #[error("Entregador já possui o agendamento {booking_id} nesta agenda")]
    DuplicateBooking { booking_id: Uuid },

    #[error("Agendamento já está em estado final ({status:?})")]
    AlreadyTerminal { status: BookingStatus },

    #[error("Dados estruturalmente inválidos: {0}")]
    StructuralInvalid(String),

    #[error("Agenda {0} não encontrada")]
    SlotNotFound(Uuid),

    #[error("Agendamento {0} não encontrado")]
    BookingNotFound(Uuid),

    #[error("Transição inválida de {from:?} para {to:?}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("Capacidade {requested} abaixo da ocupação atual {occupancy}")]
    CapacityBelowOccupancy { requested: i32, occupancy: i64 },

    #[error("Token inválido")]
    InvalidToken,

    #[error("Empresa do cabeçalho difere da empresa do token")]
    TenantMismatch,

    #[error("Acesso negado")]
    Forbidden,

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::ValidationError(_) => ErrorCode::ValidationFailed,
            AppError::NotYetReleased { .. } => ErrorCode::NotYetReleased,
            AppError::SameDayDisabled => ErrorCode::SameDayDisabled,
            AppError::ShiftEnded => ErrorCode::ShiftEnded,
            AppError::TimeConflict { .. } => ErrorCode::TimeConflict,
            AppError::SlotFull => ErrorCode::SlotFull,
            AppError::DuplicateBooking { .. } => ErrorCode::DuplicateBooking,
            AppError::AlreadyTerminal { .. } => ErrorCode::AlreadyTerminal,
            AppError::StructuralInvalid(_) => ErrorCode::StructuralInvalid,
            AppError::SlotNotFound(_) => ErrorCode::SlotNotFound,
            AppError::BookingNotFound(_) => ErrorCode::BookingNotFound,
            AppError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            AppError::CapacityBelowOccupancy { .. } => ErrorCode::CapacityBelowOccupancy,
            AppError::InvalidToken | AppError::JwtError(_) => ErrorCode::InvalidToken,
            AppError::TenantMismatch => ErrorCode::TenantMismatch,
            AppError::Forbidden => ErrorCode::Forbidden,
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => ErrorCode::Internal,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::StructuralInvalid(_) => StatusCode::BAD_REQUEST,
            AppError::NotYetReleased { .. }
            | AppError::SameDayDisabled
            | AppError::ShiftEnded => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::TimeConflict { .. }
            | AppError::SlotFull
            | AppError::DuplicateBooking { .. }
            | AppError::AlreadyTerminal { .. }
            | AppError::InvalidTransition { .. }
            | AppError::CapacityBelowOccupancy { .. } => StatusCode::CONFLICT,
            AppError::SlotNotFound(_) | AppError::BookingNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidToken | AppError::JwtError(_) => StatusCode::UNAUTHORIZED,
            AppError::TenantMismatch | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Mensagem legível no idioma do cliente. Português é o padrão; inglês quando pedido.
    fn localized_message(&self, locale: &Locale) -> String {
        let en = locale.0 == "en";
        match self {
            AppError::ValidationError(_) if en => "One or more fields are invalid.".into(),
            AppError::ValidationError(_) => "Um ou mais campos são inválidos.".into(),
            AppError::NotYetReleased { release_at } if en => {
                format!("This slot opens for your tier at {}.", release_at.format("%H:%M"))
            }
            AppError::NotYetReleased { release_at } => {
                format!("Esta agenda libera para o seu nível às {}.", release_at.format("%H:%M"))
            }
            AppError::SameDayDisabled if en => "Same-day booking is disabled.".into(),
            AppError::SameDayDisabled => "Agendamento no mesmo dia está desativado.".into(),
            AppError::ShiftEnded if en => "This shift has already started or ended.".into(),
            AppError::ShiftEnded => "Este turno já começou ou terminou.".into(),
            AppError::TimeConflict { shift_name, start, end, .. } if en => format!(
                "You already have the shift {} ({}-{}) at an overlapping time.",
                shift_name,
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
            AppError::TimeConflict { shift_name, start, end, .. } => format!(
                "Você já tem o turno {} ({}-{}) em horário conflitante.",
                shift_name,
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
            AppError::SlotFull if en => "This slot is full.".into(),
            AppError::SlotFull => "Esta agenda está lotada.".into(),
            AppError::DuplicateBooking { .. } if en => "You already booked this slot.".into(),
            AppError::DuplicateBooking { .. } => "Você já está agendado nesta agenda.".into(),
            AppError::AlreadyTerminal { .. } if en => "This booking can no longer change.".into(),
            AppError::AlreadyTerminal { .. } => "Este agendamento não pode mais ser alterado.".into(),
            AppError::SlotNotFound(_) if en => "Slot not found.".into(),
            AppError::SlotNotFound(_) => "Agenda não encontrada.".into(),
            AppError::BookingNotFound(_) if en => "Booking not found.".into(),
            AppError::BookingNotFound(_) => "Agendamento não encontrado.".into(),
            AppError::InvalidToken | AppError::JwtError(_) if en => {
                "Missing or invalid authentication token.".into()
            }
            AppError::InvalidToken | AppError::JwtError(_) => {
                "Token de autenticação inválido ou ausente.".into()
            }
            AppError::Forbidden if en => "You are not allowed to perform this action.".into(),
            AppError::Forbidden => "Você não tem permissão para esta ação.".into(),
            AppError::DatabaseError(_) | AppError::InternalServerError(_) if en => {
                "An unexpected error occurred.".into()
            }
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                "Ocorreu um erro inesperado.".into()
            }
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                Some(json!(details))
            }
            AppError::TimeConflict { booking_id, shift_name, start, end } => Some(json!({
                "bookingId": booking_id,
                "shiftName": shift_name,
                "start": start,
                "end": end,
            })),
            AppError::DuplicateBooking { booking_id } => Some(json!({ "bookingId": booking_id })),
            AppError::AlreadyTerminal { status } => Some(json!({ "status": status })),
            AppError::NotYetReleased { release_at } => Some(json!({ "releaseAt": release_at })),
            AppError::CapacityBelowOccupancy { requested, occupancy } => Some(json!({
                "requested": requested,
                "occupancy": occupancy,
            })),
            _ => None,
        }
    }

    pub fn to_api_error(&self, locale: &Locale) -> ApiError {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Erro Interno do Servidor: {}", self);
        }
        ApiError {
            status,
            code: self.code(),
            error: self.localized_message(locale),
            details: self.details(),
        }
    }
}

/// Corpo JSON de erro. Também é lido pelo cliente remoto.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorBody {
    pub code: ErrorCode,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub error: String,
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            code: self.code,
            error: self.error,
            details: self.details,
        });
        (self.status, body).into_response()
    }
}

// Para os extratores que rejeitam antes de conhecermos o idioma.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error(&Locale::default()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_conflict_names_the_clashing_shift() {
        let err = AppError::TimeConflict {
            booking_id: Uuid::nil(),
            shift_name: "Manhã".into(),
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        };
        let api = err.to_api_error(&Locale("pt".into()));
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.code, ErrorCode::TimeConflict);
        assert!(api.error.contains("Manhã (09:00-13:00)"));
        assert_eq!(api.details.unwrap()["bookingId"], json!(Uuid::nil()));
    }

    #[test]
    fn error_codes_use_screaming_snake_case_on_the_wire() {
        let raw = serde_json::to_string(&ErrorCode::SyncRetryExhausted).unwrap();
        assert_eq!(raw, "\"SYNC_RETRY_EXHAUSTED\"");
        assert!(serde_json::from_str::<ErrorCode>("\"CONFIRMADA\"").is_err());
    }

    #[test]
    fn english_locale_switches_messages() {
        let api = AppError::SlotFull.to_api_error(&Locale("en".into()));
        assert_eq!(api.error, "This slot is full.");
    }
}
