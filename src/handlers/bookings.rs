// src/handlers/bookings.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::error::{ApiError, AppError, ApiErrorBody},
    config::AppState,
    middleware::i18n::Locale,
    models::{
        auth::Identity,
        booking::{Booking, BookingStatus, CreateBookingResponse, Disposition},
    },
    services::booking_service::CreateBooking,
};

fn validate_metadata(value: &serde_json::Value) -> Result<(), ValidationError> {
    if !value.is_object() {
        let mut err = ValidationError::new("metadata");
        err.message = Some("Os metadados devem ser um objeto JSON.".into());
        return Err(err);
    }
    Ok(())
}

fn validate_close_outcome(outcome: &BookingStatus) -> Result<(), ValidationError> {
    if !matches!(outcome, BookingStatus::Completed | BookingStatus::NoShow) {
        let mut err = ValidationError::new("outcome");
        err.message = Some("Use COMPLETED ou NO_SHOW.".into());
        return Err(err);
    }
    Ok(())
}

// ---
// Payloads
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingPayload {
    pub slot_id: Uuid,
    /// ID lógico da ação gerado no aparelho; reenvios com o mesmo ID não duplicam.
    pub action_id: Option<Uuid>,
    #[validate(custom(function = "validate_metadata"))]
    #[serde(default = "empty_object")]
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OnBehalfPayload {
    pub driver_id: Uuid,
    pub slot_id: Uuid,
    pub action_id: Option<Uuid>,
    #[validate(custom(function = "validate_metadata"))]
    #[serde(default = "empty_object")]
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelBookingPayload {
    #[validate(length(max = 500, message = "Motivo muito longo."))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloseBookingPayload {
    #[validate(custom(function = "validate_close_outcome"))]
    pub outcome: BookingStatus,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingLookup {
    pub booking: Option<Booking>,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

fn creation_status(disposition: Disposition) -> StatusCode {
    match disposition {
        Disposition::Confirmed => StatusCode::CREATED,
        Disposition::Waitlisted => StatusCode::ACCEPTED,
        Disposition::AlreadyApplied => StatusCode::OK,
    }
}

// POST /api/bookings
#[utoipa::path(
    post,
    path = "/api/bookings",
    tag = "Bookings",
    request_body = CreateBookingPayload,
    responses(
        (status = 201, description = "Agendamento confirmado", body = CreateBookingResponse),
        (status = 202, description = "Agenda lotada; entrou na lista de espera", body = CreateBookingResponse),
        (status = 200, description = "Ação já aplicada anteriormente", body = CreateBookingResponse),
        (status = 409, description = "TIME_CONFLICT, SLOT_FULL ou DUPLICATE_BOOKING", body = ApiErrorBody),
        (status = 422, description = "NOT_YET_RELEASED, SAME_DAY_DISABLED ou SHIFT_ENDED", body = ApiErrorBody)
    ),
    params(
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_booking(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
    Json(payload): Json<CreateBookingPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let request = CreateBooking {
        slot_id: payload.slot_id,
        action_id: payload.action_id,
        metadata: payload.metadata,
    };
    let response = app_state
        .booking_service
        .create(&identity, request)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((creation_status(response.disposition), Json(response)))
}

// POST /api/bookings/on-behalf
#[utoipa::path(
    post,
    path = "/api/bookings/on-behalf",
    tag = "Admin",
    request_body = OnBehalfPayload,
    responses(
        (status = 201, description = "Agendamento especial confirmado", body = CreateBookingResponse),
        (status = 202, description = "Agenda lotada; entrou na lista de espera", body = CreateBookingResponse),
        (status = 403, description = "Somente administradores", body = ApiErrorBody)
    ),
    params(
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_on_behalf(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
    Json(payload): Json<OnBehalfPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let request = CreateBooking {
        slot_id: payload.slot_id,
        action_id: payload.action_id,
        metadata: payload.metadata,
    };
    let response = app_state
        .booking_service
        .create_on_behalf(&identity, payload.driver_id, request)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((creation_status(response.disposition), Json(response)))
}

// GET /api/bookings/{id}
#[utoipa::path(
    get,
    path = "/api/bookings/{id}",
    tag = "Bookings",
    responses(
        (status = 200, description = "Agendamento", body = Booking),
        (status = 404, description = "Agendamento não encontrado", body = ApiErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Agendamento"),
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_booking(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = app_state
        .booking_service
        .get_booking(&identity, booking_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(booking)))
}

// GET /api/bookings/by-action/{action_id}
#[utoipa::path(
    get,
    path = "/api/bookings/by-action/{action_id}",
    tag = "Bookings",
    responses(
        (status = 200, description = "Resultado da ação (booking = null se nunca foi aplicada)", body = BookingLookup)
    ),
    params(
        ("action_id" = Uuid, Path, description = "ID lógico da ação no cliente"),
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn find_by_action(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
    Path(action_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = app_state
        .booking_service
        .find_by_action(&identity, action_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(BookingLookup { booking })))
}

// POST /api/bookings/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/cancel",
    tag = "Bookings",
    request_body = CancelBookingPayload,
    responses(
        (status = 200, description = "Agendamento cancelado", body = Booking),
        (status = 403, description = "Agendamento de outro entregador", body = ApiErrorBody),
        (status = 409, description = "ALREADY_TERMINAL", body = ApiErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Agendamento"),
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn cancel_booking(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
    Path(booking_id): Path<Uuid>,
    payload: Option<Json<CancelBookingPayload>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let booking = app_state
        .booking_service
        .cancel(&identity, booking_id, payload.reason)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(booking)))
}

// POST /api/bookings/{id}/confirm
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/confirm",
    tag = "Admin",
    responses(
        (status = 200, description = "Reserva confirmada", body = Booking),
        (status = 409, description = "SLOT_FULL, TIME_CONFLICT ou transição inválida", body = ApiErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Agendamento"),
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn confirm_booking(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = app_state
        .booking_service
        .confirm(&identity, booking_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(booking)))
}

// POST /api/bookings/{id}/close
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/close",
    tag = "Admin",
    request_body = CloseBookingPayload,
    responses(
        (status = 200, description = "Agendamento encerrado", body = Booking),
        (status = 409, description = "Transição inválida", body = ApiErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Agendamento"),
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn close_booking(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<CloseBookingPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let booking = app_state
        .booking_service
        .close(&identity, booking_id, payload.outcome)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(booking)))
}
