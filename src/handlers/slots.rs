// src/handlers/slots.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError, ApiErrorBody},
    config::AppState,
    middleware::i18n::Locale,
    models::{
        auth::Identity,
        slot::{AnnotatedSlot, Region, Shift, Slot, SlotChanges},
    },
};

// ---
// Payloads
// ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateShiftPayload {
    #[validate(length(min = 1, max = 80, message = "O nome é obrigatório."))]
    #[schema(example = "Manhã")]
    pub name: String,
    #[schema(value_type = String, example = "08:00")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, example = "12:00")]
    pub end_time: NaiveTime,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRegionPayload {
    #[validate(length(min = 1, max = 80, message = "O nome é obrigatório."))]
    #[schema(example = "Zona Sul")]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSlotPayload {
    #[schema(value_type = String, example = "2025-03-01")]
    pub date: NaiveDate,
    pub shift_id: Uuid,
    pub region_id: Uuid,
    #[validate(range(min = 0, message = "A capacidade não pode ser negativa."))]
    #[schema(example = 12)]
    pub capacity: i32,
    #[serde(default)]
    pub allow_reservation: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSlotPayload {
    #[validate(range(min = 0, message = "A capacidade não pode ser negativa."))]
    pub capacity: Option<i32>,
    pub active: Option<bool>,
    pub allow_reservation: Option<bool>,
}

// GET /api/slots/available
#[utoipa::path(
    get,
    path = "/api/slots/available",
    tag = "Slots",
    responses(
        (status = 200, description = "Agendas de hoje em diante, anotadas para o entregador", body = Vec<AnnotatedSlot>),
        (status = 401, description = "Token ausente ou inválido", body = ApiErrorBody)
    ),
    params(
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_available(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    let slots = app_state
        .availability_service
        .list_available(&identity)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(slots)))
}

// POST /api/shifts
#[utoipa::path(
    post,
    path = "/api/shifts",
    tag = "Admin",
    request_body = CreateShiftPayload,
    responses(
        (status = 201, description = "Turno criado", body = Shift),
        (status = 400, description = "Turno inválido", body = ApiErrorBody),
        (status = 403, description = "Somente administradores", body = ApiErrorBody)
    ),
    params(
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_shift(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
    Json(payload): Json<CreateShiftPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let shift = app_state
        .slot_admin_service
        .create_shift(&identity, payload.name.trim(), payload.start_time, payload.end_time)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(shift)))
}

// POST /api/regions
#[utoipa::path(
    post,
    path = "/api/regions",
    tag = "Admin",
    request_body = CreateRegionPayload,
    responses(
        (status = 201, description = "Região criada", body = Region),
        (status = 403, description = "Somente administradores", body = ApiErrorBody)
    ),
    params(
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_region(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
    Json(payload): Json<CreateRegionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let region = app_state
        .slot_admin_service
        .create_region(&identity, payload.name.trim())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(region)))
}

// POST /api/slots
#[utoipa::path(
    post,
    path = "/api/slots",
    tag = "Admin",
    request_body = CreateSlotPayload,
    responses(
        (status = 201, description = "Agenda publicada", body = Slot),
        (status = 400, description = "Turno ou região inexistente", body = ApiErrorBody),
        (status = 403, description = "Somente administradores", body = ApiErrorBody)
    ),
    params(
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_slot(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
    Json(payload): Json<CreateSlotPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let slot = app_state
        .slot_admin_service
        .create_slot(
            &identity,
            payload.date,
            payload.shift_id,
            payload.region_id,
            payload.capacity,
            payload.allow_reservation,
        )
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(slot)))
}

// PATCH /api/slots/{id}
#[utoipa::path(
    patch,
    path = "/api/slots/{id}",
    tag = "Admin",
    request_body = UpdateSlotPayload,
    responses(
        (status = 200, description = "Agenda atualizada", body = Slot),
        (status = 404, description = "Agenda não encontrada", body = ApiErrorBody),
        (status = 409, description = "Capacidade abaixo da ocupação atual", body = ApiErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "ID da Agenda"),
        ("x-tenant-id" = Option<Uuid>, Header, description = "ID da Empresa")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_slot(
    State(app_state): State<AppState>,
    locale: Locale,
    identity: Identity,
    Path(slot_id): Path<Uuid>,
    Json(payload): Json<UpdateSlotPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let changes = SlotChanges {
        capacity: payload.capacity,
        active: payload.active,
        allow_reservation: payload.allow_reservation,
    };
    let slot = app_state
        .slot_admin_service
        .update_slot(&identity, slot_id, changes)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(slot)))
}
