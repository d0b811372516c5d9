// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::common;
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Entregador ---
        handlers::slots::list_available,
        handlers::bookings::create_booking,
        handlers::bookings::get_booking,
        handlers::bookings::find_by_action,
        handlers::bookings::cancel_booking,

        // --- Administração ---
        handlers::slots::create_shift,
        handlers::slots::create_region,
        handlers::slots::create_slot,
        handlers::slots::update_slot,
        handlers::bookings::create_on_behalf,
        handlers::bookings::confirm_booking,
        handlers::bookings::close_booking,
    ),
    components(
        schemas(
            // --- Agendas ---
            models::slot::Shift,
            models::slot::Region,
            models::slot::ShiftWindow,
            models::slot::Slot,
            models::slot::BlockReason,
            models::slot::AnnotatedSlot,

            // --- Agendamentos ---
            models::booking::BookingStatus,
            models::booking::BookingKind,
            models::booking::Booking,
            models::booking::Disposition,
            models::booking::CreateBookingResponse,

            // --- Erros ---
            common::error::ErrorCode,
            common::error::ApiErrorBody,

            // --- Payloads ---
            handlers::slots::CreateShiftPayload,
            handlers::slots::CreateRegionPayload,
            handlers::slots::CreateSlotPayload,
            handlers::slots::UpdateSlotPayload,
            handlers::bookings::CreateBookingPayload,
            handlers::bookings::OnBehalfPayload,
            handlers::bookings::CancelBookingPayload,
            handlers::bookings::CloseBookingPayload,
            handlers::bookings::BookingLookup,
        )
    ),
    tags(
        (name = "Slots", description = "Agendas disponíveis para o entregador"),
        (name = "Bookings", description = "Agendamentos do entregador"),
        (name = "Admin", description = "Cadastro de turnos, regiões e agendas; lançamentos especiais")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
