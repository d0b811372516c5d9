// src/lib.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod client;
pub mod common;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use crate::config::AppState;
use crate::docs::ApiDoc;
use crate::middleware::auth::{auth_guard, tenant_guard};

/// Monta o router completo da API.
pub fn router(app_state: AppState) -> Router {
    // Entregador
    let driver_routes = Router::new()
        .route("/slots/available", get(handlers::slots::list_available))
        .route("/bookings", post(handlers::bookings::create_booking))
        .route("/bookings/by-action/{action_id}", get(handlers::bookings::find_by_action))
        .route("/bookings/{id}", get(handlers::bookings::get_booking))
        .route("/bookings/{id}/cancel", post(handlers::bookings::cancel_booking));

    // Administração (o serviço recusa quem não for ADMIN)
    let admin_routes = Router::new()
        .route("/shifts", post(handlers::slots::create_shift))
        .route("/regions", post(handlers::slots::create_region))
        .route("/slots", post(handlers::slots::create_slot))
        .route("/slots/{id}", patch(handlers::slots::update_slot))
        .route("/bookings/on-behalf", post(handlers::bookings::create_on_behalf))
        .route("/bookings/{id}/confirm", post(handlers::bookings::confirm_booking))
        .route("/bookings/{id}/close", post(handlers::bookings::close_booking));

    // `auth_guard` roda primeiro (camada mais externa), depois `tenant_guard`
    let protected = driver_routes
        .merge(admin_routes)
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), tenant_guard))
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), auth_guard));

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api", protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state)
}
