// src/middleware/tenancy.rs

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::common::error::AppError;

// O nome do nosso cabeçalho HTTP customizado
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

/// Lê o `X-Tenant-ID`, se houver.
pub fn tenant_header(headers: &HeaderMap) -> Result<Option<Uuid>, AppError> {
    let Some(value) = headers.get(TENANT_ID_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| AppError::StructuralInvalid("cabeçalho X-Tenant-ID com caracteres inválidos".into()))?;
    Uuid::parse_str(raw.trim())
        .map(Some)
        .map_err(|_| AppError::StructuralInvalid("cabeçalho X-Tenant-ID não é um UUID".into()))
}

/// Empresa da requisição: cabeçalho, depois o token, depois `DEFAULT_TENANT_ID`.
/// Cabeçalho e token discordando é `TENANT_MISMATCH`.
pub fn resolve_tenant(
    header: Option<Uuid>,
    claim: Option<Uuid>,
    default_tenant: Option<Uuid>,
) -> Result<Uuid, AppError> {
    match (header, claim) {
        (Some(h), Some(c)) if h != c => Err(AppError::TenantMismatch),
        (Some(h), _) => Ok(h),
        (None, Some(c)) => Ok(c),
        (None, None) => default_tenant.ok_or(AppError::InvalidToken),
    }
}
