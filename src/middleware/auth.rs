// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        i18n::Locale,
        tenancy::{resolve_tenant, tenant_header},
    },
    models::{
        auth::{Claims, Identity},
        policy::DriverTier,
    },
};

/// Valida o token emitido pelo provedor de identidade.
pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

// 1. Autenticação: só confere o JWT e guarda os claims na requisição
pub async fn auth_guard(
    State(app_state): State<AppState>,
    locale: Locale,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return Err(AppError::InvalidToken.to_api_error(&locale));
    };

    let claims = decode_claims(bearer.token(), &app_state.settings.jwt_secret)
        .map_err(|_| AppError::InvalidToken.to_api_error(&locale))?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

// 2. Empresa: resolve o tenant (cabeçalho × token × padrão) e monta a identidade.
// Precisa rodar depois do `auth_guard`.
pub async fn tenant_guard(
    State(app_state): State<AppState>,
    locale: Locale,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or(AppError::InvalidToken)
        .map_err(|e| e.to_api_error(&locale))?;

    let header = tenant_header(request.headers()).map_err(|e| e.to_api_error(&locale))?;
    let tenant_id = resolve_tenant(header, claims.tenant_id, app_state.settings.default_tenant_id)
        .map_err(|e| e.to_api_error(&locale))?;

    let tier = DriverTier::try_from(claims.tier).map_err(|reason| {
        tracing::warn!(user_id = %claims.sub, %reason, "Token com nível inválido");
        AppError::InvalidToken.to_api_error(&locale)
    })?;

    let identity = Identity {
        user_id: claims.sub,
        tenant_id,
        tier,
        role: claims.role,
    };
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

// Extrator para obter a identidade diretamente nos handlers
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .copied()
            .ok_or(AppError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::Role;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn token(secret: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            tenant_id: Some(Uuid::new_v4()),
            tier: 4,
            role: Role::Driver,
            exp: (now + exp_offset) as usize,
            iat: now as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn accepts_tokens_signed_with_the_shared_secret() {
        let claims = decode_claims(&token("segredo", 3600), "segredo").unwrap();
        assert_eq!(claims.tier, 4);
        assert_eq!(claims.role, Role::Driver);
    }

    #[test]
    fn rejects_foreign_or_expired_tokens() {
        assert!(decode_claims(&token("outro", 3600), "segredo").is_err());
        assert!(decode_claims(&token("segredo", -3600), "segredo").is_err());
    }
}
