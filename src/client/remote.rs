// src/client/remote.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::common::error::{ApiErrorBody, ErrorCode};
use crate::common::retry::Retryable;
use crate::middleware::tenancy::TENANT_ID_HEADER;
use crate::models::booking::{Booking, CreateBookingResponse};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("servidor inalcançável: {0}")]
    Unreachable(String),
    #[error("tempo de resposta esgotado")]
    Timeout,
    #[error("recusado pelo servidor ({code:?}): {message}")]
    Rejected { code: ErrorCode, message: String },
    #[error("erro do servidor ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("resposta ilegível: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            RemoteError::Rejected { code, .. } => Some(*code),
            RemoteError::Unreachable(_) | RemoteError::Timeout => Some(ErrorCode::NetworkUnavailable),
            _ => None,
        }
    }
}

impl Retryable for RemoteError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Unreachable(_) | RemoteError::Timeout | RemoteError::Server { .. }
        )
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Unreachable(err.to_string())
        }
    }
}

/// Contrato remoto das mutações de agendamento. O mesmo usado online e no replay.
#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn create(
        &self,
        action_id: Uuid,
        slot_id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<CreateBookingResponse, RemoteError>;

    async fn cancel(&self, booking_id: Uuid, reason: Option<String>) -> Result<Booking, RemoteError>;

    /// Consulta de resultado por ID lógico; `None` se a ação nunca chegou ao servidor.
    async fn find_by_action(&self, action_id: Uuid) -> Result<Option<Booking>, RemoteError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    slot_id: Uuid,
    action_id: Uuid,
    metadata: &'a serde_json::Value,
}

#[derive(Serialize)]
struct CancelBody<'a> {
    reason: Option<&'a str>,
}

#[derive(Deserialize)]
struct LookupBody {
    booking: Option<Booking>,
}

/// Cliente HTTP da API de agendamentos.
#[derive(Debug, Clone)]
pub struct HttpBookingApi {
    client: Client,
    base_url: String,
    token: String,
    tenant_id: Option<Uuid>,
}

impl HttpBookingApi {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        tenant_id: Option<Uuid>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Unreachable(format!("falha ao criar cliente HTTP: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            tenant_id,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/json");
        if let Some(tenant_id) = self.tenant_id {
            builder = builder.header(TENANT_ID_HEADER, tenant_id.to_string());
        }
        builder
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, RemoteError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            return serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()));
        }
        Err(error_from_response(status, response).await)
    }
}

async fn error_from_response(status: StatusCode, response: Response) -> RemoteError {
    let body = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => return RemoteError::from(err),
    };
    match serde_json::from_slice::<ApiErrorBody>(&body) {
        // 5xx com código de domínio ainda é falha do servidor (ex.: INTERNAL)
        Ok(parsed) if status.is_server_error() => RemoteError::Server {
            status: status.as_u16(),
            message: parsed.error,
        },
        Ok(parsed) => RemoteError::Rejected {
            code: parsed.code,
            message: parsed.error,
        },
        Err(_) if status.is_server_error() => RemoteError::Server {
            status: status.as_u16(),
            message: String::from_utf8_lossy(&body).into_owned(),
        },
        Err(err) => RemoteError::Decode(format!("status {status}: {err}")),
    }
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    async fn create(
        &self,
        action_id: Uuid,
        slot_id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<CreateBookingResponse, RemoteError> {
        let body = CreateBody { slot_id, action_id, metadata: &metadata };
        self.send(self.request(reqwest::Method::POST, "/api/bookings").json(&body)).await
    }

    async fn cancel(&self, booking_id: Uuid, reason: Option<String>) -> Result<Booking, RemoteError> {
        let body = CancelBody { reason: reason.as_deref() };
        self.send(
            self.request(reqwest::Method::POST, &format!("/api/bookings/{booking_id}/cancel"))
                .json(&body),
        )
        .await
    }

    async fn find_by_action(&self, action_id: Uuid) -> Result<Option<Booking>, RemoteError> {
        let lookup: LookupBody = self
            .send(self.request(reqwest::Method::GET, &format!("/api/bookings/by-action/{action_id}")))
            .await?;
        Ok(lookup.booking)
    }
}
