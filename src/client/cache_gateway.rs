// src/client/cache_gateway.rs

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header, Client, Method, Url};

use crate::client::local_store::{LocalStore, StoredResponse};
use crate::client::remote::RemoteError;
use crate::common::clock::Clock;
use crate::common::error::{ApiErrorBody, ErrorCode};

const STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "woff", "woff2", "ttf",
    "webmanifest",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Navegação de página (o usuário abriu uma tela).
    Navigate,
    Other,
}

#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
}

impl GatewayRequest {
    pub fn get(url: Url, mode: RequestMode) -> Self {
        Self { method: Method::GET, url, mode }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    OfflinePage,
    Unavailable,
    /// Não passou pelo cache (não-GET ou domínio de terceiros).
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &GatewayRequest) -> Result<FetchedResponse, RemoteError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &GatewayRequest) -> Result<FetchedResponse, RemoteError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        Ok(FetchedResponse { status, content_type, body })
    }
}

/// Intermediário de leitura do app do entregador.
///
/// Arquivos estáticos: cache primeiro. Leituras dinâmicas: rede primeiro, guardando as
/// respostas boas no anel local para usar offline.
pub struct CacheGateway {
    store: LocalStore,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    origin_host: String,
    offline_page: Vec<u8>,
}

impl CacheGateway {
    pub fn new(
        store: LocalStore,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        origin_host: impl Into<String>,
        offline_page: Vec<u8>,
    ) -> Self {
        Self {
            store,
            fetcher,
            clock,
            origin_host: origin_host.into(),
            offline_page,
        }
    }

    pub async fn handle(&self, request: &GatewayRequest) -> GatewayResponse {
        let same_origin = request.url.host_str() == Some(self.origin_host.as_str());
        if request.method != Method::GET || !same_origin {
            return self.passthrough(request).await;
        }
        if is_static_asset(&request.url) {
            self.cache_first(request).await
        } else {
            self.network_first(request).await
        }
    }

    async fn passthrough(&self, request: &GatewayRequest) -> GatewayResponse {
        match self.fetcher.fetch(request).await {
            Ok(fetched) => from_fetched(fetched, ResponseSource::Passthrough),
            Err(err) => {
                tracing::debug!(url = %request.url, error = %err, "Requisição direta falhou");
                network_unavailable()
            }
        }
    }

    async fn cache_first(&self, request: &GatewayRequest) -> GatewayResponse {
        let key = request.url.as_str();
        match self.store.get_asset(key) {
            Ok(Some(cached)) => return from_stored(cached, ResponseSource::Cache),
            Ok(None) => {}
            Err(err) => tracing::error!(url = key, error = %err, "Falha ao ler cache de arquivos"),
        }

        match self.fetcher.fetch(request).await {
            Ok(fetched) => {
                if is_success(fetched.status) {
                    if let Err(err) = self.store.put_asset(&self.to_stored(key, &fetched)) {
                        tracing::error!(url = key, error = %err, "Falha ao gravar cache de arquivos");
                    }
                }
                from_fetched(fetched, ResponseSource::Network)
            }
            Err(err) => {
                tracing::debug!(url = key, error = %err, "Arquivo estático indisponível offline");
                GatewayResponse {
                    status: 503,
                    content_type: Some("text/plain; charset=utf-8".into()),
                    body: b"Recurso indisponivel offline".to_vec(),
                    source: ResponseSource::Unavailable,
                }
            }
        }
    }

    async fn network_first(&self, request: &GatewayRequest) -> GatewayResponse {
        let key = request.url.as_str();
        match self.fetcher.fetch(request).await {
            Ok(fetched) => {
                if is_success(fetched.status) {
                    if let Err(err) = self.store.put_data(&self.to_stored(key, &fetched)) {
                        tracing::error!(url = key, error = %err, "Falha ao gravar cache de dados");
                    }
                }
                return from_fetched(fetched, ResponseSource::Network);
            }
            Err(err) => tracing::debug!(url = key, error = %err, "Rede indisponível; tentando cache"),
        }

        match self.store.get_data(key) {
            Ok(Some(cached)) => return from_stored(cached, ResponseSource::Cache),
            Ok(None) => {}
            Err(err) => tracing::error!(url = key, error = %err, "Falha ao ler cache de dados"),
        }

        if request.mode == RequestMode::Navigate {
            return GatewayResponse {
                status: 200,
                content_type: Some("text/html; charset=utf-8".into()),
                body: self.offline_page.clone(),
                source: ResponseSource::OfflinePage,
            };
        }
        network_unavailable()
    }

    fn to_stored(&self, url: &str, fetched: &FetchedResponse) -> StoredResponse {
        StoredResponse {
            url: url.to_string(),
            status: fetched.status,
            content_type: fetched.content_type.clone(),
            body: fetched.body.clone(),
            stored_at: self.clock.now(),
        }
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn is_static_asset(url: &Url) -> bool {
    let last_segment = url.path().rsplit('/').next().unwrap_or_default();
    match last_segment.rsplit_once('.') {
        Some((_, ext)) => STATIC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

fn from_fetched(fetched: FetchedResponse, source: ResponseSource) -> GatewayResponse {
    GatewayResponse {
        status: fetched.status,
        content_type: fetched.content_type,
        body: fetched.body,
        source,
    }
}

fn from_stored(stored: StoredResponse, source: ResponseSource) -> GatewayResponse {
    GatewayResponse {
        status: stored.status,
        content_type: stored.content_type,
        body: stored.body,
        source,
    }
}

fn network_unavailable() -> GatewayResponse {
    let body = ApiErrorBody {
        code: ErrorCode::NetworkUnavailable,
        error: "Sem conexão e sem dados guardados para esta consulta.".into(),
        details: None,
    };
    GatewayResponse {
        status: 503,
        content_type: Some("application/json".into()),
        body: serde_json::to_vec(&body).unwrap_or_default(),
        source: ResponseSource::Unavailable,
    }
}
