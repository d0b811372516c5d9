// src/config.rs

use std::{env, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::{
    common::clock::{Clock, SystemClock},
    db::{BookingStore, MemoryStore, PgBookingStore},
    services::{
        availability::AvailabilityService,
        booking_service::BookingService,
        slot_admin::SlotAdminService,
        tier_policy::{PolicyResolver, ReleasePolicy},
    },
};

const DEFAULT_RELEASE_TIMES: &str = "5=08:00,4=08:30,3=09:00,2=09:45,1=10:30";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Tudo que vem do ambiente, lido uma vez na subida.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub db_max_connections: u32,
    pub default_tenant_id: Option<Uuid>,
    pub release_policy: ReleasePolicy,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_backend = match lookup("STORE_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => bail!("STORE_BACKEND inválido: '{other}' (use postgres ou memory)"),
        };

        let database_url = lookup("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL deve ser definida");
        }
        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET deve ser definido")?;

        let db_max_connections = lookup("DB_MAX_CONNECTIONS")
            .map(|raw| raw.parse::<u32>())
            .transpose()
            .context("DB_MAX_CONNECTIONS deve ser um inteiro")?
            .unwrap_or(5);

        let default_tenant_id = lookup("DEFAULT_TENANT_ID")
            .map(|raw| Uuid::parse_str(raw.trim()))
            .transpose()
            .context("DEFAULT_TENANT_ID deve ser um UUID")?;

        let release_table = ReleasePolicy::parse_release_table(
            lookup("RELEASE_TIMES").as_deref().unwrap_or(DEFAULT_RELEASE_TIMES),
        )?;
        let same_day_enabled = match lookup("SAME_DAY_BOOKING").as_deref() {
            None => true,
            Some(raw) => raw
                .trim()
                .parse::<bool>()
                .map_err(|_| anyhow!("SAME_DAY_BOOKING deve ser true ou false"))?,
        };
        let utc_offset = ReleasePolicy::parse_offset(lookup("TENANT_UTC_OFFSET").as_deref().unwrap_or("-03:00"))?;
        let release_policy = ReleasePolicy::new(release_table, same_day_enabled, utc_offset)?;

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            store_backend,
            db_max_connections,
            default_tenant_id,
            release_policy,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db_pool: Option<PgPool>,
    pub availability_service: AvailabilityService,
    pub booking_service: BookingService,
    pub slot_admin_service: SlotAdminService,
}

impl AppState {
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let (store, db_pool): (Arc<dyn BookingStore>, Option<PgPool>) = match settings.store_backend {
            StoreBackend::Postgres => {
                let database_url = settings
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL deve ser definida")?;

                // Conecta ao banco de dados, usando '?' para propagar erros
                let db_pool = PgPoolOptions::new()
                    .max_connections(settings.db_max_connections)
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(database_url)
                    .await?;

                tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");
                (Arc::new(PgBookingStore::new(db_pool.clone())), Some(db_pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("⚠️ STORE_BACKEND=memory: os dados somem ao reiniciar");
                (Arc::new(MemoryStore::new()), None)
            }
        };

        Ok(Self::with_store(settings, store, Arc::new(SystemClock), db_pool))
    }

    // --- Monta o gráfico de dependências ---
    pub fn with_store(
        settings: Settings,
        store: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        db_pool: Option<PgPool>,
    ) -> Self {
        let policies = PolicyResolver::new(settings.release_policy.clone(), store.clone());
        let availability_service = AvailabilityService::new(store.clone(), policies.clone(), clock.clone());
        let booking_service = BookingService::new(store.clone(), policies, clock);
        let slot_admin_service = SlotAdminService::new(store, booking_service.clone());

        Self {
            settings: Arc::new(settings),
            db_pool,
            availability_service,
            booking_service,
            slot_admin_service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn memory_backend_needs_no_database() {
        let settings = Settings::from_lookup(lookup(&[("STORE_BACKEND", "memory"), ("JWT_SECRET", "s")])).unwrap();
        assert_eq!(settings.store_backend, StoreBackend::Memory);
        assert_eq!(settings.bind_addr, "0.0.0.0:3000");
        assert!(settings.release_policy.same_day_enabled());
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        assert!(Settings::from_lookup(lookup(&[("JWT_SECRET", "s")])).is_err());
    }

    #[test]
    fn invalid_release_table_fails_startup() {
        let result = Settings::from_lookup(lookup(&[
            ("STORE_BACKEND", "memory"),
            ("JWT_SECRET", "s"),
            ("RELEASE_TIMES", "5=08:00,1=10:30"),
        ]));
        assert!(result.is_err());
    }
}
