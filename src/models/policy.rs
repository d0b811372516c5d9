// src/models/policy.rs

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Estrelas do entregador, sempre entre 1 e 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "u8", into = "u8")]
pub struct DriverTier(u8);

impl DriverTier {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;
    pub const COUNT: usize = (Self::MAX - Self::MIN + 1) as usize;

    pub const fn highest() -> Self {
        DriverTier(Self::MAX)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Posição 0-based, para tabelas indexadas por nível.
    pub fn index(self) -> usize {
        usize::from(self.0 - Self::MIN)
    }

    pub fn all() -> impl Iterator<Item = DriverTier> {
        (Self::MIN..=Self::MAX).map(DriverTier)
    }
}

impl TryFrom<u8> for DriverTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(DriverTier(value))
        } else {
            Err(format!("nível {value} fora do intervalo 1-5"))
        }
    }
}

impl From<DriverTier> for u8 {
    fn from(tier: DriverTier) -> Self {
        tier.0
    }
}

// --- Configuração por empresa (tabelas) ---
#[derive(Debug, Clone, FromRow)]
pub struct TenantBookingSettings {
    pub tenant_id: Uuid,
    pub same_day_enabled: bool,
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReleaseTimeRow {
    pub tier: i16,
    pub release_time: NaiveTime,
}

/// Tudo que a store devolve sobre a política de liberação de uma empresa.
#[derive(Debug, Clone)]
pub struct ReleasePolicyRecord {
    pub settings: TenantBookingSettings,
    pub release_times: Vec<ReleaseTimeRow>,
}
