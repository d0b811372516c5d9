// src/services/tier_policy.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::BookingStore,
    models::{
        policy::{DriverTier, ReleasePolicyRecord},
        slot::ShiftWindow,
    },
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("nível {0} sem horário de liberação")]
    MissingTier(u8),
    #[error("nível {0} inválido")]
    InvalidTier(i64),
    #[error("nível {higher} libera depois do nível {lower}")]
    NotMonotonic { higher: u8, lower: u8 },
    #[error("entrada inválida na tabela de liberação: '{0}'")]
    Malformed(String),
    #[error("fuso inválido: '{0}'")]
    InvalidOffset(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EligibilityReason {
    /// Agenda de hoje e o horário do nível já passou.
    Released,
    /// Agenda futura; a liberação escalonada só vale para o mesmo dia.
    FutureDate,
    NotYetReleased,
    SameDayDisabled,
    ShiftEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub allowed: bool,
    pub reason: EligibilityReason,
    pub release_at: Option<NaiveTime>,
}

impl Eligibility {
    fn allowed(reason: EligibilityReason) -> Self {
        Self { allowed: true, reason, release_at: None }
    }

    fn blocked(reason: EligibilityReason, release_at: Option<NaiveTime>) -> Self {
        Self { allowed: false, reason, release_at }
    }

    pub fn into_result(self) -> Result<(), AppError> {
        match self.reason {
            _ if self.allowed => Ok(()),
            EligibilityReason::ShiftEnded => Err(AppError::ShiftEnded),
            EligibilityReason::SameDayDisabled => Err(AppError::SameDayDisabled),
            _ => Err(AppError::NotYetReleased {
                release_at: self.release_at.unwrap_or(NaiveTime::MIN),
            }),
        }
    }
}

/// Política de liberação escalonada de uma empresa: nível → horário do dia em que a
/// agenda do mesmo dia abre. Função pura; todo horário é comparado no relógio da empresa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePolicy {
    /// Indexado por `DriverTier::index`.
    release_times: [NaiveTime; DriverTier::COUNT],
    same_day_enabled: bool,
    utc_offset: FixedOffset,
}

impl ReleasePolicy {
    /// Exige os 5 níveis e que nível maior nunca libere depois de nível menor.
    pub fn new(
        release_times: BTreeMap<DriverTier, NaiveTime>,
        same_day_enabled: bool,
        utc_offset: FixedOffset,
    ) -> Result<Self, PolicyError> {
        let mut times = [NaiveTime::MIN; DriverTier::COUNT];
        for tier in DriverTier::all() {
            times[tier.index()] = *release_times
                .get(&tier)
                .ok_or(PolicyError::MissingTier(tier.value()))?;
        }
        for (lower, higher) in release_times.iter().zip(release_times.iter().skip(1)) {
            if higher.1 > lower.1 {
                return Err(PolicyError::NotMonotonic {
                    higher: higher.0.value(),
                    lower: lower.0.value(),
                });
            }
        }
        Ok(Self { release_times: times, same_day_enabled, utc_offset })
    }

    /// Lê `"5=08:00,4=08:30,3=09:00,2=09:45,1=10:30"`.
    pub fn parse_release_table(raw: &str) -> Result<BTreeMap<DriverTier, NaiveTime>, PolicyError> {
        let mut table = BTreeMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (tier, time) = entry
                .split_once('=')
                .ok_or_else(|| PolicyError::Malformed(entry.to_string()))?;
            let tier: u8 = tier
                .trim()
                .parse()
                .map_err(|_| PolicyError::Malformed(entry.to_string()))?;
            let tier = DriverTier::try_from(tier).map_err(|_| PolicyError::InvalidTier(tier.into()))?;
            let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
                .map_err(|_| PolicyError::Malformed(entry.to_string()))?;
            table.insert(tier, time);
        }
        Ok(table)
    }

    /// Lê `"-03:00"` / `"+05:30"`.
    pub fn parse_offset(raw: &str) -> Result<FixedOffset, PolicyError> {
        let raw = raw.trim();
        let invalid = || PolicyError::InvalidOffset(raw.to_string());
        let (sign, rest) = match raw.as_bytes().first() {
            Some(b'-') => (-1, &raw[1..]),
            Some(b'+') => (1, &raw[1..]),
            _ => (1, raw),
        };
        let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
    }

    pub fn from_record(record: &ReleasePolicyRecord) -> Result<Self, PolicyError> {
        let mut table = BTreeMap::new();
        for row in &record.release_times {
            let tier = u8::try_from(row.tier)
                .ok()
                .and_then(|t| DriverTier::try_from(t).ok())
                .ok_or(PolicyError::InvalidTier(row.tier.into()))?;
            table.insert(tier, row.release_time);
        }
        let offset_secs = record.settings.utc_offset_minutes * 60;
        let offset = FixedOffset::east_opt(offset_secs)
            .ok_or_else(|| PolicyError::InvalidOffset(record.settings.utc_offset_minutes.to_string()))?;
        Self::new(table, record.settings.same_day_enabled, offset)
    }

    pub fn release_time(&self, tier: DriverTier) -> NaiveTime {
        self.release_times[tier.index()]
    }

    pub fn same_day_enabled(&self) -> bool {
        self.same_day_enabled
    }

    pub fn local_now(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.utc_offset).naive_local()
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_now(now).date()
    }

    pub fn shift_ended(&self, slot_date: NaiveDate, window: &ShiftWindow, now: DateTime<Utc>) -> bool {
        self.local_now(now) >= window.ends_on(slot_date)
    }

    /// Turno já iniciado no relógio da empresa: não aceita mais agendamento.
    pub fn shift_started(&self, slot_date: NaiveDate, window: &ShiftWindow, now: DateTime<Utc>) -> bool {
        self.local_now(now) >= window.starts_on(slot_date)
    }

    /// `Eligible(tier, slotDate, shift, now)`. Precedência: turno iniciado ou encerrado,
    /// mesmo dia desativado, liberação do nível.
    pub fn evaluate(
        &self,
        tier: DriverTier,
        slot_date: NaiveDate,
        window: &ShiftWindow,
        now: DateTime<Utc>,
    ) -> Eligibility {
        if self.shift_started(slot_date, window, now) {
            return Eligibility::blocked(EligibilityReason::ShiftEnded, None);
        }

        let local_now = self.local_now(now);
        if slot_date > local_now.date() {
            return Eligibility::allowed(EligibilityReason::FutureDate);
        }

        if !self.same_day_enabled {
            return Eligibility::blocked(EligibilityReason::SameDayDisabled, None);
        }

        let release_at = self.release_time(tier);
        if slot_date == local_now.date() && local_now.time() < release_at {
            return Eligibility::blocked(EligibilityReason::NotYetReleased, Some(release_at));
        }
        Eligibility::allowed(EligibilityReason::Released)
    }
}

/// Resolve a política de cada empresa: override da store ou o padrão vindo do ambiente.
#[derive(Clone)]
pub struct PolicyResolver {
    default_policy: ReleasePolicy,
    store: Arc<dyn BookingStore>,
}

impl PolicyResolver {
    pub fn new(default_policy: ReleasePolicy, store: Arc<dyn BookingStore>) -> Self {
        Self { default_policy, store }
    }

    pub async fn resolve(&self, tenant_id: Uuid) -> Result<ReleasePolicy, AppError> {
        let Some(record) = self.store.get_release_policy(tenant_id).await? else {
            return Ok(self.default_policy.clone());
        };
        match ReleasePolicy::from_record(&record) {
            Ok(policy) => Ok(policy),
            Err(e) => {
                tracing::warn!(
                    %tenant_id,
                    error = %e,
                    "⚠️ Política de liberação inválida (STRUCTURAL_INVALID); usando o padrão"
                );
                Ok(self.default_policy.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn tier(v: u8) -> DriverTier {
        DriverTier::try_from(v).unwrap()
    }

    fn brt() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn policy(same_day: bool) -> ReleasePolicy {
        let table =
            ReleasePolicy::parse_release_table("5=08:00,4=08:30,3=09:00,2=09:45,1=10:30").unwrap();
        ReleasePolicy::new(table, same_day, brt()).unwrap()
    }

    fn local(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
        brt()
            .from_local_datetime(&date.and_time(t(h, m)))
            .unwrap()
            .with_timezone(&Utc)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    #[test]
    fn tier_five_opens_before_tier_one() {
        let p = policy(true);
        let window = ShiftWindow::new(t(14, 0), t(18, 0)).unwrap();
        let now = local(today(), 9, 0);

        let five = p.evaluate(tier(5), today(), &window, now);
        assert!(five.allowed);
        assert_eq!(five.reason, EligibilityReason::Released);

        let one = p.evaluate(tier(1), today(), &window, now);
        assert!(!one.allowed);
        assert_eq!(one.reason, EligibilityReason::NotYetReleased);
        assert_eq!(one.release_at, Some(t(10, 30)));
    }

    #[test]
    fn higher_tier_is_eligible_whenever_lower_tier_is() {
        let p = policy(true);
        let window = ShiftWindow::new(t(20, 0), t(23, 0)).unwrap();
        for minutes in (0..20 * 60).step_by(5) {
            let now = local(today(), minutes / 60, minutes % 60);
            for low in 1..=5u8 {
                for high in low..=5u8 {
                    let lo = p.evaluate(tier(low), today(), &window, now);
                    let hi = p.evaluate(tier(high), today(), &window, now);
                    assert!(!lo.allowed || hi.allowed, "tier {high} blocked while {low} allowed");
                }
            }
        }
    }

    #[test]
    fn future_dates_skip_the_tier_gate() {
        let p = policy(false);
        let window = ShiftWindow::new(t(6, 0), t(10, 0)).unwrap();
        let tomorrow = today().succ_opt().unwrap();
        let e = p.evaluate(tier(1), tomorrow, &window, local(today(), 5, 0));
        assert!(e.allowed);
        assert_eq!(e.reason, EligibilityReason::FutureDate);
    }

    #[test]
    fn same_day_can_be_disabled_per_tenant() {
        let p = policy(false);
        let window = ShiftWindow::new(t(14, 0), t(18, 0)).unwrap();
        let e = p.evaluate(tier(5), today(), &window, local(today(), 12, 0));
        assert_eq!(e.reason, EligibilityReason::SameDayDisabled);
        assert!(matches!(e.into_result(), Err(AppError::SameDayDisabled)));
    }

    #[test]
    fn ended_shift_is_never_eligible() {
        let p = policy(true);
        let window = ShiftWindow::new(t(8, 0), t(12, 0)).unwrap();
        let e = p.evaluate(tier(5), today(), &window, local(today(), 12, 0));
        assert_eq!(e.reason, EligibilityReason::ShiftEnded);
        let yesterday = today().pred_opt().unwrap();
        assert_eq!(
            p.evaluate(tier(5), yesterday, &window, local(today(), 7, 0)).reason,
            EligibilityReason::ShiftEnded
        );
    }

    #[test]
    fn comparisons_use_the_tenant_wall_clock() {
        let p = policy(true);
        let window = ShiftWindow::new(t(22, 0), t(23, 0)).unwrap();
        // 00:30 UTC do dia 2 ainda é 21:30 do dia 1 em BRT
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 0, 30, 0).unwrap();
        assert_eq!(p.today(now), today());
        assert!(p.evaluate(tier(1), today(), &window, now).allowed);

        // 01:00 UTC é 22:00 BRT: o turno começou
        let at_start = Utc.with_ymd_and_hms(2025, 3, 2, 1, 0, 0).unwrap();
        assert_eq!(
            p.evaluate(tier(5), today(), &window, at_start).reason,
            EligibilityReason::ShiftEnded
        );
    }

    #[test]
    fn started_shift_is_never_eligible() {
        let p = policy(true);
        let window = ShiftWindow::new(t(14, 0), t(18, 0)).unwrap();

        let before = p.evaluate(tier(5), today(), &window, local(today(), 13, 59));
        assert!(before.allowed);

        for now in [local(today(), 14, 0), local(today(), 14, 1), local(today(), 17, 59)] {
            let e = p.evaluate(tier(5), today(), &window, now);
            assert!(!e.allowed);
            assert_eq!(e.reason, EligibilityReason::ShiftEnded);
            assert!(matches!(e.into_result(), Err(AppError::ShiftEnded)));
            // Ainda não terminou: continua na listagem
            assert!(!p.shift_ended(today(), &window, now));
        }
    }

    #[test]
    fn overnight_shift_in_progress_is_not_eligible() {
        let p = policy(true);
        let window = ShiftWindow::new(t(22, 0), t(2, 0)).unwrap();
        let tomorrow = today().succ_opt().unwrap();
        // 01:00 do dia seguinte, turno de ontem ainda rodando
        let now = local(tomorrow, 1, 0);
        assert!(!p.shift_ended(today(), &window, now));
        assert_eq!(
            p.evaluate(tier(5), today(), &window, now).reason,
            EligibilityReason::ShiftEnded
        );
    }

    #[test]
    fn release_times_are_kept_per_tier() {
        let p = policy(true);
        let expected = [t(10, 30), t(9, 45), t(9, 0), t(8, 30), t(8, 0)];
        for (tier, at) in DriverTier::all().zip(expected) {
            assert_eq!(p.release_time(tier), at);
        }
    }

    #[test]
    fn construction_rejects_incomplete_or_inverted_tables() {
        let partial = ReleasePolicy::parse_release_table("5=08:00,1=10:30").unwrap();
        assert_eq!(
            ReleasePolicy::new(partial, true, brt()),
            Err(PolicyError::MissingTier(2))
        );
        let inverted =
            ReleasePolicy::parse_release_table("5=11:00,4=08:30,3=09:00,2=09:45,1=10:30").unwrap();
        assert!(matches!(
            ReleasePolicy::new(inverted, true, brt()),
            Err(PolicyError::NotMonotonic { .. })
        ));
        assert!(ReleasePolicy::parse_release_table("6=08:00").is_err());
    }

    #[test]
    fn parses_signed_offsets() {
        assert_eq!(ReleasePolicy::parse_offset("-03:00").unwrap(), brt());
        assert_eq!(
            ReleasePolicy::parse_offset("+05:30").unwrap(),
            FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
        );
        assert!(ReleasePolicy::parse_offset("3h").is_err());
    }
}
