// src/services/availability.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    common::{clock::Clock, error::AppError},
    db::BookingStore,
    models::{
        auth::Identity,
        booking::BookedShift,
        policy::DriverTier,
        slot::{AnnotatedSlot, BlockReason, SlotRecord},
    },
    services::{
        conflict::find_conflict,
        tier_policy::{EligibilityReason, PolicyResolver, ReleasePolicy},
    },
};

#[derive(Clone)]
pub struct AvailabilityService {
    store: Arc<dyn BookingStore>,
    policies: PolicyResolver,
    clock: Arc<dyn Clock>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn BookingStore>, policies: PolicyResolver, clock: Arc<dyn Clock>) -> Self {
        Self { store, policies, clock }
    }

    /// `ListAvailable(driverId, tenantId)`: leitura sem lock; a escrita revalida tudo.
    pub async fn list_available(&self, identity: &Identity) -> Result<Vec<AnnotatedSlot>, AppError> {
        let now = self.clock.now();
        let policy = self.policies.resolve(identity.tenant_id).await?;
        let today = policy.today(now);

        let records = self.store.list_open_slots(identity.tenant_id, today).await?;
        let slot_ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let occupancy = self.store.count_active(identity.tenant_id, &slot_ids).await?;
        let driver_shifts = self
            .store
            .list_driver_shifts(identity.tenant_id, identity.user_id, today)
            .await?;

        Ok(annotate(records, &occupancy, &driver_shifts, &policy, identity.tier, now))
    }
}

/// Anota cada agenda para o entregador. Agendas com turno encerrado somem da lista e as
/// já iniciadas aparecem bloqueadas; agendas com relação faltando são descartadas com aviso.
pub fn annotate(
    records: Vec<SlotRecord>,
    occupancy: &HashMap<Uuid, i64>,
    driver_shifts: &[BookedShift],
    policy: &ReleasePolicy,
    tier: DriverTier,
    now: DateTime<Utc>,
) -> Vec<AnnotatedSlot> {
    records
        .into_iter()
        .filter_map(|record| {
            let slot_id = record.id;
            match record.into_slot() {
                Ok(slot) => Some(slot),
                Err(e) => {
                    tracing::warn!(%slot_id, error = %e, "⚠️ Agenda descartada da listagem (STRUCTURAL_INVALID)");
                    None
                }
            }
        })
        .filter(|slot| !policy.shift_ended(slot.date, &slot.window, now))
        .map(|slot| {
            let occupancy = occupancy.get(&slot.id).copied().unwrap_or(0);
            let already_booked = driver_shifts.iter().any(|s| s.slot_id == slot.id);
            let conflict = find_conflict(driver_shifts, slot.date, &slot.window, None)
                .filter(|clash| clash.slot_id != slot.id);
            let eligibility = policy.evaluate(tier, slot.date, &slot.window, now);
            let full = occupancy >= i64::from(slot.capacity);

            let block_reason = if eligibility.reason == EligibilityReason::ShiftEnded {
                Some(BlockReason::ShiftEnded)
            } else if already_booked {
                Some(BlockReason::AlreadyBooked)
            } else if conflict.is_some() {
                Some(BlockReason::TimeConflict)
            } else if !eligibility.allowed {
                match eligibility.reason {
                    EligibilityReason::SameDayDisabled => Some(BlockReason::SameDayDisabled),
                    _ => Some(BlockReason::NotYetReleased),
                }
            } else if full {
                Some(BlockReason::SlotFull)
            } else {
                None
            };

            AnnotatedSlot {
                occupancy,
                already_booked,
                bookable: block_reason.is_none(),
                waitlist_open: block_reason == Some(BlockReason::SlotFull) && slot.allow_reservation,
                block_reason,
                conflicting_booking_id: if block_reason == Some(BlockReason::TimeConflict) {
                    conflict.map(|c| c.booking_id)
                } else {
                    None
                },
                slot,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::BookingStatus;
    use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn brt() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn policy() -> ReleasePolicy {
        let table =
            ReleasePolicy::parse_release_table("5=08:00,4=08:30,3=09:00,2=09:45,1=10:30").unwrap();
        ReleasePolicy::new(table, true, brt()).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        brt()
            .from_local_datetime(&today().and_time(t(h, m)))
            .unwrap()
            .with_timezone(&Utc)
    }

    fn tier(v: u8) -> DriverTier {
        DriverTier::try_from(v).unwrap()
    }

    fn record(date: NaiveDate, start: NaiveTime, end: NaiveTime, capacity: i32) -> SlotRecord {
        SlotRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            slot_date: date,
            shift_id: Some(Uuid::new_v4()),
            region_id: Some(Uuid::new_v4()),
            capacity,
            occupied_count: 0,
            allow_reservation: false,
            active: true,
            created_by: Uuid::nil(),
            created_at: Utc::now(),
            shift_name: Some(format!("{start}-{end}")),
            shift_start: Some(start),
            shift_end: Some(end),
            region_name: Some("Centro".into()),
        }
    }

    fn booked_on(slot: &SlotRecord) -> BookedShift {
        BookedShift {
            booking_id: Uuid::new_v4(),
            slot_id: slot.id,
            slot_date: slot.slot_date,
            shift_name: "Manhã".into(),
            shift_start: slot.shift_start.unwrap(),
            shift_end: slot.shift_end.unwrap(),
            status: BookingStatus::Active,
        }
    }

    #[test]
    fn ended_and_broken_slots_are_dropped() {
        let ended = record(today(), t(6, 0), t(9, 0), 5);
        let mut broken = record(today(), t(14, 0), t(18, 0), 5);
        broken.region_id = None;
        let open = record(today(), t(14, 0), t(18, 0), 5);
        let open_id = open.id;

        let out = annotate(vec![ended, broken, open], &HashMap::new(), &[], &policy(), tier(5), at(10, 0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].slot.id, open_id);
        assert!(out[0].bookable);
    }

    #[test]
    fn occupancy_comes_from_live_counts_not_the_counter() {
        let mut slot = record(today(), t(14, 0), t(18, 0), 2);
        slot.occupied_count = 0; // contador defasado
        let counts = HashMap::from([(slot.id, 2)]);

        let out = annotate(vec![slot], &counts, &[], &policy(), tier(5), at(10, 0));
        assert_eq!(out[0].occupancy, 2);
        assert_eq!(out[0].block_reason, Some(BlockReason::SlotFull));
        assert!(!out[0].waitlist_open);
    }

    #[test]
    fn block_reason_follows_precedence() {
        // Já agendado vence conflito, nível e lotação
        let mine = record(today(), t(14, 0), t(18, 0), 1);
        let counts = HashMap::from([(mine.id, 1)]);
        let shifts = vec![booked_on(&mine)];
        let out = annotate(vec![mine.clone()], &counts, &shifts, &policy(), tier(1), at(9, 0));
        assert_eq!(out[0].block_reason, Some(BlockReason::AlreadyBooked));
        assert!(out[0].already_booked);

        // Conflito vence a trava de nível
        let overlapping = record(today(), t(16, 0), t(20, 0), 5);
        let out = annotate(vec![overlapping], &HashMap::new(), &shifts, &policy(), tier(1), at(9, 0));
        assert_eq!(out[0].block_reason, Some(BlockReason::TimeConflict));
        assert_eq!(out[0].conflicting_booking_id, Some(shifts[0].booking_id));

        // Trava de nível vence lotação
        let mut full = record(today(), t(19, 0), t(22, 0), 1);
        full.allow_reservation = true;
        let counts = HashMap::from([(full.id, 1)]);
        let out = annotate(vec![full.clone()], &counts, &[], &policy(), tier(1), at(9, 0));
        assert_eq!(out[0].block_reason, Some(BlockReason::NotYetReleased));
        assert!(!out[0].waitlist_open);

        // Liberado e lotado: lista de espera aberta
        let out = annotate(vec![full], &counts, &[], &policy(), tier(5), at(9, 0));
        assert_eq!(out[0].block_reason, Some(BlockReason::SlotFull));
        assert!(out[0].waitlist_open);
    }

    #[test]
    fn in_progress_slot_is_listed_as_shift_ended() {
        let running = record(today(), t(9, 0), t(13, 0), 5);
        let running_id = running.id;
        let counts = HashMap::from([(running.id, 5)]);
        let mut later = record(today(), t(14, 0), t(18, 0), 5);
        later.allow_reservation = true;

        let out = annotate(vec![running, later], &counts, &[], &policy(), tier(5), at(9, 0));
        assert_eq!(out.len(), 2);
        let running = out.iter().find(|a| a.slot.id == running_id).unwrap();
        // Turno iniciado vence lotação e não abre lista de espera
        assert_eq!(running.block_reason, Some(BlockReason::ShiftEnded));
        assert!(!running.bookable);
        assert!(!running.waitlist_open);
        assert!(out.iter().any(|a| a.slot.id != running_id && a.bookable));
    }

    #[test]
    fn future_slots_ignore_the_tier_gate() {
        let tomorrow = record(today().succ_opt().unwrap(), t(6, 0), t(10, 0), 3);
        let out = annotate(vec![tomorrow], &HashMap::new(), &[], &policy(), tier(1), at(7, 0));
        assert!(out[0].bookable);
    }
}
