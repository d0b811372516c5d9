// src/db/memory_store.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::store::{
        ActivationWrite, AdmissionGuard, AdmissionWrite, BookingStore, SlotUpdate, TransitionWrite,
    },
    models::{
        booking::{BookedShift, Booking, BookingStatus, NewBooking, StatusChange},
        policy::ReleasePolicyRecord,
        slot::{NewRegion, NewShift, NewSlot, Region, Shift, SlotChanges, SlotRecord},
    },
    services::conflict::find_conflict,
};

#[derive(Default)]
struct State {
    shifts: HashMap<Uuid, Shift>,
    regions: HashMap<Uuid, Region>,
    slots: HashMap<Uuid, SlotRecord>,
    // ordem de inserção = ordem de chegada (FIFO da lista de espera)
    bookings: Vec<Booking>,
    policies: HashMap<Uuid, ReleasePolicyRecord>,
}

impl State {
    fn slot_record(&self, tenant_id: Uuid, slot_id: Uuid) -> Option<SlotRecord> {
        let slot = self.slots.get(&slot_id).filter(|s| s.tenant_id == tenant_id)?;
        let mut record = slot.clone();
        let shift = record.shift_id.and_then(|id| self.shifts.get(&id));
        record.shift_name = shift.map(|s| s.name.clone());
        record.shift_start = shift.map(|s| s.start_time);
        record.shift_end = shift.map(|s| s.end_time);
        record.region_name = record
            .region_id
            .and_then(|id| self.regions.get(&id))
            .map(|r| r.name.clone());
        Some(record)
    }

    fn active_count(&self, slot_id: Uuid) -> i64 {
        self.bookings
            .iter()
            .filter(|b| b.slot_id == slot_id && b.status == BookingStatus::Active)
            .count() as i64
    }

    fn refresh_occupied_count(&mut self, slot_id: Uuid) {
        let count = self.active_count(slot_id) as i32;
        if let Some(slot) = self.slots.get_mut(&slot_id) {
            slot.occupied_count = count;
        }
    }

    fn driver_shifts(&self, tenant_id: Uuid, driver_id: Uuid, from: NaiveDate) -> Vec<BookedShift> {
        let mut shifts: Vec<BookedShift> = self
            .bookings
            .iter()
            .filter(|b| b.tenant_id == tenant_id && b.driver_id == driver_id && b.status.is_live())
            .filter_map(|b| {
                let slot = self.slots.get(&b.slot_id)?;
                let shift = self.shifts.get(&slot.shift_id?)?;
                (slot.slot_date >= from).then(|| BookedShift {
                    booking_id: b.id,
                    slot_id: b.slot_id,
                    slot_date: slot.slot_date,
                    shift_name: shift.name.clone(),
                    shift_start: shift.start_time,
                    shift_end: shift.end_time,
                    status: b.status,
                })
            })
            .collect();
        shifts.sort_by_key(|s| (s.slot_date, s.shift_start));
        shifts
    }

    fn booking_index(&self, tenant_id: Uuid, booking_id: Uuid) -> Option<usize> {
        self.bookings
            .iter()
            .position(|b| b.id == booking_id && b.tenant_id == tenant_id)
    }
}

/// Store em memória com as mesmas garantias da store Postgres: cada escrita condicional
/// roda inteira sob um único lock. Usada nos testes e com `STORE_BACKEND=memory`.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_release_policy(&self, record: ReleasePolicyRecord) {
        let mut state = self.state.lock().await;
        state.policies.insert(record.settings.tenant_id, record);
    }

    /// Remove a região de uma agenda, simulando dado corrompido (FK apagada).
    pub async fn detach_region(&self, slot_id: Uuid) {
        let mut state = self.state.lock().await;
        if let Some(slot) = state.slots.get_mut(&slot_id) {
            slot.region_id = None;
        }
    }

    /// Grava o contador desnormalizado sem tocar nos agendamentos (simula um contador defasado).
    pub async fn force_occupied_count(&self, slot_id: Uuid, value: i32) {
        let mut state = self.state.lock().await;
        if let Some(slot) = state.slots.get_mut(&slot_id) {
            slot.occupied_count = value;
        }
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn get_slot(&self, tenant_id: Uuid, slot_id: Uuid) -> Result<Option<SlotRecord>, AppError> {
        Ok(self.state.lock().await.slot_record(tenant_id, slot_id))
    }

    async fn list_open_slots(&self, tenant_id: Uuid, from: NaiveDate) -> Result<Vec<SlotRecord>, AppError> {
        let state = self.state.lock().await;
        let mut records: Vec<SlotRecord> = state
            .slots
            .values()
            .filter(|s| s.tenant_id == tenant_id && s.active && s.slot_date >= from)
            .filter_map(|s| state.slot_record(tenant_id, s.id))
            .collect();
        records.sort_by_key(|r| (r.slot_date, r.shift_start.is_none(), r.shift_start, r.created_at));
        Ok(records)
    }

    async fn count_active(&self, tenant_id: Uuid, slot_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>, AppError> {
        let state = self.state.lock().await;
        let mut counts = HashMap::new();
        for booking in state.bookings.iter().filter(|b| {
            b.tenant_id == tenant_id && b.status == BookingStatus::Active && slot_ids.contains(&b.slot_id)
        }) {
            *counts.entry(booking.slot_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn list_driver_shifts(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
        from: NaiveDate,
    ) -> Result<Vec<BookedShift>, AppError> {
        Ok(self.state.lock().await.driver_shifts(tenant_id, driver_id, from))
    }

    async fn get_booking(&self, tenant_id: Uuid, booking_id: Uuid) -> Result<Option<Booking>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .booking_index(tenant_id, booking_id)
            .map(|i| state.bookings[i].clone()))
    }

    async fn find_booking_by_action(&self, tenant_id: Uuid, action_id: Uuid) -> Result<Option<Booking>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .iter()
            .find(|b| b.tenant_id == tenant_id && b.client_action_id == Some(action_id))
            .cloned())
    }

    async fn list_waitlist(&self, tenant_id: Uuid, slot_id: Uuid) -> Result<Vec<Booking>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .iter()
            .filter(|b| b.tenant_id == tenant_id && b.slot_id == slot_id && b.status == BookingStatus::Pending)
            .cloned()
            .collect())
    }

    async fn get_release_policy(&self, tenant_id: Uuid) -> Result<Option<ReleasePolicyRecord>, AppError> {
        Ok(self.state.lock().await.policies.get(&tenant_id).cloned())
    }

    async fn insert_booking(&self, new: NewBooking, guard: AdmissionGuard) -> Result<AdmissionWrite, AppError> {
        let mut state = self.state.lock().await;

        if let Some(action_id) = new.client_action_id {
            if let Some(existing) = state
                .bookings
                .iter()
                .find(|b| b.tenant_id == new.tenant_id && b.client_action_id == Some(action_id))
            {
                return Ok(AdmissionWrite::Duplicate(existing.clone()));
            }
        }

        let capacity = match state.slots.get(&new.slot_id) {
            Some(slot) if slot.tenant_id == new.tenant_id && slot.active => slot.capacity,
            _ => return Ok(AdmissionWrite::SlotUnavailable),
        };

        if let Some(existing) = state.bookings.iter().find(|b| {
            b.slot_id == new.slot_id && b.driver_id == new.driver_id && b.status.is_live()
        }) {
            return Ok(AdmissionWrite::Duplicate(existing.clone()));
        }

        let shifts = state.driver_shifts(new.tenant_id, new.driver_id, guard.date);
        if let Some(clash) = find_conflict(&shifts, guard.date, &guard.window, None) {
            return Ok(AdmissionWrite::Conflict(clash.clone()));
        }

        if guard.enforce_capacity && state.active_count(new.slot_id) >= i64::from(capacity) {
            return Ok(AdmissionWrite::SlotFull);
        }

        let now = Utc::now();
        let booking = Booking {
            id: new.id,
            tenant_id: new.tenant_id,
            slot_id: new.slot_id,
            driver_id: new.driver_id,
            status: new.status,
            kind: new.kind,
            client_action_id: new.client_action_id,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
        };
        state.bookings.push(booking.clone());
        state.refresh_occupied_count(booking.slot_id);

        Ok(AdmissionWrite::Admitted(booking))
    }

    async fn activate_booking(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        guard: AdmissionGuard,
    ) -> Result<ActivationWrite, AppError> {
        let mut state = self.state.lock().await;

        let Some(index) = state.booking_index(tenant_id, booking_id) else {
            return Ok(ActivationWrite::Missing);
        };
        let booking = state.bookings[index].clone();
        if booking.status != BookingStatus::Pending {
            return Ok(ActivationWrite::NotPending(booking));
        }
        let Some(capacity) = state.slots.get(&booking.slot_id).map(|s| s.capacity) else {
            return Ok(ActivationWrite::Missing);
        };

        let shifts = state.driver_shifts(tenant_id, booking.driver_id, guard.date);
        if let Some(clash) = find_conflict(&shifts, guard.date, &guard.window, Some(booking.id)) {
            return Ok(ActivationWrite::Conflict(clash.clone()));
        }
        if state.active_count(booking.slot_id) >= i64::from(capacity) {
            return Ok(ActivationWrite::SlotFull);
        }

        let activated = {
            let stored = &mut state.bookings[index];
            stored.status = BookingStatus::Active;
            stored.updated_at = Utc::now();
            stored.clone()
        };
        state.refresh_occupied_count(activated.slot_id);

        Ok(ActivationWrite::Activated(activated))
    }

    async fn transition_booking(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        change: StatusChange,
    ) -> Result<TransitionWrite, AppError> {
        let mut state = self.state.lock().await;

        let Some(index) = state.booking_index(tenant_id, booking_id) else {
            return Ok(TransitionWrite::Missing);
        };
        let previous = state.bookings[index].status;
        if !previous.can_transition_to(change.to) {
            return Ok(TransitionWrite::Rejected(state.bookings[index].clone()));
        }

        let updated = {
            let stored = &mut state.bookings[index];
            stored.status = change.to;
            stored.updated_at = change.at;
            if change.to == BookingStatus::Cancelled {
                stored.cancelled_at = Some(change.at);
                stored.cancelled_by = Some(change.actor_id);
                stored.cancel_reason = change.reason;
            }
            stored.clone()
        };
        if previous == BookingStatus::Active {
            state.refresh_occupied_count(updated.slot_id);
        }

        Ok(TransitionWrite::Applied { previous, booking: updated })
    }

    async fn insert_shift(&self, new: NewShift) -> Result<Shift, AppError> {
        let mut state = self.state.lock().await;
        if state
            .shifts
            .values()
            .any(|s| s.tenant_id == new.tenant_id && s.name == new.name)
        {
            return Err(AppError::StructuralInvalid(format!("turno '{}' já existe", new.name)));
        }
        let shift = Shift {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            name: new.name,
            start_time: new.window.start,
            end_time: new.window.end,
            created_at: Utc::now(),
        };
        state.shifts.insert(shift.id, shift.clone());
        Ok(shift)
    }

    async fn insert_region(&self, new: NewRegion) -> Result<Region, AppError> {
        let mut state = self.state.lock().await;
        if state
            .regions
            .values()
            .any(|r| r.tenant_id == new.tenant_id && r.name == new.name)
        {
            return Err(AppError::StructuralInvalid(format!("região '{}' já existe", new.name)));
        }
        let region = Region {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            name: new.name,
            created_at: Utc::now(),
        };
        state.regions.insert(region.id, region.clone());
        Ok(region)
    }

    async fn insert_slot(&self, new: NewSlot) -> Result<SlotRecord, AppError> {
        let mut state = self.state.lock().await;
        let shift_ok = state.shifts.get(&new.shift_id).is_some_and(|s| s.tenant_id == new.tenant_id);
        let region_ok = state.regions.get(&new.region_id).is_some_and(|r| r.tenant_id == new.tenant_id);
        if !shift_ok || !region_ok {
            return Err(AppError::StructuralInvalid("turno ou região inexistente".into()));
        }
        let record = SlotRecord {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            slot_date: new.date,
            shift_id: Some(new.shift_id),
            region_id: Some(new.region_id),
            capacity: new.capacity,
            occupied_count: 0,
            allow_reservation: new.allow_reservation,
            active: true,
            created_by: new.created_by,
            created_at: Utc::now(),
            shift_name: None,
            shift_start: None,
            shift_end: None,
            region_name: None,
        };
        let id = record.id;
        state.slots.insert(id, record);
        state
            .slot_record(new.tenant_id, id)
            .ok_or(AppError::SlotNotFound(id))
    }

    async fn update_slot(&self, tenant_id: Uuid, slot_id: Uuid, changes: SlotChanges) -> Result<SlotUpdate, AppError> {
        let mut state = self.state.lock().await;
        if state.slot_record(tenant_id, slot_id).is_none() {
            return Ok(SlotUpdate::Missing);
        }
        if let Some(requested) = changes.capacity {
            let occupancy = state.active_count(slot_id);
            if i64::from(requested) < occupancy {
                return Ok(SlotUpdate::BelowOccupancy { occupancy });
            }
        }
        if let Some(slot) = state.slots.get_mut(&slot_id) {
            if let Some(capacity) = changes.capacity {
                slot.capacity = capacity;
            }
            if let Some(active) = changes.active {
                slot.active = active;
            }
            if let Some(allow) = changes.allow_reservation {
                slot.allow_reservation = allow;
            }
        }
        Ok(state
            .slot_record(tenant_id, slot_id)
            .map(SlotUpdate::Updated)
            .unwrap_or(SlotUpdate::Missing))
    }
}
