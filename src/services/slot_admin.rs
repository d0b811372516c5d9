// src/services/slot_admin.rs

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{BookingStore, SlotUpdate},
    models::{
        auth::Identity,
        slot::{NewRegion, NewShift, NewSlot, Region, Shift, ShiftWindow, Slot, SlotChanges},
    },
    services::booking_service::{require_admin, BookingService},
};

/// Cadastro administrativo de turnos, regiões e agendas.
#[derive(Clone)]
pub struct SlotAdminService {
    store: Arc<dyn BookingStore>,
    bookings: BookingService,
}

impl SlotAdminService {
    pub fn new(store: Arc<dyn BookingStore>, bookings: BookingService) -> Self {
        Self { store, bookings }
    }

    pub async fn create_shift(
        &self,
        admin: &Identity,
        name: &str,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Shift, AppError> {
        require_admin(admin)?;
        let window = ShiftWindow::new(start, end)?;
        let shift = self
            .store
            .insert_shift(NewShift { tenant_id: admin.tenant_id, name: name.to_string(), window })
            .await?;
        tracing::info!(tenant_id = %admin.tenant_id, shift_id = %shift.id, "Turno criado");
        Ok(shift)
    }

    pub async fn create_region(&self, admin: &Identity, name: &str) -> Result<Region, AppError> {
        require_admin(admin)?;
        self.store
            .insert_region(NewRegion { tenant_id: admin.tenant_id, name: name.to_string() })
            .await
    }

    pub async fn create_slot(
        &self,
        admin: &Identity,
        date: NaiveDate,
        shift_id: Uuid,
        region_id: Uuid,
        capacity: i32,
        allow_reservation: bool,
    ) -> Result<Slot, AppError> {
        require_admin(admin)?;
        let record = self
            .store
            .insert_slot(NewSlot {
                tenant_id: admin.tenant_id,
                date,
                shift_id,
                region_id,
                capacity,
                allow_reservation,
                created_by: admin.user_id,
            })
            .await?;
        let slot = record.into_slot()?;
        tracing::info!(tenant_id = %admin.tenant_id, slot_id = %slot.id, %date, capacity, "Agenda publicada");
        Ok(slot)
    }

    /// Agendas nunca são apagadas; `active = false` desativa. A capacidade nunca desce
    /// abaixo da ocupação viva, e um aumento oferece as novas vagas à lista de espera.
    pub async fn update_slot(&self, admin: &Identity, slot_id: Uuid, changes: SlotChanges) -> Result<Slot, AppError> {
        require_admin(admin)?;
        let requested = changes.capacity;

        let record = match self.store.update_slot(admin.tenant_id, slot_id, changes).await? {
            SlotUpdate::Updated(record) => record,
            SlotUpdate::BelowOccupancy { occupancy } => {
                return Err(AppError::CapacityBelowOccupancy {
                    requested: requested.unwrap_or_default(),
                    occupancy,
                });
            }
            SlotUpdate::Missing => return Err(AppError::SlotNotFound(slot_id)),
        };
        let slot = record.into_slot()?;

        if requested.is_some() && slot.active {
            let promoted = self.bookings.promote_waitlist(admin.tenant_id, slot_id).await?;
            if !promoted.is_empty() {
                tracing::info!(%slot_id, promoted = promoted.len(), "Capacidade ampliada; reservas promovidas");
            }
        }
        Ok(slot)
    }
}
