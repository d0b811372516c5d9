// src/db/booking_repo.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{begin_tenant_tx, lock_driver},
        error::AppError,
    },
    db::store::{
        ActivationWrite, AdmissionGuard, AdmissionWrite, BookingStore, SlotUpdate, TransitionWrite,
    },
    models::{
        booking::{BookedShift, Booking, BookingStatus, NewBooking, StatusChange},
        policy::{ReleasePolicyRecord, ReleaseTimeRow, TenantBookingSettings},
        slot::{NewRegion, NewShift, NewSlot, Region, Shift, SlotChanges, SlotRecord},
    },
    services::conflict::find_conflict,
};

// Agenda + turno + região. LEFT JOIN de propósito: relação faltando vira
// STRUCTURAL_INVALID no serviço, não some silenciosamente da query.
const SLOT_SELECT: &str = r#"
    SELECT
        s.id, s.tenant_id, s.slot_date, s.shift_id, s.region_id,
        s.capacity, s.occupied_count, s.allow_reservation, s.active,
        s.created_by, s.created_at,
        sh.name AS shift_name, sh.start_time AS shift_start, sh.end_time AS shift_end,
        r.name AS region_name
    FROM slots s
    LEFT JOIN shifts sh ON sh.id = s.shift_id
    LEFT JOIN regions r ON r.id = s.region_id
"#;

const DRIVER_SHIFTS_SELECT: &str = r#"
    SELECT
        b.id AS booking_id, b.slot_id, s.slot_date,
        sh.name AS shift_name, sh.start_time AS shift_start, sh.end_time AS shift_end,
        b.status
    FROM bookings b
    JOIN slots s ON s.id = b.slot_id
    JOIN shifts sh ON sh.id = s.shift_id
    WHERE b.tenant_id = $1
      AND b.driver_id = $2
      AND s.slot_date >= $3
      AND b.status IN ('PENDING', 'ACTIVE')
    ORDER BY s.slot_date, sh.start_time
"#;

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Funções auxiliares (genéricas no executor, rodam dentro da transação)
    // ---

    async fn fetch_slot<'e, E>(executor: E, tenant_id: Uuid, slot_id: Uuid) -> Result<Option<SlotRecord>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let query = format!("{SLOT_SELECT} WHERE s.tenant_id = $1 AND s.id = $2");
        let record = sqlx::query_as::<_, SlotRecord>(&query)
            .bind(tenant_id)
            .bind(slot_id)
            .fetch_optional(executor)
            .await?;
        Ok(record)
    }

    async fn fetch_driver_shifts<'e, E>(
        executor: E,
        tenant_id: Uuid,
        driver_id: Uuid,
        from: NaiveDate,
    ) -> Result<Vec<BookedShift>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let shifts = sqlx::query_as::<_, BookedShift>(DRIVER_SHIFTS_SELECT)
            .bind(tenant_id)
            .bind(driver_id)
            .bind(from)
            .fetch_all(executor)
            .await?;
        Ok(shifts)
    }

    async fn fetch_booking<'e, E>(executor: E, tenant_id: Uuid, booking_id: Uuid, for_update: bool) -> Result<Option<Booking>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let query = if for_update {
            "SELECT * FROM bookings WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
        } else {
            "SELECT * FROM bookings WHERE tenant_id = $1 AND id = $2"
        };
        let booking = sqlx::query_as::<_, Booking>(query)
            .bind(tenant_id)
            .bind(booking_id)
            .fetch_optional(executor)
            .await?;
        Ok(booking)
    }

    /// Agendamento que barrou a inserção pelo índice único: o da mesma ação
    /// ou o vivo do entregador na agenda.
    async fn find_duplicate(&self, new: &NewBooking) -> Result<Option<Booking>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, new.tenant_id).await?;
        let rows = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE tenant_id = $1
              AND (client_action_id = $2
                   OR (slot_id = $3 AND driver_id = $4 AND status IN ('PENDING', 'ACTIVE')))
            "#,
        )
        .bind(new.tenant_id)
        .bind(new.client_action_id)
        .bind(new.slot_id)
        .bind(new.driver_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(pick_duplicate(new, rows))
    }

    async fn fetch_booking_by_action<'e, E>(executor: E, tenant_id: Uuid, action_id: Uuid) -> Result<Option<Booking>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let booking = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE tenant_id = $1 AND client_action_id = $2",
        )
        .bind(tenant_id)
        .bind(action_id)
        .fetch_optional(executor)
        .await?;
        Ok(booking)
    }

    /// Trava a linha da agenda. Todas as escritas numa mesma agenda passam por aqui,
    /// sempre antes de travar qualquer agendamento (ordem fixa: agenda → agendamento).
    async fn lock_slot<'e, E>(executor: E, tenant_id: Uuid, slot_id: Uuid) -> Result<Option<(i32, bool)>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, (i32, bool)>(
            "SELECT capacity, active FROM slots WHERE tenant_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(tenant_id)
        .bind(slot_id)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    async fn count_active_in<'e, E>(executor: E, slot_id: Uuid) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE slot_id = $1 AND status = 'ACTIVE'",
        )
        .bind(slot_id)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    /// O contador desnormalizado é só cache: sempre recalculado das linhas ACTIVE.
    async fn refresh_occupied_count<'e, E>(executor: E, slot_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE slots
            SET occupied_count = (
                SELECT COUNT(*) FROM bookings
                WHERE bookings.slot_id = slots.id AND bookings.status = 'ACTIVE'
            ),
            updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(slot_id)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn get_slot(&self, tenant_id: Uuid, slot_id: Uuid) -> Result<Option<SlotRecord>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;
        let record = Self::fetch_slot(&mut *tx, tenant_id, slot_id).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn list_open_slots(&self, tenant_id: Uuid, from: NaiveDate) -> Result<Vec<SlotRecord>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;
        let query = format!(
            "{SLOT_SELECT} WHERE s.tenant_id = $1 AND s.active AND s.slot_date >= $2 \
             ORDER BY s.slot_date ASC, sh.start_time ASC NULLS LAST"
        );
        let records = sqlx::query_as::<_, SlotRecord>(&query)
            .bind(tenant_id)
            .bind(from)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(records)
    }

    async fn count_active(&self, tenant_id: Uuid, slot_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>, AppError> {
        if slot_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT slot_id, COUNT(*)
            FROM bookings
            WHERE tenant_id = $1 AND slot_id = ANY($2) AND status = 'ACTIVE'
            GROUP BY slot_id
            "#,
        )
        .bind(tenant_id)
        .bind(slot_ids.to_vec())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows.into_iter().collect())
    }

    async fn list_driver_shifts(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
        from: NaiveDate,
    ) -> Result<Vec<BookedShift>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;
        let shifts = Self::fetch_driver_shifts(&mut *tx, tenant_id, driver_id, from).await?;
        tx.commit().await?;
        Ok(shifts)
    }

    async fn get_booking(&self, tenant_id: Uuid, booking_id: Uuid) -> Result<Option<Booking>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;
        let booking = Self::fetch_booking(&mut *tx, tenant_id, booking_id, false).await?;
        tx.commit().await?;
        Ok(booking)
    }

    async fn find_booking_by_action(&self, tenant_id: Uuid, action_id: Uuid) -> Result<Option<Booking>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;
        let booking = Self::fetch_booking_by_action(&mut *tx, tenant_id, action_id).await?;
        tx.commit().await?;
        Ok(booking)
    }

    async fn list_waitlist(&self, tenant_id: Uuid, slot_id: Uuid) -> Result<Vec<Booking>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;
        let waitlist = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE tenant_id = $1 AND slot_id = $2 AND status = 'PENDING'
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(slot_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(waitlist)
    }

    async fn get_release_policy(&self, tenant_id: Uuid) -> Result<Option<ReleasePolicyRecord>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;
        let settings = sqlx::query_as::<_, TenantBookingSettings>(
            "SELECT tenant_id, same_day_enabled, utc_offset_minutes FROM tenant_booking_policies WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(settings) = settings else {
            tx.commit().await?;
            return Ok(None);
        };

        let release_times = sqlx::query_as::<_, ReleaseTimeRow>(
            "SELECT tier, release_time FROM tenant_release_times WHERE tenant_id = $1 ORDER BY tier",
        )
        .bind(tenant_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(ReleasePolicyRecord { settings, release_times }))
    }

    async fn insert_booking(&self, new: NewBooking, guard: AdmissionGuard) -> Result<AdmissionWrite, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, new.tenant_id).await?;

        // 1. Serializa o entregador (conflito de horário) e depois a agenda (capacidade)
        lock_driver(&mut tx, new.driver_id).await?;

        if let Some(action_id) = new.client_action_id {
            if let Some(existing) = Self::fetch_booking_by_action(&mut *tx, new.tenant_id, action_id).await? {
                return Ok(AdmissionWrite::Duplicate(existing));
            }
        }

        let Some((capacity, active)) = Self::lock_slot(&mut *tx, new.tenant_id, new.slot_id).await? else {
            return Ok(AdmissionWrite::SlotUnavailable);
        };
        if !active {
            return Ok(AdmissionWrite::SlotUnavailable);
        }

        // 2. Revalida duplicidade e conflito já com o lock do entregador
        let shifts = Self::fetch_driver_shifts(&mut *tx, new.tenant_id, new.driver_id, guard.date).await?;
        if let Some(same_slot) = shifts.iter().find(|s| s.slot_id == new.slot_id) {
            let existing = Self::fetch_booking(&mut *tx, new.tenant_id, same_slot.booking_id, false).await?;
            if let Some(existing) = existing {
                return Ok(AdmissionWrite::Duplicate(existing));
            }
        }
        if let Some(clash) = find_conflict(&shifts, guard.date, &guard.window, None) {
            return Ok(AdmissionWrite::Conflict(clash.clone()));
        }

        // 3. Escrita condicional: só insere se ainda houver vaga
        let inserted = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (id, tenant_id, slot_id, driver_id, status, kind, client_action_id, metadata)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8
            WHERE NOT $9
               OR (SELECT COUNT(*) FROM bookings WHERE slot_id = $3 AND status = 'ACTIVE') < $10
            RETURNING *
            "#,
        )
        .bind(new.id)
        .bind(new.tenant_id)
        .bind(new.slot_id)
        .bind(new.driver_id)
        .bind(new.status)
        .bind(new.kind)
        .bind(new.client_action_id)
        .bind(&new.metadata)
        .bind(guard.enforce_capacity)
        .bind(i64::from(capacity))
        .fetch_optional(&mut *tx)
        .await;

        let inserted = match inserted {
            Ok(row) => row,
            Err(e) => {
                // Só chega aqui se alguém furou o lock; o índice único é a última barreira
                let unique = e.as_database_error().is_some_and(|db_err| db_err.is_unique_violation());
                if !unique {
                    return Err(e.into());
                }
                // A transação abortou; relê o agendamento vencedor numa nova
                tx.rollback().await?;
                return match self.find_duplicate(&new).await? {
                    Some(existing) => Ok(AdmissionWrite::Duplicate(existing)),
                    None => Err(e.into()),
                };
            }
        };

        let Some(booking) = inserted else {
            return Ok(AdmissionWrite::SlotFull);
        };

        Self::refresh_occupied_count(&mut *tx, booking.slot_id).await?;
        tx.commit().await?;

        Ok(AdmissionWrite::Admitted(booking))
    }

    async fn activate_booking(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        guard: AdmissionGuard,
    ) -> Result<ActivationWrite, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        let Some(current) = Self::fetch_booking(&mut *tx, tenant_id, booking_id, false).await? else {
            return Ok(ActivationWrite::Missing);
        };

        lock_driver(&mut tx, current.driver_id).await?;
        let Some((capacity, _)) = Self::lock_slot(&mut *tx, tenant_id, current.slot_id).await? else {
            return Ok(ActivationWrite::Missing);
        };

        let Some(booking) = Self::fetch_booking(&mut *tx, tenant_id, booking_id, true).await? else {
            return Ok(ActivationWrite::Missing);
        };
        if booking.status != BookingStatus::Pending {
            return Ok(ActivationWrite::NotPending(booking));
        }

        let shifts = Self::fetch_driver_shifts(&mut *tx, tenant_id, booking.driver_id, guard.date).await?;
        if let Some(clash) = find_conflict(&shifts, guard.date, &guard.window, Some(booking.id)) {
            return Ok(ActivationWrite::Conflict(clash.clone()));
        }

        let occupancy = Self::count_active_in(&mut *tx, booking.slot_id).await?;
        if occupancy >= i64::from(capacity) {
            return Ok(ActivationWrite::SlotFull);
        }

        let activated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = 'ACTIVE', updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(tenant_id)
        .fetch_one(&mut *tx)
        .await?;

        Self::refresh_occupied_count(&mut *tx, activated.slot_id).await?;
        tx.commit().await?;

        Ok(ActivationWrite::Activated(activated))
    }

    async fn transition_booking(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        change: StatusChange,
    ) -> Result<TransitionWrite, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        let Some(current) = Self::fetch_booking(&mut *tx, tenant_id, booking_id, false).await? else {
            return Ok(TransitionWrite::Missing);
        };
        Self::lock_slot(&mut *tx, tenant_id, current.slot_id).await?;

        let Some(booking) = Self::fetch_booking(&mut *tx, tenant_id, booking_id, true).await? else {
            return Ok(TransitionWrite::Missing);
        };
        if !booking.status.can_transition_to(change.to) {
            return Ok(TransitionWrite::Rejected(booking));
        }

        let previous = booking.status;
        let cancelling = change.to == BookingStatus::Cancelled;
        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = $3,
                updated_at = $4,
                cancelled_at = COALESCE($5, cancelled_at),
                cancelled_by = COALESCE($6, cancelled_by),
                cancel_reason = COALESCE($7, cancel_reason)
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(tenant_id)
        .bind(change.to)
        .bind(change.at)
        .bind(cancelling.then_some(change.at))
        .bind(cancelling.then_some(change.actor_id))
        .bind(if cancelling { change.reason.clone() } else { None })
        .fetch_one(&mut *tx)
        .await?;

        if previous == BookingStatus::Active {
            Self::refresh_occupied_count(&mut *tx, updated.slot_id).await?;
        }
        tx.commit().await?;

        Ok(TransitionWrite::Applied { previous, booking: updated })
    }

    async fn insert_shift(&self, new: NewShift) -> Result<Shift, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, new.tenant_id).await?;
        let shift = sqlx::query_as::<_, Shift>(
            r#"
            INSERT INTO shifts (tenant_id, name, start_time, end_time)
            VALUES ($1, $2, $3, $4)
            RETURNING id, tenant_id, name, start_time, end_time, created_at
            "#,
        )
        .bind(new.tenant_id)
        .bind(&new.name)
        .bind(new.window.start)
        .bind(new.window.end)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(shift)
    }

    async fn insert_region(&self, new: NewRegion) -> Result<Region, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, new.tenant_id).await?;
        let region = sqlx::query_as::<_, Region>(
            "INSERT INTO regions (tenant_id, name) VALUES ($1, $2) RETURNING id, tenant_id, name, created_at",
        )
        .bind(new.tenant_id)
        .bind(&new.name)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(region)
    }

    async fn insert_slot(&self, new: NewSlot) -> Result<SlotRecord, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, new.tenant_id).await?;
        let slot_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO slots (tenant_id, slot_date, shift_id, region_id, capacity, allow_reservation, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(new.tenant_id)
        .bind(new.date)
        .bind(new.shift_id)
        .bind(new.region_id)
        .bind(new.capacity)
        .bind(new.allow_reservation)
        .bind(new.created_by)
        .fetch_one(&mut *tx)
        .await?;

        let record = Self::fetch_slot(&mut *tx, new.tenant_id, slot_id)
            .await?
            .ok_or(AppError::SlotNotFound(slot_id))?;
        tx.commit().await?;
        Ok(record)
    }

    async fn update_slot(&self, tenant_id: Uuid, slot_id: Uuid, changes: SlotChanges) -> Result<SlotUpdate, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        if Self::lock_slot(&mut *tx, tenant_id, slot_id).await?.is_none() {
            return Ok(SlotUpdate::Missing);
        }

        if let Some(requested) = changes.capacity {
            let occupancy = Self::count_active_in(&mut *tx, slot_id).await?;
            if i64::from(requested) < occupancy {
                return Ok(SlotUpdate::BelowOccupancy { occupancy });
            }
        }

        sqlx::query(
            r#"
            UPDATE slots
            SET capacity = COALESCE($3, capacity),
                active = COALESCE($4, active),
                allow_reservation = COALESCE($5, allow_reservation),
                updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(slot_id)
        .bind(changes.capacity)
        .bind(changes.active)
        .bind(changes.allow_reservation)
        .execute(&mut *tx)
        .await?;

        let record = Self::fetch_slot(&mut *tx, tenant_id, slot_id).await?;
        tx.commit().await?;

        Ok(record.map(SlotUpdate::Updated).unwrap_or(SlotUpdate::Missing))
    }
}

/// Entre os candidatos, a mesma ação vence o agendamento vivo na agenda.
fn pick_duplicate(new: &NewBooking, rows: Vec<Booking>) -> Option<Booking> {
    let (by_action, live): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .partition(|b| new.client_action_id.is_some() && b.client_action_id == new.client_action_id);
    by_action.into_iter().next().or_else(|| {
        live.into_iter()
            .find(|b| b.slot_id == new.slot_id && b.driver_id == new.driver_id && b.status.is_live())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::BookingKind;
    use chrono::Utc;

    fn attempt(action_id: Option<Uuid>) -> NewBooking {
        NewBooking {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            status: BookingStatus::Active,
            kind: BookingKind::Standard,
            client_action_id: action_id,
            metadata: serde_json::json!({}),
        }
    }

    fn stored(new: &NewBooking, action_id: Option<Uuid>, status: BookingStatus) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            slot_id: new.slot_id,
            driver_id: new.driver_id,
            status,
            kind: BookingKind::Standard,
            client_action_id: action_id,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
        }
    }

    #[test]
    fn duplicate_names_the_stored_booking_not_the_attempt() {
        let new = attempt(None);
        let live = stored(&new, None, BookingStatus::Pending);
        let live_id = live.id;
        let found = pick_duplicate(&new, vec![live]).unwrap();
        assert_eq!(found.id, live_id);
        assert_ne!(found.id, new.id);
    }

    #[test]
    fn same_action_wins_over_the_live_booking() {
        let action = Uuid::new_v4();
        let new = attempt(Some(action));
        let live = stored(&new, None, BookingStatus::Active);
        let mut replayed = stored(&new, Some(action), BookingStatus::Cancelled);
        replayed.slot_id = Uuid::new_v4();
        let replayed_id = replayed.id;

        let found = pick_duplicate(&new, vec![live, replayed]).unwrap();
        assert_eq!(found.id, replayed_id);
    }

    #[test]
    fn terminal_bookings_on_the_slot_are_not_duplicates() {
        let new = attempt(None);
        let cancelled = stored(&new, None, BookingStatus::Cancelled);
        assert!(pick_duplicate(&new, vec![cancelled]).is_none());
    }
}
