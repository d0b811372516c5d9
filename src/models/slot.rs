// src/models/slot.rs

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::AppError;

// --- 1. Turnos (modelo de horário) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    #[schema(example = "Manhã")]
    pub name: String,
    #[schema(value_type = String, example = "08:00:00")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, example = "12:00:00")]
    pub end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
}

// --- 2. Regiões ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    #[schema(example = "Zona Sul")]
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// --- 3. Janela do turno ---
/// Intervalo semiaberto `[start, end)` em minutos do dia. Se `end <= start` o turno
/// atravessa a meia-noite e termina no dia seguinte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShiftWindow {
    #[schema(value_type = String, example = "08:00:00")]
    pub start: NaiveTime,
    #[schema(value_type = String, example = "12:00:00")]
    pub end: NaiveTime,
}

const MINUTES_PER_DAY: u32 = 24 * 60;

impl ShiftWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, AppError> {
        if start == end {
            return Err(AppError::StructuralInvalid(format!(
                "turno com duração zero ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn minutes(&self) -> (u32, u32) {
        let start = self.start.num_seconds_from_midnight() / 60;
        let mut end = self.end.num_seconds_from_midnight() / 60;
        if end <= start {
            end += MINUTES_PER_DAY;
        }
        (start, end)
    }

    /// Sobreposição semiaberta: encostar na borda (12:00 e 12:00) não conflita.
    pub fn overlaps(&self, other: &ShiftWindow) -> bool {
        let (s1, e1) = self.minutes();
        let (s2, e2) = other.minutes();
        s1 < e2 && e1 > s2
    }

    pub fn starts_on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.start)
    }

    pub fn ends_on(&self, date: NaiveDate) -> NaiveDateTime {
        let (_, end) = self.minutes();
        date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(end))
    }
}

// --- 4. Agenda (linha crua) ---
/// Linha de `slots` com turno e região em LEFT JOIN. As relações podem faltar quando o
/// dado está corrompido; `into_slot` faz a validação estrutural.
#[derive(Debug, Clone, FromRow)]
pub struct SlotRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub slot_date: NaiveDate,
    pub shift_id: Option<Uuid>,
    pub region_id: Option<Uuid>,
    pub capacity: i32,
    pub occupied_count: i32,
    pub allow_reservation: bool,
    pub active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub shift_name: Option<String>,
    pub shift_start: Option<NaiveTime>,
    pub shift_end: Option<NaiveTime>,
    pub region_name: Option<String>,
}

impl SlotRecord {
    pub fn into_slot(self) -> Result<Slot, AppError> {
        let (shift_id, shift_name, start, end) =
            match (self.shift_id, self.shift_name, self.shift_start, self.shift_end) {
                (Some(id), Some(name), Some(start), Some(end)) => (id, name, start, end),
                _ => {
                    return Err(AppError::StructuralInvalid(format!(
                        "agenda {} sem turno",
                        self.id
                    )))
                }
            };
        let (region_id, region_name) = match (self.region_id, self.region_name) {
            (Some(id), Some(name)) => (id, name),
            _ => {
                return Err(AppError::StructuralInvalid(format!(
                    "agenda {} sem região",
                    self.id
                )))
            }
        };
        if self.capacity < 0 {
            return Err(AppError::StructuralInvalid(format!(
                "agenda {} com capacidade negativa",
                self.id
            )));
        }

        Ok(Slot {
            id: self.id,
            tenant_id: self.tenant_id,
            date: self.slot_date,
            shift_id,
            shift_name,
            window: ShiftWindow::new(start, end)?,
            region_id,
            region_name,
            capacity: self.capacity,
            occupied_count: self.occupied_count,
            allow_reservation: self.allow_reservation,
            active: self.active,
            created_by: self.created_by,
        })
    }
}

// --- 5. Agenda validada ---
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub date: NaiveDate,
    pub shift_id: Uuid,
    #[schema(example = "Manhã")]
    pub shift_name: String,
    pub window: ShiftWindow,
    pub region_id: Uuid,
    #[schema(example = "Zona Sul")]
    pub region_name: String,
    #[schema(example = 12)]
    pub capacity: i32,
    /// Contador desnormalizado; só para exibição.
    #[schema(example = 7)]
    pub occupied_count: i32,
    pub allow_reservation: bool,
    pub active: bool,
    pub created_by: Uuid,
}

// --- 6. Agenda anotada para o entregador ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    ShiftEnded,
    AlreadyBooked,
    TimeConflict,
    NotYetReleased,
    SameDayDisabled,
    SlotFull,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedSlot {
    #[serde(flatten)]
    pub slot: Slot,
    /// Ocupação real (agendamentos ativos contados), não o contador desnormalizado.
    pub occupancy: i64,
    pub already_booked: bool,
    pub bookable: bool,
    /// Lotada, mas aceita reserva (lista de espera).
    pub waitlist_open: bool,
    pub block_reason: Option<BlockReason>,
    /// Agendamento que conflita, quando `block_reason = TIME_CONFLICT`.
    pub conflicting_booking_id: Option<Uuid>,
}

// --- 7. Entradas administrativas ---
#[derive(Debug, Clone)]
pub struct NewShift {
    pub tenant_id: Uuid,
    pub name: String,
    pub window: ShiftWindow,
}

#[derive(Debug, Clone)]
pub struct NewRegion {
    pub tenant_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewSlot {
    pub tenant_id: Uuid,
    pub date: NaiveDate,
    pub shift_id: Uuid,
    pub region_id: Uuid,
    pub capacity: i32,
    pub allow_reservation: bool,
    pub created_by: Uuid,
}

/// Alteração administrativa; agendas nunca são apagadas, só desativadas.
#[derive(Debug, Clone, Default)]
pub struct SlotChanges {
    pub capacity: Option<i32>,
    pub active: Option<bool>,
    pub allow_reservation: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        let morning = ShiftWindow::new(t(8, 0), t(12, 0)).unwrap();
        let afternoon = ShiftWindow::new(t(12, 0), t(16, 0)).unwrap();
        assert!(!morning.overlaps(&afternoon));
        assert!(!afternoon.overlaps(&morning));
    }

    #[test]
    fn overnight_window_ends_next_day() {
        let night = ShiftWindow::new(t(22, 0), t(2, 0)).unwrap();
        assert_eq!(night.minutes(), (22 * 60, 26 * 60));
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(
            night.ends_on(date),
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap().and_time(t(2, 0))
        );
        assert!(night.overlaps(&ShiftWindow::new(t(23, 0), t(23, 30)).unwrap()));
    }

    #[test]
    fn record_without_region_is_structurally_invalid() {
        let record = SlotRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            slot_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            shift_id: Some(Uuid::new_v4()),
            region_id: None,
            capacity: 3,
            occupied_count: 0,
            allow_reservation: false,
            active: true,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            shift_name: Some("Manhã".into()),
            shift_start: Some(t(8, 0)),
            shift_end: Some(t(12, 0)),
            region_name: None,
        };
        assert!(matches!(record.into_slot(), Err(AppError::StructuralInvalid(_))));
    }
}
