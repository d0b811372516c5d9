// src/services/conflict.rs

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{booking::BookedShift, slot::ShiftWindow},
};

/// Primeiro agendamento vivo (PENDING/ACTIVE) do entregador, na mesma data, cuja janela
/// sobrepõe a do candidato. `ignore` exclui um agendamento (ex.: o próprio na confirmação).
pub fn find_conflict<'a>(
    existing: &'a [BookedShift],
    date: NaiveDate,
    candidate: &ShiftWindow,
    ignore: Option<Uuid>,
) -> Option<&'a BookedShift> {
    existing.iter().find(|booked| {
        booked.status.is_live()
            && booked.slot_date == date
            && Some(booked.booking_id) != ignore
            && booked.window().overlaps(candidate)
    })
}

impl From<&BookedShift> for AppError {
    fn from(clash: &BookedShift) -> Self {
        AppError::TimeConflict {
            booking_id: clash.booking_id,
            shift_name: clash.shift_name.clone(),
            start: clash.shift_start,
            end: clash.shift_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::BookingStatus;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn booked(start: NaiveTime, end: NaiveTime, status: BookingStatus) -> BookedShift {
        BookedShift {
            booking_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            slot_date: date(),
            shift_name: "Manhã".into(),
            shift_start: start,
            shift_end: end,
            status,
        }
    }

    #[test]
    fn overlapping_shift_on_same_date_is_returned() {
        let first = booked(t(9, 0), t(13, 0), BookingStatus::Active);
        let existing = vec![first.clone()];
        let candidate = ShiftWindow::new(t(12, 30), t(16, 0)).unwrap();

        let clash = find_conflict(&existing, date(), &candidate, None).unwrap();
        assert_eq!(clash.booking_id, first.booking_id);

        match AppError::from(clash) {
            AppError::TimeConflict { booking_id, start, end, .. } => {
                assert_eq!(booking_id, first.booking_id);
                assert_eq!((start, end), (t(9, 0), t(13, 0)));
            }
            other => panic!("esperava TimeConflict, veio {other:?}"),
        }
    }

    #[test]
    fn boundary_touch_is_not_a_conflict() {
        let existing = vec![booked(t(8, 0), t(12, 0), BookingStatus::Active)];
        let candidate = ShiftWindow::new(t(12, 0), t(16, 0)).unwrap();
        assert!(find_conflict(&existing, date(), &candidate, None).is_none());
    }

    #[test]
    fn other_dates_and_dead_bookings_are_ignored() {
        let mut other_day = booked(t(9, 0), t(13, 0), BookingStatus::Active);
        other_day.slot_date = date().succ_opt().unwrap();
        let cancelled = booked(t(9, 0), t(13, 0), BookingStatus::Cancelled);
        let completed = booked(t(9, 0), t(13, 0), BookingStatus::Completed);
        let existing = vec![other_day, cancelled, completed];
        let candidate = ShiftWindow::new(t(10, 0), t(11, 0)).unwrap();
        assert!(find_conflict(&existing, date(), &candidate, None).is_none());
    }

    #[test]
    fn pending_waitlist_entries_still_block() {
        let pending = booked(t(9, 0), t(13, 0), BookingStatus::Pending);
        let existing = vec![pending.clone()];
        let candidate = ShiftWindow::new(t(10, 0), t(11, 0)).unwrap();
        assert!(find_conflict(&existing, date(), &candidate, None).is_some());
        assert!(find_conflict(&existing, date(), &candidate, Some(pending.booking_id)).is_none());
    }
}
