use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppResult;
use crate::models::{Booking, BookingStatus, Court};

/// Active courts of the requested capacity with no confirmed booking overlapping
/// `[start, end)`, ordered by name then id. The first entry is the default pick.
pub fn free_courts(
    courts: &[Court],
    bookings: &[Booking],
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    capacity: i64,
) -> Vec<Court> {
    let mut free: Vec<Court> = courts
        .iter()
        .filter(|c| c.is_active && c.capacity == capacity)
        .filter(|c| {
            !bookings.iter().any(|b| {
                b.court_id == c.id && b.status == BookingStatus::Confirmed && b.overlaps(date, start, end)
            })
        })
        .cloned()
        .collect();
    free.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    free
}

pub fn find_free_courts(
    conn: &Connection,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    capacity: i64,
) -> AppResult<Vec<Court>> {
    let courts = queries::list_active_courts(conn, capacity)?;
    let bookings = queries::confirmed_bookings_on(conn, date)?;
    Ok(free_courts(&courts, &bookings, date, start, end, capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::*;
    use proptest::prelude::*;

    #[test]
    fn test_overlapping_court_excluded() {
        let courts = vec![court("c1", "Alpha", 4, 4000), court("c2", "Beta", 4, 4000)];
        let bookings = vec![booking("b1", "c1", "2030-03-04", "10:00", "11:00")];
        let free = free_courts(&courts, &bookings, d("2030-03-04"), t("10:30"), t("11:30"), 4);
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].id, "c2");
    }

    #[test]
    fn test_adjacent_booking_does_not_block() {
        let courts = vec![court("c1", "Alpha", 4, 4000)];
        let bookings = vec![booking("b1", "c1", "2030-03-04", "10:00", "11:00")];
        let free = free_courts(&courts, &bookings, d("2030-03-04"), t("11:00"), t("12:00"), 4);
        assert_eq!(free.len(), 1);
    }

    #[test]
    fn test_capacity_and_active_filters() {
        let mut inactive = court("c3", "Gamma", 4, 4000);
        inactive.is_active = false;
        let courts = vec![court("c1", "Alpha", 2, 2000), court("c2", "Beta", 4, 4000), inactive];
        let free = free_courts(&courts, &[], d("2030-03-04"), t("10:00"), t("11:00"), 4);
        assert_eq!(free.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["c2"]);
    }

    #[test]
    fn test_ordered_by_name_then_id() {
        let courts = vec![
            court("z", "Center", 4, 4000),
            court("b", "Annex", 4, 4000),
            court("a", "Center", 4, 4000),
        ];
        let free = free_courts(&courts, &[], d("2030-03-04"), t("10:00"), t("11:00"), 4);
        assert_eq!(free.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["b", "a", "z"]);
    }

    #[test]
    fn test_empty_result_is_not_an_error() {
        let conn = setup_db();
        let free = find_free_courts(&conn, d("2030-03-04"), t("10:00"), t("11:00"), 2).unwrap();
        assert!(free.is_empty());
    }

    #[test]
    fn test_find_free_courts_reads_storage() {
        let conn = setup_db();
        add_court(&conn, "c1", "Alpha", 4, 4000);
        add_court(&conn, "c2", "Beta", 4, 4000);
        add_booking(&conn, &booking("b1", "c1", "2030-03-04", "10:00", "11:00"));
        let free = find_free_courts(&conn, d("2030-03-04"), t("10:00"), t("11:00"), 4).unwrap();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].id, "c2");
    }

    proptest! {
        #[test]
        fn prop_never_returns_overlapping_court(
            booked_start in 0i64..20,
            booked_len in 1i64..6,
            req_start in 0i64..20,
            req_len in 1i64..6,
        ) {
            let to_time = |q: i64| NaiveTime::from_hms_opt(8 + (q / 4) as u32, ((q % 4) * 15) as u32, 0).unwrap();
            let (bs, be) = (to_time(booked_start), to_time(booked_start + booked_len));
            let (rs, re) = (to_time(req_start), to_time(req_start + req_len));

            let mut b = booking("b1", "c1", "2030-03-04", "08:00", "09:00");
            b.start_time = bs;
            b.end_time = be;

            let courts = vec![court("c1", "Alpha", 4, 4000)];
            let free = free_courts(&courts, &[b], d("2030-03-04"), rs, re, 4);
            // Half-open intervals in quarter hours.
            let clash = req_start < booked_start + booked_len && req_start + req_len > booked_start;
            if clash {
                prop_assert!(free.is_empty());
            } else {
                prop_assert_eq!(free.len(), 1);
            }
        }
    }
}
