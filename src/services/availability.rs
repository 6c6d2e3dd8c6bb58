use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::BookingPolicy;
use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::{Booking, BookingStatus, CalendarPolicy, Court};

const MAX_CALENDAR_DAYS: i64 = 62;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Slot {
    #[serde(with = "crate::models::hhmm")]
    pub start: NaiveTime,
    #[serde(with = "crate::models::hhmm")]
    pub end: NaiveTime,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub open: bool,
    pub available_slots: usize,
}

/// Confirmed bookings per date, fetched at most once per request.
#[derive(Debug, Default)]
pub struct DayBookingsCache {
    entries: HashMap<NaiveDate, Vec<Booking>>,
}

impl DayBookingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&mut self, conn: &Connection, date: NaiveDate) -> AppResult<&[Booking]> {
        if !self.entries.contains_key(&date) {
            let bookings = queries::confirmed_bookings_on(conn, date)?;
            self.entries.insert(date, bookings);
        }
        Ok(self.entries.get(&date).map(Vec::as_slice).unwrap_or(&[]))
    }
}

fn minutes_of(t: NaiveTime) -> i64 {
    (t.hour() * 60 + t.minute()) as i64
}

fn time_of(minutes: i64) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt((minutes / 60) as u32, (minutes % 60) as u32, 0)
}

/// Fixed-duration `[start, end)` windows from `open`; a trailing partial window is dropped.
pub fn slot_windows(open: NaiveTime, close: NaiveTime, duration_minutes: i64) -> Vec<(NaiveTime, NaiveTime)> {
    let mut windows = vec![];
    if duration_minutes <= 0 {
        return windows;
    }
    let close_min = minutes_of(close);
    let mut start = minutes_of(open);
    while start + duration_minutes <= close_min {
        if let (Some(s), Some(e)) = (time_of(start), time_of(start + duration_minutes)) {
            windows.push((s, e));
        }
        start += duration_minutes;
    }
    windows
}

/// True when every court already has a confirmed booking overlapping the window.
/// An empty court list counts as fully booked.
pub fn all_courts_taken(
    courts: &[Court],
    bookings: &[Booking],
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> bool {
    courts.iter().all(|court| {
        bookings.iter().any(|b| {
            b.court_id == court.id && b.status == BookingStatus::Confirmed && b.overlaps(date, start, end)
        })
    })
}

/// Slots for one date given already-loaded inputs. `courts` must be the active
/// courts of the requested capacity class.
pub fn compute_slots(
    date: NaiveDate,
    duration_minutes: i64,
    calendar: &CalendarPolicy,
    courts: &[Court],
    bookings: &[Booking],
    now: NaiveDateTime,
) -> Vec<Slot> {
    let Some((open, close)) = calendar.open_window(date) else {
        return vec![];
    };

    slot_windows(open, close, duration_minutes)
        .into_iter()
        .map(|(start, end)| {
            let in_past = date.and_time(start) < now;
            let available = !in_past && !all_courts_taken(courts, bookings, date, start, end);
            Slot { start, end, available }
        })
        .collect()
}

pub fn validate_capacity(capacity: i64) -> AppResult<()> {
    if Court::is_valid_capacity(capacity) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "capacity must be one of 2 or 4, got {capacity}"
        )))
    }
}

pub fn available_slots(
    conn: &Connection,
    cache: &mut DayBookingsCache,
    date: NaiveDate,
    capacity: i64,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> AppResult<Vec<Slot>> {
    validate_capacity(capacity)?;
    let calendar = queries::load_calendar(conn)?;
    if calendar.open_window(date).is_none() {
        return Ok(vec![]);
    }
    let courts = queries::list_active_courts(conn, capacity)?;
    let bookings = cache.get_or_load(conn, date)?;
    Ok(compute_slots(
        date,
        policy.slot_duration_minutes,
        &calendar,
        &courts,
        bookings,
        now,
    ))
}

/// Per-day summary over `[from, to]` inclusive.
pub fn availability_calendar(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
    capacity: i64,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> AppResult<Vec<DayAvailability>> {
    validate_capacity(capacity)?;
    if to < from {
        return Err(AppError::Validation("`to` must not be before `from`".to_string()));
    }
    if (to - from).num_days() >= MAX_CALENDAR_DAYS {
        return Err(AppError::Validation(format!(
            "calendar range is limited to {MAX_CALENDAR_DAYS} days"
        )));
    }

    let calendar = queries::load_calendar(conn)?;
    let courts = queries::list_active_courts(conn, capacity)?;
    let mut cache = DayBookingsCache::new();
    let mut days = vec![];

    let mut date = from;
    while date <= to {
        let open = calendar.open_window(date).is_some();
        let available_slots = if open {
            let bookings = cache.get_or_load(conn, date)?;
            compute_slots(date, policy.slot_duration_minutes, &calendar, &courts, bookings, now)
                .iter()
                .filter(|s| s.available)
                .count()
        } else {
            0
        };
        days.push(DayAvailability {
            date,
            open,
            available_slots,
        });
        date += Duration::days(1);
    }

    Ok(days)
}
