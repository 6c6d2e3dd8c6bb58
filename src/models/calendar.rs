use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Opening window for one weekday (0 = Sunday .. 6 = Saturday).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningHours {
    pub weekday: u32,
    #[serde(with = "super::hhmm")]
    pub open_time: NaiveTime,
    #[serde(with = "super::hhmm")]
    pub close_time: NaiveTime,
    pub is_closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holiday {
    pub id: String,
    pub date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub reason: String,
}

impl Holiday {
    /// Inclusive `[date, end_date ?? date]`.
    pub fn covers(&self, day: NaiveDate) -> bool {
        let last = self.end_date.unwrap_or(self.date);
        day >= self.date && day <= last
    }
}

/// Read-only view over the venue calendar.
#[derive(Debug, Clone, Default)]
pub struct CalendarPolicy {
    pub hours: Vec<OpeningHours>,
    pub holidays: Vec<Holiday>,
}

impl CalendarPolicy {
    pub fn new(hours: Vec<OpeningHours>, holidays: Vec<Holiday>) -> Self {
        Self { hours, holidays }
    }

    pub fn hours_for(&self, day: NaiveDate) -> Option<&OpeningHours> {
        let weekday = day.weekday().num_days_from_sunday();
        self.hours.iter().find(|h| h.weekday == weekday)
    }

    pub fn is_holiday(&self, day: NaiveDate) -> bool {
        self.holidays.iter().any(|h| h.covers(day))
    }

    /// The `[open, close)` window for a date, or `None` when closed.
    pub fn open_window(&self, day: NaiveDate) -> Option<(NaiveTime, NaiveTime)> {
        if self.is_holiday(day) {
            return None;
        }
        let hours = self.hours_for(day)?;
        if hours.is_closed || hours.close_time <= hours.open_time {
            return None;
        }
        Some((hours.open_time, hours.close_time))
    }

    pub fn is_open_at(&self, dt: &NaiveDateTime) -> bool {
        match self.open_window(dt.date()) {
            Some((open, close)) => dt.time() >= open && dt.time() < close,
            None => false,
        }
    }
}
