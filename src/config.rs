use std::env;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime, Utc};

#[derive(Clone, Debug, PartialEq)]
pub enum ExpiryMode {
    /// Stale bookings are cancelled when someone reads them.
    Lazy,
    /// A background task also expires stale bookings on an interval.
    Sweep,
}

/// Knobs the booking services need. Built from [`AppConfig`].
#[derive(Clone, Debug)]
pub struct BookingPolicy {
    pub slot_duration_minutes: i64,
    pub max_bookings_per_user: i64,
    pub payment_timeout_hours: i64,
    pub cancellation_hours: i64,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            slot_duration_minutes: 60,
            max_bookings_per_user: 3,
            payment_timeout_hours: 2,
            cancellation_hours: 24,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub slot_duration_minutes: i64,
    pub max_bookings_per_user: i64,
    pub payment_timeout_hours: i64,
    pub cancellation_hours: i64,
    pub utc_offset_minutes: i64,
    pub expiry_mode: ExpiryMode,
    pub expiry_sweep_secs: u64,
    pub gateway_url: String,
    pub gateway_api_key: String,
    pub gateway_webhook_secret: String,
    pub notify_webhook_url: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = BookingPolicy::default();
        Self {
            port: parse_or("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "courtbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            slot_duration_minutes: parse_or("SLOT_DURATION_MINUTES", defaults.slot_duration_minutes),
            max_bookings_per_user: parse_or("MAX_BOOKINGS_PER_USER", defaults.max_bookings_per_user),
            payment_timeout_hours: parse_or("PAYMENT_TIMEOUT_HOURS", defaults.payment_timeout_hours),
            cancellation_hours: parse_or("CANCELLATION_HOURS", defaults.cancellation_hours),
            utc_offset_minutes: parse_or("UTC_OFFSET_MINUTES", 0),
            expiry_mode: match env::var("EXPIRY_MODE").as_deref() {
                Ok("sweep") => ExpiryMode::Sweep,
                _ => ExpiryMode::Lazy,
            },
            expiry_sweep_secs: parse_or("EXPIRY_SWEEP_SECS", 300),
            gateway_url: env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:8089".to_string()),
            gateway_api_key: env::var("GATEWAY_API_KEY").unwrap_or_default(),
            gateway_webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET").unwrap_or_default(),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").unwrap_or_default(),
        }
    }

    pub fn policy(&self) -> BookingPolicy {
        BookingPolicy {
            slot_duration_minutes: self.slot_duration_minutes,
            max_bookings_per_user: self.max_bookings_per_user,
            payment_timeout_hours: self.payment_timeout_hours,
            cancellation_hours: self.cancellation_hours,
        }
    }

    /// Current wall-clock time at the venue.
    pub fn local_now(&self) -> NaiveDateTime {
        Utc::now().naive_utc() + Duration::minutes(self.utc_offset_minutes)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
