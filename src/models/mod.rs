pub mod booking;
pub mod calendar;
pub mod court;
pub mod participant;
pub mod payment;
pub mod promotion;
pub mod refund;
pub mod user;

pub use booking::{Booking, BookingStatus, PaymentStatus};
pub use calendar::{CalendarPolicy, Holiday, OpeningHours};
pub use court::Court;
pub use participant::{Participant, ParticipantStatus};
pub use payment::{GatewayEvent, PaymentLog, PaymentLogStatus, PaymentType};
pub use promotion::{DiscountType, Promotion};
pub use refund::{CancelledBy, Refund, RefundStatus};
pub use user::{Actor, Role};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Serde adapter for `NaiveTime` as `HH:MM`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIME_FORMAT;

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format(TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}
