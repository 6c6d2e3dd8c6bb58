use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub court_id: String,
    pub organizer_user_id: String,
    pub date: NaiveDate,
    #[serde(with = "super::hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "super::hhmm")]
    pub end_time: NaiveTime,
    pub players_count: i64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: i64,
    pub amount_paid: i64,
    pub promotion_id: Option<String>,
    pub promotion_discount: Option<i64>,
    pub original_amount: Option<i64>,
    pub created_by_admin: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cancelled" => BookingStatus::Cancelled,
            _ => BookingStatus::Confirmed,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    PendingPayment,
    PartialPaymentCompleted,
    PaymentCompleted,
    PaymentFailed,
    Confirmed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::PendingPayment => "pending_payment",
            PaymentStatus::PartialPaymentCompleted => "partial_payment_completed",
            PaymentStatus::PaymentCompleted => "payment_completed",
            PaymentStatus::PaymentFailed => "payment_failed",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "partial_payment_completed" => PaymentStatus::PartialPaymentCompleted,
            "payment_completed" => PaymentStatus::PaymentCompleted,
            "payment_failed" => PaymentStatus::PaymentFailed,
            "confirmed" => PaymentStatus::Confirmed,
            "cancelled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::PendingPayment,
        }
    }

    /// Status implied by what has been collected so far on a priced booking.
    pub fn from_amounts(amount_paid: i64, total_amount: i64) -> Self {
        if amount_paid >= total_amount {
            PaymentStatus::PaymentCompleted
        } else if amount_paid > 0 {
            PaymentStatus::PartialPaymentCompleted
        } else {
            PaymentStatus::PendingPayment
        }
    }

    /// Initial status for a freshly created booking.
    pub fn initial(total_amount: i64) -> Self {
        if total_amount > 0 {
            PaymentStatus::PendingPayment
        } else {
            PaymentStatus::Confirmed
        }
    }
}

impl Booking {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }

    pub fn balance_due(&self) -> i64 {
        (self.total_amount - self.amount_paid).max(0)
    }

    /// Half-open `[start, end)` overlap on the same date.
    pub fn overlaps(&self, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> bool {
        self.date == date && start < self.end_time && end > self.start_time
    }

    /// Unpaid, non-admin bookings older than the payment timeout.
    pub fn is_payment_expired(&self, now: NaiveDateTime, timeout_hours: i64) -> bool {
        !self.created_by_admin
            && self.status == BookingStatus::Confirmed
            && matches!(
                self.payment_status,
                PaymentStatus::PendingPayment | PaymentStatus::PaymentFailed
            )
            && now - self.created_at > Duration::hours(timeout_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: &str, end: &str) -> Booking {
        let ts = NaiveDateTime::parse_from_str("2025-06-01 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        Booking {
            id: "b1".to_string(),
            court_id: "c1".to_string(),
            organizer_user_id: "u1".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
            end_time: NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
            players_count: 4,
            status: BookingStatus::Confirmed,
            payment_status: PaymentStatus::PendingPayment,
            total_amount: 3000,
            amount_paid: 0,
            promotion_id: None,
            promotion_discount: None,
            original_amount: None,
            created_by_admin: false,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[test]
    fn test_overlap_is_half_open() {
        let b = booking("10:00", "10:45");
        let day = b.date;
        assert!(b.overlaps(day, t("10:30"), t("11:15")));
        assert!(b.overlaps(day, t("09:30"), t("10:15")));
        assert!(!b.overlaps(day, t("10:45"), t("11:30")));
        assert!(!b.overlaps(day, t("09:15"), t("10:00")));
        assert!(!b.overlaps(day.succ_opt().unwrap(), t("10:00"), t("10:45")));
    }

    #[test]
    fn test_payment_status_thresholds() {
        assert_eq!(PaymentStatus::from_amounts(0, 3000), PaymentStatus::PendingPayment);
        assert_eq!(
            PaymentStatus::from_amounts(1500, 3000),
            PaymentStatus::PartialPaymentCompleted
        );
        assert_eq!(PaymentStatus::from_amounts(3000, 3000), PaymentStatus::PaymentCompleted);
        assert_eq!(PaymentStatus::initial(0), PaymentStatus::Confirmed);
        assert_eq!(PaymentStatus::initial(10), PaymentStatus::PendingPayment);
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            PaymentStatus::PendingPayment,
            PaymentStatus::PartialPaymentCompleted,
            PaymentStatus::PaymentCompleted,
            PaymentStatus::PaymentFailed,
            PaymentStatus::Confirmed,
            PaymentStatus::Cancelled,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_payment_expiry() {
        let mut b = booking("10:00", "11:00");
        let now = b.created_at + Duration::hours(3);
        assert!(b.is_payment_expired(now, 2));
        assert!(!b.is_payment_expired(now, 4));

        b.created_by_admin = true;
        assert!(!b.is_payment_expired(now, 2));

        b.created_by_admin = false;
        b.payment_status = PaymentStatus::PartialPaymentCompleted;
        assert!(!b.is_payment_expired(now, 2));

        b.payment_status = PaymentStatus::PaymentFailed;
        assert!(b.is_payment_expired(now, 2));
    }
}
