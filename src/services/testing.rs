//! Fixtures shared by the service unit tests.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::{self, queries};
use crate::models::{Booking, BookingStatus, Court, PaymentStatus};

pub fn setup_db() -> Connection {
    db::init_db(":memory:").unwrap()
}

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn t(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap()
}

pub fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

pub fn court(id: &str, name: &str, capacity: i64, price: i64) -> Court {
    Court {
        id: id.to_string(),
        name: name.to_string(),
        capacity,
        price,
        is_active: true,
    }
}

pub fn add_court(conn: &Connection, id: &str, name: &str, capacity: i64, price: i64) -> Court {
    let c = court(id, name, capacity, price);
    queries::insert_court(conn, &c).unwrap();
    c
}

pub fn booking(id: &str, court_id: &str, date: &str, start: &str, end: &str) -> Booking {
    let created = dt("2025-06-01 08:00");
    Booking {
        id: id.to_string(),
        court_id: court_id.to_string(),
        organizer_user_id: "organizer".to_string(),
        date: d(date),
        start_time: t(start),
        end_time: t(end),
        players_count: 4,
        status: BookingStatus::Confirmed,
        payment_status: PaymentStatus::PendingPayment,
        total_amount: 3000,
        amount_paid: 0,
        promotion_id: None,
        promotion_discount: None,
        original_amount: None,
        created_by_admin: false,
        created_at: created,
        updated_at: created,
    }
}

pub fn add_booking(conn: &Connection, b: &Booking) {
    queries::insert_booking(conn, b).unwrap();
}
