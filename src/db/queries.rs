use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::errors::AppResult;
use crate::models::{
    Booking, BookingStatus, CalendarPolicy, CancelledBy, Court, DiscountType, Holiday,
    OpeningHours, Participant, ParticipantStatus, PaymentLog, PaymentLogStatus, PaymentStatus,
    PaymentType, Promotion, Refund, RefundStatus, DATE_FORMAT, TIMESTAMP_FORMAT, TIME_FORMAT,
};

// ── Column helpers ──

fn conversion_err(idx: usize, err: chrono::ParseError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_date(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_err(idx, e))
}

fn get_opt_date(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn get_time(row: &Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(|e| conversion_err(idx, e))
}

fn get_ts(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(|e| conversion_err(idx, e))
}

fn get_opt_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

pub fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub fn fmt_time(t: NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

pub fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> AppResult<Vec<T>> {
    let mut out = vec![];
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// ── Courts ──

const COURT_COLUMNS: &str = "id, name, capacity, price, is_active";

fn parse_court_row(row: &Row) -> rusqlite::Result<Court> {
    Ok(Court {
        id: row.get(0)?,
        name: row.get(1)?,
        capacity: row.get(2)?,
        price: row.get(3)?,
        is_active: row.get::<_, i32>(4)? != 0,
    })
}

pub fn insert_court(conn: &Connection, court: &Court) -> AppResult<()> {
    conn.execute(
        "INSERT INTO courts (id, name, capacity, price, is_active) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![court.id, court.name, court.capacity, court.price, court.is_active as i32],
    )?;
    Ok(())
}

pub fn get_court(conn: &Connection, id: &str) -> AppResult<Option<Court>> {
    let sql = format!("SELECT {COURT_COLUMNS} FROM courts WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], parse_court_row).optional()?)
}

pub fn list_courts(conn: &Connection) -> AppResult<Vec<Court>> {
    let sql = format!("SELECT {COURT_COLUMNS} FROM courts ORDER BY name ASC, id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], parse_court_row)?;
    collect(rows)
}

/// Active courts of one capacity class, in allocation order (name, then id).
pub fn list_active_courts(conn: &Connection, capacity: i64) -> AppResult<Vec<Court>> {
    let sql = format!(
        "SELECT {COURT_COLUMNS} FROM courts WHERE is_active = 1 AND capacity = ?1 ORDER BY name ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![capacity], parse_court_row)?;
    collect(rows)
}

pub fn set_court_active(conn: &Connection, id: &str, is_active: bool) -> AppResult<bool> {
    let count = conn.execute(
        "UPDATE courts SET is_active = ?1 WHERE id = ?2",
        params![is_active as i32, id],
    )?;
    Ok(count > 0)
}

// ── Calendar ──

pub fn get_opening_hours(conn: &Connection) -> AppResult<Vec<OpeningHours>> {
    let mut stmt = conn.prepare(
        "SELECT weekday, open_time, close_time, is_closed FROM opening_hours ORDER BY weekday ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(OpeningHours {
            weekday: row.get(0)?,
            open_time: get_time(row, 1)?,
            close_time: get_time(row, 2)?,
            is_closed: row.get::<_, i32>(3)? != 0,
        })
    })?;
    collect(rows)
}

/// Upserts keep exactly one row per weekday.
pub fn set_opening_hours(conn: &Connection, hours: &OpeningHours) -> AppResult<()> {
    conn.execute(
        "INSERT INTO opening_hours (weekday, open_time, close_time, is_closed)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(weekday) DO UPDATE SET
           open_time = excluded.open_time,
           close_time = excluded.close_time,
           is_closed = excluded.is_closed",
        params![
            hours.weekday,
            fmt_time(hours.open_time),
            fmt_time(hours.close_time),
            hours.is_closed as i32,
        ],
    )?;
    Ok(())
}

pub fn insert_holiday(conn: &Connection, holiday: &Holiday) -> AppResult<()> {
    conn.execute(
        "INSERT INTO holidays (id, date, end_date, reason) VALUES (?1, ?2, ?3, ?4)",
        params![
            holiday.id,
            fmt_date(holiday.date),
            holiday.end_date.map(fmt_date),
            holiday.reason,
        ],
    )?;
    Ok(())
}

pub fn list_holidays(conn: &Connection) -> AppResult<Vec<Holiday>> {
    let mut stmt =
        conn.prepare("SELECT id, date, end_date, reason FROM holidays ORDER BY date ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(Holiday {
            id: row.get(0)?,
            date: get_date(row, 1)?,
            end_date: get_opt_date(row, 2)?,
            reason: row.get(3)?,
        })
    })?;
    collect(rows)
}

pub fn load_calendar(conn: &Connection) -> AppResult<CalendarPolicy> {
    Ok(CalendarPolicy::new(get_opening_hours(conn)?, list_holidays(conn)?))
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, court_id, user_id, date, start_time, end_time, players_count, \
     status, payment_status, total_amount, amount_paid, promotion_id, promotion_discount, \
     original_amount, created_by_admin, created_at, updated_at";

fn parse_booking_row(row: &Row) -> rusqlite::Result<Booking> {
    let status: String = row.get(7)?;
    let payment_status: String = row.get(8)?;
    Ok(Booking {
        id: row.get(0)?,
        court_id: row.get(1)?,
        organizer_user_id: row.get(2)?,
        date: get_date(row, 3)?,
        start_time: get_time(row, 4)?,
        end_time: get_time(row, 5)?,
        players_count: row.get(6)?,
        status: BookingStatus::parse(&status),
        payment_status: PaymentStatus::parse(&payment_status),
        total_amount: row.get(9)?,
        amount_paid: row.get(10)?,
        promotion_id: row.get(11)?,
        promotion_discount: row.get(12)?,
        original_amount: row.get(13)?,
        created_by_admin: row.get::<_, i32>(14)? != 0,
        created_at: get_ts(row, 15)?,
        updated_at: get_ts(row, 16)?,
    })
}

pub fn insert_booking(conn: &Connection, booking: &Booking) -> AppResult<()> {
    conn.execute(
        "INSERT INTO bookings (id, court_id, user_id, date, start_time, end_time, players_count,
           status, payment_status, total_amount, amount_paid, promotion_id, promotion_discount,
           original_amount, created_by_admin, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            booking.id,
            booking.court_id,
            booking.organizer_user_id,
            fmt_date(booking.date),
            fmt_time(booking.start_time),
            fmt_time(booking.end_time),
            booking.players_count,
            booking.status.as_str(),
            booking.payment_status.as_str(),
            booking.total_amount,
            booking.amount_paid,
            booking.promotion_id,
            booking.promotion_discount,
            booking.original_amount,
            booking.created_by_admin as i32,
            fmt_ts(booking.created_at),
            fmt_ts(booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> AppResult<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], parse_booking_row).optional()?)
}

pub fn confirmed_bookings_on(conn: &Connection, date: NaiveDate) -> AppResult<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE date = ?1 AND status = 'confirmed' ORDER BY start_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fmt_date(date)], parse_booking_row)?;
    collect(rows)
}

pub fn count_upcoming_for_user(conn: &Connection, user_id: &str, now: NaiveDateTime) -> AppResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE user_id = ?1 AND status = 'confirmed'
           AND (date > ?2 OR (date = ?2 AND start_time >= ?3))",
        params![user_id, fmt_date(now.date()), fmt_time(now.time())],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Bookings the user organizes or was invited to (and has not declined).
pub fn list_bookings_for_user(
    conn: &Connection,
    user_id: &str,
    from: NaiveDate,
) -> AppResult<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE date >= ?2 AND (user_id = ?1 OR id IN (
             SELECT booking_id FROM booking_participants WHERE user_id = ?1 AND status <> 'declined'
         ))
         ORDER BY date ASC, start_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, fmt_date(from)], parse_booking_row)?;
    collect(rows)
}

pub fn list_all_bookings(
    conn: &Connection,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> AppResult<Vec<Booking>> {
    let bookings = match status_filter {
        Some(status) => {
            let sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1 ORDER BY date DESC, start_time DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![status.as_str(), limit], parse_booking_row)?;
            collect(rows)?
        }
        None => {
            let sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY date DESC, start_time DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit], parse_booking_row)?;
            collect(rows)?
        }
    };
    Ok(bookings)
}

/// Priced, non-admin bookings still waiting for money. Expiry age is checked by the caller.
pub fn unpaid_bookings(conn: &Connection, user_id: Option<&str>) -> AppResult<Vec<Booking>> {
    let base = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status = 'confirmed' AND created_by_admin = 0
           AND payment_status IN ('pending_payment', 'payment_failed')"
    );
    let bookings = match user_id {
        Some(user) => {
            let sql = format!("{base} AND user_id = ?1 ORDER BY created_at ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![user], parse_booking_row)?;
            collect(rows)?
        }
        None => {
            let sql = format!("{base} ORDER BY created_at ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], parse_booking_row)?;
            collect(rows)?
        }
    };
    Ok(bookings)
}

pub fn update_booking_payment(
    conn: &Connection,
    id: &str,
    amount_paid: i64,
    payment_status: PaymentStatus,
    now: NaiveDateTime,
) -> AppResult<()> {
    conn.execute(
        "UPDATE bookings SET amount_paid = ?1, payment_status = ?2, updated_at = ?3 WHERE id = ?4",
        params![amount_paid, payment_status.as_str(), fmt_ts(now), id],
    )?;
    Ok(())
}

/// Flips a confirmed booking to cancelled. Returns false if it was not confirmed.
pub fn mark_booking_cancelled(conn: &Connection, id: &str, now: NaiveDateTime) -> AppResult<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'cancelled', payment_status = 'cancelled', updated_at = ?1
         WHERE id = ?2 AND status = 'confirmed'",
        params![fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn delete_booking(conn: &Connection, id: &str) -> AppResult<bool> {
    let count = conn.execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Participants ──

const PARTICIPANT_COLUMNS: &str = "id, booking_id, user_id, status, created_at, updated_at";

fn parse_participant_row(row: &Row) -> rusqlite::Result<Participant> {
    let status: String = row.get(3)?;
    Ok(Participant {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        invited_user_id: row.get(2)?,
        status: ParticipantStatus::parse(&status),
        created_at: get_ts(row, 4)?,
        updated_at: get_ts(row, 5)?,
    })
}

pub fn insert_participant(conn: &Connection, participant: &Participant) -> AppResult<()> {
    conn.execute(
        "INSERT INTO booking_participants (id, booking_id, user_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            participant.id,
            participant.booking_id,
            participant.invited_user_id,
            participant.status.as_str(),
            fmt_ts(participant.created_at),
            fmt_ts(participant.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_participant(conn: &Connection, id: &str) -> AppResult<Option<Participant>> {
    let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM booking_participants WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], parse_participant_row).optional()?)
}

pub fn find_participant(
    conn: &Connection,
    booking_id: &str,
    user_id: &str,
) -> AppResult<Option<Participant>> {
    let sql = format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM booking_participants WHERE booking_id = ?1 AND user_id = ?2"
    );
    Ok(conn
        .query_row(&sql, params![booking_id, user_id], parse_participant_row)
        .optional()?)
}

pub fn list_participants(conn: &Connection, booking_id: &str) -> AppResult<Vec<Participant>> {
    let sql = format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM booking_participants WHERE booking_id = ?1 ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![booking_id], parse_participant_row)?;
    collect(rows)
}

/// Conditional on the expected current status so concurrent answers cannot both win.
pub fn update_participant_status(
    conn: &Connection,
    id: &str,
    from: ParticipantStatus,
    to: ParticipantStatus,
    now: NaiveDateTime,
) -> AppResult<bool> {
    let count = conn.execute(
        "UPDATE booking_participants SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![to.as_str(), fmt_ts(now), id, from.as_str()],
    )?;
    Ok(count > 0)
}

pub fn delete_participant(conn: &Connection, id: &str) -> AppResult<bool> {
    let count = conn.execute("DELETE FROM booking_participants WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Promotions ──

const PROMOTION_COLUMNS: &str =
    "id, name, label, court_ids, discount_type, discount_value, start_date, end_date, is_active";

fn parse_promotion_row(row: &Row) -> rusqlite::Result<Promotion> {
    let court_ids_json: String = row.get(3)?;
    let court_ids: Vec<String> = serde_json::from_str(&court_ids_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let discount_type: String = row.get(4)?;
    Ok(Promotion {
        id: row.get(0)?,
        name: row.get(1)?,
        label: row.get(2)?,
        court_ids,
        discount_type: DiscountType::parse(&discount_type),
        discount_value: row.get(5)?,
        start_date: get_ts(row, 6)?,
        end_date: get_ts(row, 7)?,
        is_active: row.get::<_, i32>(8)? != 0,
    })
}

pub fn upsert_promotion(conn: &Connection, promo: &Promotion) -> AppResult<()> {
    let court_ids = serde_json::to_string(&promo.court_ids)?;
    conn.execute(
        "INSERT INTO promotions (id, name, label, court_ids, discount_type, discount_value, start_date, end_date, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           label = excluded.label,
           court_ids = excluded.court_ids,
           discount_type = excluded.discount_type,
           discount_value = excluded.discount_value,
           start_date = excluded.start_date,
           end_date = excluded.end_date,
           is_active = excluded.is_active",
        params![
            promo.id,
            promo.name,
            promo.label,
            court_ids,
            promo.discount_type.as_str(),
            promo.discount_value,
            fmt_ts(promo.start_date),
            fmt_ts(promo.end_date),
            promo.is_active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_promotion(conn: &Connection, id: &str) -> AppResult<Option<Promotion>> {
    let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], parse_promotion_row).optional()?)
}

pub fn list_active_promotions(conn: &Connection) -> AppResult<Vec<Promotion>> {
    let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions WHERE is_active = 1 ORDER BY id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], parse_promotion_row)?;
    collect(rows)
}

pub fn delete_promotion(conn: &Connection, id: &str) -> AppResult<bool> {
    let count = conn.execute("DELETE FROM promotions WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Payment logs ──

const PAYMENT_LOG_COLUMNS: &str = "id, booking_id, user_id, amount, payment_type, status, \
     gateway_ref, error_message, created_at, updated_at";

fn parse_payment_log_row(row: &Row) -> rusqlite::Result<PaymentLog> {
    let payment_type: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(PaymentLog {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        user_id: row.get(2)?,
        amount: row.get(3)?,
        payment_type: PaymentType::parse(&payment_type),
        status: PaymentLogStatus::parse(&status),
        gateway_ref: row.get(6)?,
        error_message: row.get(7)?,
        created_at: get_ts(row, 8)?,
        updated_at: get_ts(row, 9)?,
    })
}

pub fn insert_payment_log(conn: &Connection, log: &PaymentLog) -> AppResult<()> {
    conn.execute(
        "INSERT INTO payment_logs (id, booking_id, user_id, amount, payment_type, status, gateway_ref, error_message, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            log.id,
            log.booking_id,
            log.user_id,
            log.amount,
            log.payment_type.as_str(),
            log.status.as_str(),
            log.gateway_ref,
            log.error_message,
            fmt_ts(log.created_at),
            fmt_ts(log.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_payment_log(conn: &Connection, id: &str) -> AppResult<Option<PaymentLog>> {
    let sql = format!("SELECT {PAYMENT_LOG_COLUMNS} FROM payment_logs WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], parse_payment_log_row).optional()?)
}

pub fn get_payment_log_by_ref(conn: &Connection, reference: &str) -> AppResult<Option<PaymentLog>> {
    let sql = format!("SELECT {PAYMENT_LOG_COLUMNS} FROM payment_logs WHERE gateway_ref = ?1");
    Ok(conn
        .query_row(&sql, params![reference], parse_payment_log_row)
        .optional()?)
}

pub fn list_payment_logs(conn: &Connection, booking_id: &str) -> AppResult<Vec<PaymentLog>> {
    let sql = format!(
        "SELECT {PAYMENT_LOG_COLUMNS} FROM payment_logs WHERE booking_id = ?1 ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![booking_id], parse_payment_log_row)?;
    collect(rows)
}

pub fn set_payment_log_ref(
    conn: &Connection,
    id: &str,
    reference: &str,
    now: NaiveDateTime,
) -> AppResult<()> {
    conn.execute(
        "UPDATE payment_logs SET gateway_ref = ?1, updated_at = ?2 WHERE id = ?3",
        params![reference, fmt_ts(now), id],
    )?;
    Ok(())
}

pub fn update_payment_log_status(
    conn: &Connection,
    id: &str,
    status: PaymentLogStatus,
    amount: i64,
    error_message: Option<&str>,
    now: NaiveDateTime,
) -> AppResult<()> {
    conn.execute(
        "UPDATE payment_logs SET status = ?1, amount = ?2, error_message = ?3, updated_at = ?4 WHERE id = ?5",
        params![status.as_str(), amount, error_message, fmt_ts(now), id],
    )?;
    Ok(())
}

// ── Refunds ──

const REFUND_COLUMNS: &str = "id, booking_id, user_id, amount, status, cancelled_by, cancelled_at, \
     reviewed_by, reviewed_at, rejection_reason, gateway_ref";

fn parse_refund_row(row: &Row) -> rusqlite::Result<Refund> {
    let status: String = row.get(4)?;
    let cancelled_by: String = row.get(5)?;
    Ok(Refund {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        user_id: row.get(2)?,
        amount: row.get(3)?,
        status: RefundStatus::parse(&status),
        cancelled_by: CancelledBy::parse(&cancelled_by),
        cancelled_at: get_ts(row, 6)?,
        reviewed_by: row.get(7)?,
        reviewed_at: get_opt_ts(row, 8)?,
        rejection_reason: row.get(9)?,
        gateway_ref: row.get(10)?,
    })
}

pub fn insert_refund(conn: &Connection, refund: &Refund) -> AppResult<()> {
    conn.execute(
        "INSERT INTO refunds (id, booking_id, user_id, amount, status, cancelled_by, cancelled_at,
           reviewed_by, reviewed_at, rejection_reason, gateway_ref)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            refund.id,
            refund.booking_id,
            refund.user_id,
            refund.amount,
            refund.status.as_str(),
            refund.cancelled_by.as_str(),
            fmt_ts(refund.cancelled_at),
            refund.reviewed_by,
            refund.reviewed_at.map(fmt_ts),
            refund.rejection_reason,
            refund.gateway_ref,
        ],
    )?;
    Ok(())
}

pub fn get_refund(conn: &Connection, id: &str) -> AppResult<Option<Refund>> {
    let sql = format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], parse_refund_row).optional()?)
}

pub fn get_refund_for_booking(conn: &Connection, booking_id: &str) -> AppResult<Option<Refund>> {
    let sql = format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE booking_id = ?1");
    Ok(conn
        .query_row(&sql, params![booking_id], parse_refund_row)
        .optional()?)
}

pub fn list_refunds(
    conn: &Connection,
    status_filter: Option<RefundStatus>,
    user_id: Option<&str>,
) -> AppResult<Vec<Refund>> {
    let sql = format!(
        "SELECT {REFUND_COLUMNS} FROM refunds
         WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR user_id = ?2)
         ORDER BY cancelled_at DESC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![status_filter.map(|s| s.as_str()), user_id],
        parse_refund_row,
    )?;
    collect(rows)
}

/// Moves a pending refund to its reviewed state. Returns false if it was no longer pending.
pub fn complete_refund_review(
    conn: &Connection,
    refund: &Refund,
) -> AppResult<bool> {
    let count = conn.execute(
        "UPDATE refunds SET status = ?1, reviewed_by = ?2, reviewed_at = ?3, rejection_reason = ?4, gateway_ref = ?5
         WHERE id = ?6 AND status = 'pending'",
        params![
            refund.status.as_str(),
            refund.reviewed_by,
            refund.reviewed_at.map(fmt_ts),
            refund.rejection_reason,
            refund.gateway_ref,
            refund.id,
        ],
    )?;
    Ok(count > 0)
}

/// Reserves a pending refund for approval. Only an unclaimed row can be rejected.
pub fn claim_refund(
    conn: &Connection,
    id: &str,
    reviewer: &str,
    now: NaiveDateTime,
) -> AppResult<bool> {
    let count = conn.execute(
        "UPDATE refunds SET reviewed_by = ?1, reviewed_at = ?2 WHERE id = ?3 AND status = 'pending'",
        params![reviewer, fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

/// Drops a claim, but only the one stamped by this reviewer at `claimed_at`.
pub fn release_refund_claim(
    conn: &Connection,
    id: &str,
    reviewer: &str,
    claimed_at: NaiveDateTime,
) -> AppResult<bool> {
    let count = conn.execute(
        "UPDATE refunds SET reviewed_by = NULL, reviewed_at = NULL
         WHERE id = ?1 AND status = 'pending' AND reviewed_by = ?2 AND reviewed_at = ?3",
        params![id, reviewer, fmt_ts(claimed_at)],
    )?;
    Ok(count > 0)
}

// ── Gateway events ──

/// Records a delivery key. Returns false when the key was already seen.
pub fn record_gateway_event(conn: &Connection, event_key: &str, now: NaiveDateTime) -> AppResult<bool> {
    let count = conn.execute(
        "INSERT OR IGNORE INTO gateway_events (event_key, received_at) VALUES (?1, ?2)",
        params![event_key, fmt_ts(now)],
    )?;
    Ok(count > 0)
}
