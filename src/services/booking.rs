use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::config::BookingPolicy;
use crate::db::queries;
use crate::errors::{AppError, AppResult, StateViolation};
use crate::models::{
    Actor, Booking, BookingStatus, CancelledBy, GatewayEvent, Participant, PaymentLog,
    PaymentLogStatus, PaymentStatus, Refund, RefundStatus, DATE_FORMAT, TIME_FORMAT,
};
use crate::services::expiry::{self, ExpiryScope};
use crate::services::notifications::{Notification, NotificationKind};
use crate::services::{allocation, availability, pricing, Outcome};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub date: String,
    pub start_time: String,
    pub players_count: i64,
    pub court_id: Option<String>,
    /// Admins may book on behalf of another user.
    pub organizer_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingDetail {
    #[serde(flatten)]
    pub booking: Booking,
    pub court_name: String,
    pub participants: Vec<Participant>,
    pub payments: Vec<PaymentLog>,
    pub refund: Option<Refund>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub booking: Booking,
    pub refund: Option<Refund>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDisposition {
    Applied,
    Duplicate,
    /// Money moved on a booking that no longer accepts it. Logged for manual follow-up.
    Reconciliation,
    /// Arrived after the charge had already settled; nothing was changed.
    Stale,
}

/// Marks a charge that settled on a closed booking and never counted towards `amount_paid`.
pub const RECONCILIATION_NOTE: &str = "charge settled after cancellation, needs reconciliation";

pub fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| AppError::Validation(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

pub fn parse_time(raw: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT)
        .map_err(|_| AppError::Validation(format!("invalid time '{raw}', expected HH:MM")))
}

/// Resolves a requested start into a bookable `[start, end)` on the slot grid.
pub fn resolve_slot(
    conn: &Connection,
    date: NaiveDate,
    start: NaiveTime,
    policy: &BookingPolicy,
) -> AppResult<(NaiveTime, NaiveTime)> {
    let calendar = queries::load_calendar(conn)?;
    let (open, close) = calendar
        .open_window(date)
        .ok_or_else(|| AppError::Validation(format!("the venue is closed on {date}")))?;

    availability::slot_windows(open, close, policy.slot_duration_minutes)
        .into_iter()
        .find(|(s, _)| *s == start)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "{} is not a bookable slot start",
                start.format(TIME_FORMAT)
            ))
        })
}

pub(crate) fn court_name(conn: &Connection, court_id: &str) -> AppResult<String> {
    Ok(queries::get_court(conn, court_id)?
        .map(|c| c.name)
        .unwrap_or_else(|| court_id.to_string()))
}

/// Organizer, admins and seat-holding invitees may read a booking.
pub(crate) fn can_view(conn: &Connection, actor: &Actor, booking: &Booking) -> AppResult<bool> {
    if actor.is_admin() || booking.organizer_user_id == actor.user_id {
        return Ok(true);
    }
    Ok(queries::find_participant(conn, &booking.id, &actor.user_id)?
        .map(|p| p.status.holds_seat())
        .unwrap_or(false))
}

/// `BookingCancelled` notices for the organizer and every seat-holding invitee.
pub(crate) fn cancellation_notices(
    conn: &Connection,
    booking: &Booking,
    reason: Option<&str>,
) -> AppResult<Vec<Notification>> {
    let court = court_name(conn, &booking.court_id)?;
    let mut recipients = vec![booking.organizer_user_id.clone()];
    recipients.extend(
        queries::list_participants(conn, &booking.id)?
            .into_iter()
            .filter(|p| p.status.holds_seat())
            .map(|p| p.invited_user_id),
    );

    Ok(recipients
        .iter()
        .map(|user| {
            let n = Notification::for_booking(NotificationKind::BookingCancelled, user, booking, &court);
            match reason {
                Some(r) => n.with_reason(r),
                None => n,
            }
        })
        .collect())
}

pub fn create_booking(
    conn: &mut Connection,
    actor: &Actor,
    req: &CreateBookingRequest,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> AppResult<Outcome<Booking>> {
    let date = parse_date(&req.date)?;
    let start = parse_time(&req.start_time)?;
    availability::validate_capacity(req.players_count)?;

    let organizer = match (&req.organizer_user_id, actor.is_admin()) {
        (Some(user), true) => user.trim().to_string(),
        (Some(user), false) if *user != actor.user_id => return Err(AppError::Forbidden),
        _ => actor.user_id.clone(),
    };
    if organizer.is_empty() {
        return Err(AppError::Validation("organizer_user_id must not be empty".to_string()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let (start, end) = resolve_slot(&tx, date, start, policy)?;
    if date.and_time(start) < now {
        return Err(AppError::Validation("cannot book a slot in the past".to_string()));
    }

    let mut notifications = vec![];
    if !actor.is_admin() {
        let expired = expiry::expire_in_tx(&tx, ExpiryScope::Organizer(&organizer), policy, now)?;
        notifications.extend(expired.notifications);

        let upcoming = queries::count_upcoming_for_user(&tx, &organizer, now)?;
        if upcoming >= policy.max_bookings_per_user {
            return Err(AppError::State(StateViolation::BookingLimitReached));
        }
    }

    let free = allocation::find_free_courts(&tx, date, start, end, req.players_count)?;
    let court = match &req.court_id {
        Some(court_id) => {
            let requested = queries::get_court(&tx, court_id)?
                .ok_or_else(|| AppError::NotFound(format!("court {court_id}")))?;
            if !requested.is_active {
                return Err(AppError::Validation("court is not active".to_string()));
            }
            if requested.capacity != req.players_count {
                return Err(AppError::Validation(format!(
                    "court {} holds {} players, not {}",
                    requested.name, requested.capacity, req.players_count
                )));
            }
            free.into_iter()
                .find(|c| c.id == requested.id)
                .ok_or_else(|| AppError::Conflict("court is not available for this slot".to_string()))?
        }
        None => free
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Conflict("no court available for this slot".to_string()))?,
    };

    let quote = pricing::quote_for(&tx, &court, date.and_time(start))?;
    let has_promotion = quote.promotion_id.is_some();

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        court_id: court.id.clone(),
        organizer_user_id: organizer,
        date,
        start_time: start,
        end_time: end,
        players_count: req.players_count,
        status: BookingStatus::Confirmed,
        payment_status: PaymentStatus::initial(quote.total_amount),
        total_amount: quote.total_amount,
        amount_paid: 0,
        promotion_id: quote.promotion_id.clone(),
        promotion_discount: has_promotion.then_some(quote.discount),
        original_amount: has_promotion.then_some(quote.original_amount),
        created_by_admin: actor.is_admin(),
        created_at: now,
        updated_at: now,
    };

    // The overlap trigger re-checks the slot at write time.
    queries::insert_booking(&tx, &booking)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        court_id = %booking.court_id,
        total = booking.total_amount,
        "booking created"
    );

    notifications.push(
        Notification::for_booking(
            NotificationKind::BookingCreated,
            &booking.organizer_user_id,
            &booking,
            &court.name,
        )
        .with_amount(booking.total_amount),
    );
    Ok(Outcome::new(booking, notifications))
}

/// Inserts the refund obligation for a paid booking unless one already exists.
fn ensure_refund(
    conn: &Connection,
    booking: &Booking,
    cancelled_by: CancelledBy,
    now: NaiveDateTime,
) -> AppResult<Option<Refund>> {
    if booking.amount_paid <= 0 || queries::get_refund_for_booking(conn, &booking.id)?.is_some() {
        return Ok(None);
    }
    let refund = Refund {
        id: uuid::Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        user_id: booking.organizer_user_id.clone(),
        amount: booking.amount_paid,
        status: RefundStatus::Pending,
        cancelled_by,
        cancelled_at: now,
        reviewed_by: None,
        reviewed_at: None,
        rejection_reason: None,
        gateway_ref: None,
    };
    queries::insert_refund(conn, &refund)?;
    tracing::info!(refund_id = %refund.id, booking_id = %booking.id, amount = refund.amount, "refund requested");
    Ok(Some(refund))
}

/// Cancels within an open transaction. `booking` must have been read inside it.
pub(crate) fn cancel_in_tx(
    conn: &Connection,
    booking: &Booking,
    cancelled_by: CancelledBy,
    now: NaiveDateTime,
) -> AppResult<Option<Refund>> {
    if !queries::mark_booking_cancelled(conn, &booking.id, now)? {
        return Err(AppError::State(StateViolation::BookingCancelled));
    }
    ensure_refund(conn, booking, cancelled_by, now)
}

pub fn cancel_booking(
    conn: &mut Connection,
    actor: &Actor,
    booking_id: &str,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> AppResult<Outcome<Cancellation>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    if !actor.is_admin() && booking.organizer_user_id != actor.user_id {
        return Err(AppError::Forbidden);
    }
    if booking.is_cancelled() {
        return Err(AppError::State(StateViolation::BookingCancelled));
    }
    if !actor.is_admin() && booking.starts_at() - now < Duration::hours(policy.cancellation_hours) {
        return Err(AppError::State(StateViolation::CancellationWindowClosed));
    }

    let cancelled_by = if actor.is_admin() {
        CancelledBy::Admin
    } else {
        CancelledBy::Client
    };
    let refund = cancel_in_tx(&tx, &booking, cancelled_by, now)?;
    let booking = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    let notifications = cancellation_notices(&tx, &booking, None)?;
    tx.commit()?;

    tracing::info!(booking_id = %booking.id, cancelled_by = cancelled_by.as_str(), "booking cancelled");
    Ok(Outcome::new(Cancellation { booking, refund }, notifications))
}

/// Admin hard delete. Collected money still yields a refund obligation.
pub fn delete_booking(
    conn: &mut Connection,
    booking_id: &str,
    now: NaiveDateTime,
) -> AppResult<Outcome<Option<Refund>>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    let notifications = if booking.is_cancelled() {
        vec![]
    } else {
        cancellation_notices(&tx, &booking, Some("removed by the venue"))?
    };
    let refund = ensure_refund(&tx, &booking, CancelledBy::Admin, now)?;
    queries::delete_booking(&tx, booking_id)?;
    tx.commit()?;

    tracing::warn!(booking_id = %booking_id, "booking hard-deleted");
    Ok(Outcome::new(refund, notifications))
}

/// Payment status after `amount_paid` changes. Cancelled bookings stay cancelled.
pub fn settled_status(booking: &Booking, amount_paid: i64) -> PaymentStatus {
    if booking.is_cancelled() {
        PaymentStatus::Cancelled
    } else if booking.total_amount == 0 {
        PaymentStatus::Confirmed
    } else {
        PaymentStatus::from_amounts(amount_paid, booking.total_amount)
    }
}

/// Applies a provider event exactly once per event key. The immediate
/// transaction serialises this against cancellation of the same booking.
pub fn apply_gateway_event(
    conn: &mut Connection,
    event: &GatewayEvent,
    now: NaiveDateTime,
) -> AppResult<EventDisposition> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if !queries::record_gateway_event(&tx, &event.event_key(), now)? {
        tracing::info!(reference = %event.reference(), "duplicate gateway event ignored");
        return Ok(EventDisposition::Duplicate);
    }

    // Unknown references roll back so a redelivery can succeed later.
    let log = queries::get_payment_log_by_ref(&tx, event.reference())?
        .ok_or_else(|| AppError::NotFound(format!("charge {}", event.reference())))?;
    let booking = queries::get_booking(&tx, &log.booking_id)?;

    let disposition = match event {
        GatewayEvent::ChargeSucceeded { amount, .. } => {
            if *amount <= 0 {
                return Err(AppError::Validation("charged amount must be positive".to_string()));
            }
            match booking.as_ref().filter(|b| !b.is_cancelled()) {
                Some(b) => {
                    queries::update_payment_log_status(&tx, &log.id, PaymentLogStatus::Succeeded, *amount, None, now)?;
                    let paid = (b.amount_paid + amount).min(b.total_amount);
                    if b.amount_paid + amount > b.total_amount {
                        tracing::warn!(
                            booking_id = %b.id,
                            excess = b.amount_paid + amount - b.total_amount,
                            "charge exceeds balance, clamping"
                        );
                    }
                    queries::update_booking_payment(&tx, &b.id, paid, settled_status(b, paid), now)?;
                    EventDisposition::Applied
                }
                None => {
                    queries::update_payment_log_status(
                        &tx,
                        &log.id,
                        PaymentLogStatus::Succeeded,
                        *amount,
                        Some(RECONCILIATION_NOTE),
                        now,
                    )?;
                    tracing::warn!(booking_id = %log.booking_id, reference = %event.reference(), "late charge on closed booking");
                    EventDisposition::Reconciliation
                }
            }
        }
        GatewayEvent::ChargeFailed { .. } if log.status != PaymentLogStatus::Pending => {
            tracing::warn!(
                reference = %event.reference(),
                log_status = %log.status.as_str(),
                "stale failure for settled charge, ignoring"
            );
            EventDisposition::Stale
        }
        GatewayEvent::ChargeFailed { reason, .. } => {
            queries::update_payment_log_status(&tx, &log.id, PaymentLogStatus::Failed, log.amount, Some(reason.as_str()), now)?;
            if let Some(b) = booking.as_ref().filter(|b| !b.is_cancelled()) {
                // A failure never downgrades a booking that is already settled.
                if b.balance_due() > 0 {
                    queries::update_booking_payment(&tx, &b.id, b.amount_paid, PaymentStatus::PaymentFailed, now)?;
                }
            }
            EventDisposition::Applied
        }
        GatewayEvent::ChargeRefunded { amount, .. } => {
            if *amount <= 0 {
                return Err(AppError::Validation("refunded amount must be positive".to_string()));
            }
            let unapplied = log.error_message.as_deref() == Some(RECONCILIATION_NOTE);
            let note = if unapplied { Some(RECONCILIATION_NOTE) } else { None };
            queries::update_payment_log_status(&tx, &log.id, PaymentLogStatus::Refunded, log.amount, note, now)?;
            match booking.as_ref().filter(|_| !unapplied) {
                Some(b) => {
                    let paid = (b.amount_paid - amount).max(0);
                    queries::update_booking_payment(&tx, &b.id, paid, settled_status(b, paid), now)?;
                    EventDisposition::Applied
                }
                None => EventDisposition::Reconciliation,
            }
        }
    };

    tx.commit()?;
    tracing::info!(
        reference = %event.reference(),
        booking_id = %log.booking_id,
        disposition = ?disposition,
        "gateway event applied"
    );
    Ok(disposition)
}

pub fn booking_detail(
    conn: &mut Connection,
    actor: &Actor,
    booking_id: &str,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> AppResult<Outcome<BookingDetail>> {
    let expired = expiry::expire_stale_bookings(conn, ExpiryScope::Booking(booking_id), policy, now)?;

    let booking = queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    if !can_view(conn, actor, &booking)? {
        return Err(AppError::Forbidden);
    }

    let detail = BookingDetail {
        court_name: court_name(conn, &booking.court_id)?,
        participants: queries::list_participants(conn, &booking.id)?,
        payments: queries::list_payment_logs(conn, &booking.id)?,
        refund: queries::get_refund_for_booking(conn, &booking.id)?,
        booking,
    };
    Ok(Outcome::new(detail, expired.notifications))
}

/// The caller's bookings from today on, after expiring their own stale ones.
pub fn my_bookings(
    conn: &mut Connection,
    actor: &Actor,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> AppResult<Outcome<Vec<Booking>>> {
    let expired =
        expiry::expire_stale_bookings(conn, ExpiryScope::Organizer(&actor.user_id), policy, now)?;
    let bookings = queries::list_bookings_for_user(conn, &actor.user_id, now.date())?;
    Ok(Outcome::new(bookings, expired.notifications))
}
