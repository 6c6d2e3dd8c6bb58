use std::sync::Arc;

use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};

use crate::config::BookingPolicy;
use crate::db::queries;
use crate::errors::AppResult;
use crate::models::{Booking, CancelledBy};
use crate::services::booking::{cancel_in_tx, cancellation_notices};
use crate::services::notifications::dispatch_all;
use crate::services::Outcome;
use crate::state::AppState;

const EXPIRY_REASON: &str = "payment was not received in time";

#[derive(Debug, Clone, Copy)]
pub enum ExpiryScope<'a> {
    All,
    Organizer(&'a str),
    Booking(&'a str),
}

/// Cancels unpaid, non-admin bookings older than the payment timeout.
/// Must run inside an open transaction.
pub fn expire_in_tx(
    conn: &Connection,
    scope: ExpiryScope<'_>,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> AppResult<Outcome<Vec<Booking>>> {
    let candidates = match scope {
        ExpiryScope::All => queries::unpaid_bookings(conn, None)?,
        ExpiryScope::Organizer(user) => queries::unpaid_bookings(conn, Some(user))?,
        ExpiryScope::Booking(id) => queries::get_booking(conn, id)?.into_iter().collect(),
    };

    let mut expired = vec![];
    let mut notifications = vec![];
    for booking in candidates {
        if !booking.is_payment_expired(now, policy.payment_timeout_hours) {
            continue;
        }
        // Venue-initiated, so any refund is tagged as admin.
        cancel_in_tx(conn, &booking, CancelledBy::Admin, now)?;
        let Some(cancelled) = queries::get_booking(conn, &booking.id)? else {
            continue;
        };
        tracing::info!(booking_id = %cancelled.id, created_at = %cancelled.created_at, "unpaid booking expired");
        notifications.extend(cancellation_notices(conn, &cancelled, Some(EXPIRY_REASON))?);
        expired.push(cancelled);
    }

    Ok(Outcome::new(expired, notifications))
}

pub fn expire_stale_bookings(
    conn: &mut Connection,
    scope: ExpiryScope<'_>,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> AppResult<Outcome<Vec<Booking>>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let outcome = expire_in_tx(&tx, scope, policy, now)?;
    tx.commit()?;
    Ok(outcome)
}

/// One sweep across every organizer.
pub async fn run_sweep(state: &AppState) {
    let outcome = {
        let mut conn = match state.conn() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "expiry sweep could not lock database");
                return;
            }
        };
        expire_stale_bookings(
            &mut conn,
            ExpiryScope::All,
            &state.config.policy(),
            state.config.local_now(),
        )
    };

    match outcome {
        Ok(outcome) => {
            if !outcome.value.is_empty() {
                tracing::info!(count = outcome.value.len(), "expiry sweep cancelled bookings");
            }
            dispatch_all(state.notifier.as_ref(), outcome.notifications).await;
        }
        Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
    }
}

pub fn spawn_sweeper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let period = tokio::time::Duration::from_secs(state.config.expiry_sweep_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            run_sweep(&state).await;
        }
    })
}
