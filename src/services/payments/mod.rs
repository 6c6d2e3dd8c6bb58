pub mod http;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::config::BookingPolicy;
use crate::db::queries;
use crate::errors::{AppError, AppResult, StateViolation};
use crate::models::{
    Actor, Booking, GatewayEvent, PaymentLog, PaymentLogStatus, PaymentStatus, PaymentType,
};
use crate::services::booking::{self, can_view, EventDisposition};
use crate::services::expiry::{self, ExpiryScope};
use crate::services::Outcome;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequest {
    /// Our payment log id; the provider dedupes retries on it.
    pub idempotency_key: String,
    pub booking_id: String,
    pub user_id: String,
    pub amount: i64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeSession {
    pub reference: String,
    pub checkout_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    pub refund_id: String,
    pub booking_id: String,
    pub charge_refs: Vec<String>,
    pub amount: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, req: &ChargeRequest) -> anyhow::Result<ChargeSession>;
    /// Returns the provider's refund reference.
    async fn refund(&self, req: &RefundRequest) -> anyhow::Result<String>;
    /// `None` while the charge is still pending on the provider's side.
    async fn fetch_charge(&self, reference: &str) -> anyhow::Result<Option<GatewayEvent>>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub payment_type: PaymentType,
    /// Partial payments only. Defaults to an equal per-player share.
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    pub payment_id: String,
    pub reference: String,
    pub checkout_url: Option<String>,
    pub amount: i64,
    pub payment_type: PaymentType,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub payment: PaymentLog,
    pub booking: Option<Booking>,
    pub disposition: Option<EventDisposition>,
}

/// Equal split across the booked player count, rounded up.
pub fn per_player_share(booking: &Booking) -> i64 {
    let players = booking.players_count.max(1);
    (booking.total_amount + players - 1) / players
}

pub fn charge_amount(booking: &Booking, req: &PaymentRequest) -> AppResult<i64> {
    let balance = booking.balance_due();
    if balance <= 0 {
        return Err(AppError::State(StateViolation::AlreadyPaid));
    }
    let amount = match req.payment_type {
        PaymentType::Full => balance,
        PaymentType::Partial => match req.amount {
            Some(a) if a <= 0 => {
                return Err(AppError::Validation("amount must be positive".to_string()));
            }
            Some(a) => a.min(balance),
            None => per_player_share(booking).min(balance),
        },
    };
    Ok(amount)
}

/// Writes a pending payment log ahead of the provider call.
pub fn prepare_charge(
    conn: &mut Connection,
    actor: &Actor,
    booking_id: &str,
    req: &PaymentRequest,
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> AppResult<Outcome<PaymentLog>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let expired = expiry::expire_in_tx(&tx, ExpiryScope::Booking(booking_id), policy, now)?;
    let booking = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    if !can_view(&tx, actor, &booking)? {
        return Err(AppError::Forbidden);
    }
    if booking.is_cancelled() {
        // Commit the expiry so the caller sees it on the next read.
        tx.commit()?;
        return Err(AppError::State(StateViolation::BookingCancelled));
    }

    let amount = charge_amount(&booking, req)?;
    let log = PaymentLog {
        id: uuid::Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        user_id: actor.user_id.clone(),
        amount,
        payment_type: req.payment_type,
        status: PaymentLogStatus::Pending,
        gateway_ref: None,
        error_message: None,
        created_at: now,
        updated_at: now,
    };
    queries::insert_payment_log(&tx, &log)?;
    tx.commit()?;

    Ok(Outcome::new(log, expired.notifications))
}

/// Marks the attempt failed. The booking keeps its court so the user can retry.
pub fn record_charge_failure(
    conn: &mut Connection,
    log: &PaymentLog,
    message: &str,
    now: NaiveDateTime,
) -> AppResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    queries::update_payment_log_status(&tx, &log.id, PaymentLogStatus::Failed, log.amount, Some(message), now)?;
    if let Some(b) = queries::get_booking(&tx, &log.booking_id)? {
        if !b.is_cancelled() && b.balance_due() > 0 {
            queries::update_booking_payment(&tx, &b.id, b.amount_paid, PaymentStatus::PaymentFailed, now)?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub async fn start_payment(
    state: &AppState,
    actor: &Actor,
    booking_id: &str,
    req: &PaymentRequest,
) -> AppResult<Outcome<PaymentSession>> {
    let now = state.config.local_now();
    let prepared = {
        let mut conn = state.conn()?;
        prepare_charge(&mut conn, actor, booking_id, req, &state.config.policy(), now)?
    };
    let log = prepared.value;

    let charge = ChargeRequest {
        idempotency_key: log.id.clone(),
        booking_id: log.booking_id.clone(),
        user_id: log.user_id.clone(),
        amount: log.amount,
        description: format!("Court booking {}", log.booking_id),
    };

    match state.gateway.charge(&charge).await {
        Ok(session) => {
            {
                let conn = state.conn()?;
                queries::set_payment_log_ref(&conn, &log.id, &session.reference, now)?;
            }
            tracing::info!(
                booking_id = %log.booking_id,
                reference = %session.reference,
                amount = log.amount,
                "charge started"
            );
            Ok(Outcome::new(
                PaymentSession {
                    payment_id: log.id,
                    reference: session.reference,
                    checkout_url: session.checkout_url,
                    amount: log.amount,
                    payment_type: log.payment_type,
                },
                prepared.notifications,
            ))
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!(error = %message, booking_id = %log.booking_id, "charge request failed");
            {
                let mut conn = state.conn()?;
                record_charge_failure(&mut conn, &log, &message, state.config.local_now())?;
            }
            Err(AppError::Gateway(message))
        }
    }
}

/// The client's "did it work" poll. Outcomes go through the same idempotent
/// path as webhook deliveries, so racing the webhook is harmless.
pub async fn sync_payment(state: &AppState, actor: &Actor, payment_id: &str) -> AppResult<SyncResult> {
    let log = {
        let conn = state.conn()?;
        let log = queries::get_payment_log(&conn, payment_id)?
            .ok_or_else(|| AppError::NotFound(format!("payment {payment_id}")))?;
        let organizer = queries::get_booking(&conn, &log.booking_id)?.map(|b| b.organizer_user_id);
        let allowed = actor.is_admin()
            || log.user_id == actor.user_id
            || organizer.as_deref() == Some(actor.user_id.as_str());
        if !allowed {
            return Err(AppError::Forbidden);
        }
        log
    };

    let mut disposition = None;
    if let (Some(reference), PaymentLogStatus::Pending) = (log.gateway_ref.clone(), log.status) {
        let event = state
            .gateway
            .fetch_charge(&reference)
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        if let Some(event) = event {
            if event.reference() != reference {
                return Err(AppError::Gateway(format!(
                    "gateway answered for {} instead of {reference}",
                    event.reference()
                )));
            }
            let mut conn = state.conn()?;
            disposition = Some(booking::apply_gateway_event(&mut conn, &event, state.config.local_now())?);
        }
    }

    let conn = state.conn()?;
    let payment = queries::get_payment_log(&conn, payment_id)?
        .ok_or_else(|| AppError::NotFound(format!("payment {payment_id}")))?;
    let booking = queries::get_booking(&conn, &payment.booking_id)?;
    Ok(SyncResult {
        payment,
        booking,
        disposition,
    })
}
