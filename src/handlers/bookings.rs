use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::errors::AppResult;
use crate::handlers::auth::actor_from_headers;
use crate::models::Booking;
use crate::services::booking::{self, BookingDetail, Cancellation, CreateBookingRequest};
use crate::services::notifications::dispatch_all;
use crate::services::payments::{self, PaymentRequest, PaymentSession, SyncResult};
use crate::state::AppState;

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateBookingRequest>,
) -> AppResult<(StatusCode, Json<Booking>)> {
    let actor = actor_from_headers(&headers, &state.config)?;

    let outcome = {
        let mut conn = state.conn()?;
        booking::create_booking(
            &mut conn,
            &actor,
            &req,
            &state.config.policy(),
            state.config.local_now(),
        )?
    };

    dispatch_all(state.notifier.as_ref(), outcome.notifications).await;
    Ok((StatusCode::CREATED, Json(outcome.value)))
}

// GET /api/bookings
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<Booking>>> {
    let actor = actor_from_headers(&headers, &state.config)?;

    let outcome = {
        let mut conn = state.conn()?;
        booking::my_bookings(&mut conn, &actor, &state.config.policy(), state.config.local_now())?
    };

    dispatch_all(state.notifier.as_ref(), outcome.notifications).await;
    Ok(Json(outcome.value))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<BookingDetail>> {
    let actor = actor_from_headers(&headers, &state.config)?;

    let outcome = {
        let mut conn = state.conn()?;
        booking::booking_detail(
            &mut conn,
            &actor,
            &id,
            &state.config.policy(),
            state.config.local_now(),
        )?
    };

    dispatch_all(state.notifier.as_ref(), outcome.notifications).await;
    Ok(Json(outcome.value))
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Cancellation>> {
    let actor = actor_from_headers(&headers, &state.config)?;

    let outcome = {
        let mut conn = state.conn()?;
        booking::cancel_booking(
            &mut conn,
            &actor,
            &id,
            &state.config.policy(),
            state.config.local_now(),
        )?
    };

    dispatch_all(state.notifier.as_ref(), outcome.notifications).await;
    Ok(Json(outcome.value))
}

// POST /api/bookings/:id/payments
pub async fn start_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> AppResult<(StatusCode, Json<PaymentSession>)> {
    let actor = actor_from_headers(&headers, &state.config)?;
    let outcome = payments::start_payment(&state, &actor, &id, &req).await?;

    dispatch_all(state.notifier.as_ref(), outcome.notifications).await;
    Ok((StatusCode::CREATED, Json(outcome.value)))
}

// POST /api/payments/:id/sync
pub async fn sync_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<SyncResult>> {
    let actor = actor_from_headers(&headers, &state.config)?;
    let result = payments::sync_payment(&state, &actor, &id).await?;
    Ok(Json(result))
}
