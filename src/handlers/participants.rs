use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppResult;
use crate::handlers::auth::actor_from_headers;
use crate::models::Participant;
use crate::services::notifications::dispatch_all;
use crate::services::participants;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct InviteRequest {
    pub invited_user_id: String,
}

// POST /api/bookings/:id/participants
pub async fn invite(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
    Json(req): Json<InviteRequest>,
) -> AppResult<(StatusCode, Json<Participant>)> {
    let actor = actor_from_headers(&headers, &state.config)?;

    let outcome = {
        let mut conn = state.conn()?;
        participants::invite(&mut conn, &actor, &booking_id, &req.invited_user_id, state.config.local_now())?
    };

    dispatch_all(state.notifier.as_ref(), outcome.notifications).await;
    Ok((StatusCode::CREATED, Json(outcome.value)))
}

// GET /api/bookings/:id/participants
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
) -> AppResult<Json<Vec<Participant>>> {
    let actor = actor_from_headers(&headers, &state.config)?;
    let conn = state.conn()?;
    Ok(Json(participants::list(&conn, &actor, &booking_id)?))
}

async fn answer(
    state: Arc<AppState>,
    headers: HeaderMap,
    participant_id: String,
    accept: bool,
) -> AppResult<Json<Participant>> {
    let actor = actor_from_headers(&headers, &state.config)?;

    let outcome = {
        let mut conn = state.conn()?;
        participants::respond(&mut conn, &actor, &participant_id, accept, state.config.local_now())?
    };

    dispatch_all(state.notifier.as_ref(), outcome.notifications).await;
    Ok(Json(outcome.value))
}

// POST /api/participants/:id/accept
pub async fn accept(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Participant>> {
    answer(state, headers, id, true).await
}

// POST /api/participants/:id/decline
pub async fn decline(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Participant>> {
    answer(state, headers, id, false).await
}

// DELETE /api/participants/:id
pub async fn remove(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let actor = actor_from_headers(&headers, &state.config)?;
    let mut conn = state.conn()?;
    participants::remove(&mut conn, &actor, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
