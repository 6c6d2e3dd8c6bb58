use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::errors::{AppError, AppResult};
use crate::handlers::auth::{actor_from_headers, admin_from_headers};
use crate::models::{Refund, RefundStatus};
use crate::services::notifications::dispatch_all;
use crate::services::refunds;
use crate::state::AppState;

// GET /api/refunds
pub async fn my_refunds(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<Refund>>> {
    let actor = actor_from_headers(&headers, &state.config)?;
    let conn = state.conn()?;
    Ok(Json(refunds::list_for_user(&conn, &actor)?))
}

// GET /api/admin/refunds
#[derive(Deserialize)]
pub struct RefundsQuery {
    pub status: Option<String>,
}

pub async fn list_refunds(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RefundsQuery>,
) -> AppResult<Json<Vec<Refund>>> {
    admin_from_headers(&headers, &state.config)?;
    let status = match query.status.as_deref() {
        None => None,
        Some("pending") => Some(RefundStatus::Pending),
        Some("approved") => Some(RefundStatus::Approved),
        Some("rejected") => Some(RefundStatus::Rejected),
        Some(other) => {
            return Err(AppError::Validation(format!("unknown refund status '{other}'")));
        }
    };

    let conn = state.conn()?;
    Ok(Json(refunds::list_for_admin(&conn, status)?))
}

// POST /api/admin/refunds/:id/approve
pub async fn approve_refund(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Refund>> {
    let admin = admin_from_headers(&headers, &state.config)?;
    let outcome = refunds::approve(&state, &admin, &id).await?;

    dispatch_all(state.notifier.as_ref(), outcome.notifications).await;
    Ok(Json(outcome.value))
}

// POST /api/admin/refunds/:id/reject
#[derive(Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

pub async fn reject_refund(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> AppResult<Json<Refund>> {
    let admin = admin_from_headers(&headers, &state.config)?;

    let outcome = {
        let conn = state.conn()?;
        refunds::reject(&conn, &admin, &id, &req.reason, state.config.local_now())?
    };

    dispatch_all(state.notifier.as_ref(), outcome.notifications).await;
    Ok(Json(outcome.value))
}
