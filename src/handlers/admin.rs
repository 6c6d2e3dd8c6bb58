use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::handlers::auth::admin_from_headers;
use crate::models::{
    Booking, BookingStatus, Court, DiscountType, Holiday, OpeningHours, Promotion, Refund,
};
use crate::services::booking::{self as booking_service, parse_date, parse_time};
use crate::services::notifications::dispatch_all;
use crate::state::AppState;

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> AppResult<Json<Vec<Booking>>> {
    admin_from_headers(&headers, &state.config)?;
    let status = match query.status.as_deref() {
        None => None,
        Some("confirmed") => Some(BookingStatus::Confirmed),
        Some("cancelled") => Some(BookingStatus::Cancelled),
        Some(other) => {
            return Err(AppError::Validation(format!("unknown booking status '{other}'")));
        }
    };
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    let conn = state.conn()?;
    Ok(Json(queries::list_all_bookings(&conn, status, limit)?))
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub refund: Option<Refund>,
}

// DELETE /api/admin/bookings/:id
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<DeleteResponse>> {
    admin_from_headers(&headers, &state.config)?;

    let outcome = {
        let mut conn = state.conn()?;
        booking_service::delete_booking(&mut conn, &id, state.config.local_now())?
    };

    dispatch_all(state.notifier.as_ref(), outcome.notifications).await;
    Ok(Json(DeleteResponse {
        deleted: true,
        refund: outcome.value,
    }))
}

// GET /api/admin/courts
pub async fn list_courts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<Court>>> {
    admin_from_headers(&headers, &state.config)?;
    let conn = state.conn()?;
    Ok(Json(queries::list_courts(&conn)?))
}

// POST /api/admin/courts
#[derive(Deserialize)]
pub struct CreateCourtRequest {
    pub name: String,
    pub capacity: i64,
    pub price: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create_court(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateCourtRequest>,
) -> AppResult<(StatusCode, Json<Court>)> {
    admin_from_headers(&headers, &state.config)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("court name must not be empty".to_string()));
    }
    if !Court::is_valid_capacity(req.capacity) {
        return Err(AppError::Validation("capacity must be 2 or 4".to_string()));
    }
    if req.price < 0 {
        return Err(AppError::Validation("price must not be negative".to_string()));
    }

    let court = Court {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        capacity: req.capacity,
        price: req.price,
        is_active: req.is_active,
    };
    let conn = state.conn()?;
    queries::insert_court(&conn, &court)?;
    tracing::info!(court_id = %court.id, name = %court.name, "court created");
    Ok((StatusCode::CREATED, Json(court)))
}

// POST /api/admin/courts/:id/active
#[derive(Deserialize)]
pub struct CourtActiveRequest {
    pub is_active: bool,
}

pub async fn set_court_active(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<CourtActiveRequest>,
) -> AppResult<Json<Court>> {
    admin_from_headers(&headers, &state.config)?;
    let conn = state.conn()?;
    if !queries::set_court_active(&conn, &id, req.is_active)? {
        return Err(AppError::NotFound(format!("court {id}")));
    }
    let court = queries::get_court(&conn, &id)?.ok_or_else(|| AppError::NotFound(format!("court {id}")))?;
    tracing::info!(court_id = %id, is_active = req.is_active, "court activity changed");
    Ok(Json(court))
}

// GET /api/admin/opening-hours
pub async fn get_opening_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<OpeningHours>>> {
    admin_from_headers(&headers, &state.config)?;
    let conn = state.conn()?;
    Ok(Json(queries::get_opening_hours(&conn)?))
}

// PUT /api/admin/opening-hours/:weekday
#[derive(Deserialize)]
pub struct OpeningHoursRequest {
    pub open_time: String,
    pub close_time: String,
    #[serde(default)]
    pub is_closed: bool,
}

pub async fn set_opening_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(weekday): Path<u32>,
    Json(req): Json<OpeningHoursRequest>,
) -> AppResult<Json<OpeningHours>> {
    admin_from_headers(&headers, &state.config)?;
    if weekday > 6 {
        return Err(AppError::Validation("weekday must be 0 (Sunday) to 6 (Saturday)".to_string()));
    }
    let hours = OpeningHours {
        weekday,
        open_time: parse_time(&req.open_time)?,
        close_time: parse_time(&req.close_time)?,
        is_closed: req.is_closed,
    };
    if !hours.is_closed && hours.close_time <= hours.open_time {
        return Err(AppError::Validation("close_time must be after open_time".to_string()));
    }

    let conn = state.conn()?;
    queries::set_opening_hours(&conn, &hours)?;
    tracing::info!(weekday, is_closed = hours.is_closed, "opening hours updated");
    Ok(Json(hours))
}

// GET /api/admin/holidays
pub async fn list_holidays(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<Holiday>>> {
    admin_from_headers(&headers, &state.config)?;
    let conn = state.conn()?;
    Ok(Json(queries::list_holidays(&conn)?))
}

// POST /api/admin/holidays
#[derive(Deserialize)]
pub struct HolidayRequest {
    pub date: String,
    pub end_date: Option<String>,
    #[serde(default)]
    pub reason: String,
}

pub async fn create_holiday(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<HolidayRequest>,
) -> AppResult<(StatusCode, Json<Holiday>)> {
    admin_from_headers(&headers, &state.config)?;
    let date = parse_date(&req.date)?;
    let end_date = req.end_date.as_deref().map(parse_date).transpose()?;
    if end_date.is_some_and(|end| end < date) {
        return Err(AppError::Validation("end_date must not be before date".to_string()));
    }

    let holiday = Holiday {
        id: uuid::Uuid::new_v4().to_string(),
        date,
        end_date,
        reason: req.reason.trim().to_string(),
    };
    let conn = state.conn()?;
    queries::insert_holiday(&conn, &holiday)?;
    tracing::info!(holiday_id = %holiday.id, date = %holiday.date, "holiday added");
    Ok((StatusCode::CREATED, Json(holiday)))
}

// POST /api/admin/promotions, PUT /api/admin/promotions/:id
#[derive(Deserialize)]
pub struct PromotionRequest {
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub court_ids: Vec<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub start_date: String,
    pub end_date: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Accepts full timestamps or bare dates. A bare end date covers the whole day.
fn parse_bound(raw: &str, end_of_day: bool) -> AppResult<NaiveDateTime> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid timestamp '{raw}'")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };
    time.map(|t| date.and_time(t))
        .ok_or_else(|| AppError::Internal("invalid time of day".to_string()))
}

fn build_promotion(
    conn: &rusqlite::Connection,
    id: String,
    req: PromotionRequest,
) -> AppResult<Promotion> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("promotion name must not be empty".to_string()));
    }
    match req.discount_type {
        DiscountType::Percentage if !(0..=100).contains(&req.discount_value) => {
            return Err(AppError::Validation("percentage must be between 0 and 100".to_string()));
        }
        DiscountType::Amount if req.discount_value < 0 => {
            return Err(AppError::Validation("discount amount must not be negative".to_string()));
        }
        _ => {}
    }
    let start_date = parse_bound(&req.start_date, false)?;
    let end_date = parse_bound(&req.end_date, true)?;
    if end_date < start_date {
        return Err(AppError::Validation("end_date must not be before start_date".to_string()));
    }
    for court_id in &req.court_ids {
        if queries::get_court(conn, court_id)?.is_none() {
            return Err(AppError::Validation(format!("unknown court {court_id}")));
        }
    }

    Ok(Promotion {
        id,
        name: name.to_string(),
        label: req.label.trim().to_string(),
        court_ids: req.court_ids,
        discount_type: req.discount_type,
        discount_value: req.discount_value,
        start_date,
        end_date,
        is_active: req.is_active,
    })
}

pub async fn create_promotion(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PromotionRequest>,
) -> AppResult<(StatusCode, Json<Promotion>)> {
    admin_from_headers(&headers, &state.config)?;
    let conn = state.conn()?;
    let promo = build_promotion(&conn, uuid::Uuid::new_v4().to_string(), req)?;
    queries::upsert_promotion(&conn, &promo)?;
    tracing::info!(promotion_id = %promo.id, name = %promo.name, "promotion created");
    Ok((StatusCode::CREATED, Json(promo)))
}

pub async fn update_promotion(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<PromotionRequest>,
) -> AppResult<Json<Promotion>> {
    admin_from_headers(&headers, &state.config)?;
    let conn = state.conn()?;
    if queries::get_promotion(&conn, &id)?.is_none() {
        return Err(AppError::NotFound(format!("promotion {id}")));
    }
    // Existing bookings keep their snapshot.
    let promo = build_promotion(&conn, id, req)?;
    queries::upsert_promotion(&conn, &promo)?;
    tracing::info!(promotion_id = %promo.id, "promotion updated");
    Ok(Json(promo))
}

// DELETE /api/admin/promotions/:id
pub async fn delete_promotion(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    admin_from_headers(&headers, &state.config)?;
    let conn = state.conn()?;
    if !queries::delete_promotion(&conn, &id)? {
        return Err(AppError::NotFound(format!("promotion {id}")));
    }
    tracing::info!(promotion_id = %id, "promotion deleted");
    Ok(StatusCode::NO_CONTENT)
}
