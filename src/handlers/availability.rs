use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::handlers::auth::actor_from_headers;
use crate::models::Court;
use crate::services::allocation;
use crate::services::availability::{self, DayAvailability, DayBookingsCache, Slot};
use crate::services::booking::{parse_date, parse_time, resolve_slot};
use crate::services::pricing::{self, PriceQuote};
use crate::state::AppState;

// GET /api/availability/slots
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: String,
    pub capacity: i64,
}

pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SlotsQuery>,
) -> AppResult<Json<Vec<Slot>>> {
    actor_from_headers(&headers, &state.config)?;
    let date = parse_date(&query.date)?;

    let conn = state.conn()?;
    let mut cache = DayBookingsCache::new();
    let slots = availability::available_slots(
        &conn,
        &mut cache,
        date,
        query.capacity,
        &state.config.policy(),
        state.config.local_now(),
    )?;
    Ok(Json(slots))
}

// GET /api/availability/calendar
#[derive(Deserialize)]
pub struct CalendarQuery {
    pub from: String,
    pub to: String,
    pub capacity: i64,
}

pub async fn get_calendar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CalendarQuery>,
) -> AppResult<Json<Vec<DayAvailability>>> {
    actor_from_headers(&headers, &state.config)?;
    let from = parse_date(&query.from)?;
    let to = parse_date(&query.to)?;

    let conn = state.conn()?;
    let days = availability::availability_calendar(
        &conn,
        from,
        to,
        query.capacity,
        &state.config.policy(),
        state.config.local_now(),
    )?;
    Ok(Json(days))
}

// GET /api/availability/courts
#[derive(Deserialize)]
pub struct FreeCourtsQuery {
    pub date: String,
    pub start_time: String,
    pub capacity: i64,
}

pub async fn get_free_courts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<FreeCourtsQuery>,
) -> AppResult<Json<Vec<Court>>> {
    actor_from_headers(&headers, &state.config)?;
    let date = parse_date(&query.date)?;
    let start = parse_time(&query.start_time)?;
    availability::validate_capacity(query.capacity)?;

    let conn = state.conn()?;
    let (start, end) = resolve_slot(&conn, date, start, &state.config.policy())?;
    let courts = allocation::find_free_courts(&conn, date, start, end, query.capacity)?;
    Ok(Json(courts))
}

// GET /api/pricing/quote
#[derive(Deserialize)]
pub struct QuoteQuery {
    pub court_id: String,
    pub date: String,
    pub start_time: String,
}

pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<QuoteQuery>,
) -> AppResult<Json<PriceQuote>> {
    actor_from_headers(&headers, &state.config)?;
    let date = parse_date(&query.date)?;
    let start = parse_time(&query.start_time)?;

    let conn = state.conn()?;
    let court = queries::get_court(&conn, &query.court_id)?
        .ok_or_else(|| AppError::NotFound(format!("court {}", query.court_id)))?;
    let quote = pricing::quote_for(&conn, &court, date.and_time(start))?;
    Ok(Json(quote))
}
