use chrono::{NaiveDateTime, Timelike};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppResult;
use crate::models::{Court, Promotion};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PriceQuote {
    pub court_id: String,
    pub promotion_id: Option<String>,
    pub promotion_label: Option<String>,
    pub original_amount: i64,
    pub discount: i64,
    pub total_amount: i64,
}

fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Inclusive `[start_date, end_date]`, compared at minute granularity.
pub fn is_in_effect(promo: &Promotion, at: NaiveDateTime) -> bool {
    let at = truncate_to_minute(at);
    promo.is_active
        && truncate_to_minute(promo.start_date) <= at
        && at <= truncate_to_minute(promo.end_date)
}

/// Picks the promotion giving the largest discount on `court`. Ties go to the
/// larger raw value, then to the smallest id.
pub fn select_promotion<'a>(
    promotions: &'a [Promotion],
    court: &Court,
    at: NaiveDateTime,
) -> Option<&'a Promotion> {
    promotions
        .iter()
        .filter(|p| p.applies_to_court(&court.id) && is_in_effect(p, at))
        .max_by(|a, b| {
            a.discount_for(court.price)
                .cmp(&b.discount_for(court.price))
                .then_with(|| a.discount_value.cmp(&b.discount_value))
                .then_with(|| b.id.cmp(&a.id))
        })
}

pub fn quote(court: &Court, promotions: &[Promotion], at: NaiveDateTime) -> PriceQuote {
    let promotion = select_promotion(promotions, court, at);
    let discount = promotion.map(|p| p.discount_for(court.price)).unwrap_or(0);
    PriceQuote {
        court_id: court.id.clone(),
        promotion_id: promotion.map(|p| p.id.clone()),
        promotion_label: promotion.map(|p| p.label.clone()),
        original_amount: court.price,
        discount,
        total_amount: (court.price - discount).max(0),
    }
}

pub fn quote_for(conn: &Connection, court: &Court, at: NaiveDateTime) -> AppResult<PriceQuote> {
    let promotions = queries::list_active_promotions(conn)?;
    Ok(quote(court, &promotions, at))
}
