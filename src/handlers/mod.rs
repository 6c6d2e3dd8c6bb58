pub mod admin;
pub mod auth;
pub mod availability;
pub mod bookings;
pub mod health;
pub mod participants;
pub mod refunds;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/webhook/payments", post(webhook::payment_webhook))
        .route("/api/availability/slots", get(availability::get_slots))
        .route("/api/availability/calendar", get(availability::get_calendar))
        .route("/api/availability/courts", get(availability::get_free_courts))
        .route("/api/pricing/quote", get(availability::get_quote))
        .route(
            "/api/bookings",
            post(bookings::create_booking).get(bookings::my_bookings),
        )
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/api/bookings/:id/payments", post(bookings::start_payment))
        .route("/api/payments/:id/sync", post(bookings::sync_payment))
        .route(
            "/api/bookings/:id/participants",
            post(participants::invite).get(participants::list),
        )
        .route("/api/participants/:id/accept", post(participants::accept))
        .route("/api/participants/:id/decline", post(participants::decline))
        .route("/api/participants/:id", delete(participants::remove))
        .route("/api/refunds", get(refunds::my_refunds))
        .route("/api/admin/bookings", get(admin::list_bookings))
        .route("/api/admin/bookings/:id", delete(admin::delete_booking))
        .route("/api/admin/refunds", get(refunds::list_refunds))
        .route("/api/admin/refunds/:id/approve", post(refunds::approve_refund))
        .route("/api/admin/refunds/:id/reject", post(refunds::reject_refund))
        .route(
            "/api/admin/courts",
            get(admin::list_courts).post(admin::create_court),
        )
        .route("/api/admin/courts/:id/active", post(admin::set_court_active))
        .route("/api/admin/opening-hours", get(admin::get_opening_hours))
        .route(
            "/api/admin/opening-hours/:weekday",
            put(admin::set_opening_hours),
        )
        .route(
            "/api/admin/holidays",
            get(admin::list_holidays).post(admin::create_holiday),
        )
        .route("/api/admin/promotions", post(admin::create_promotion))
        .route(
            "/api/admin/promotions/:id",
            put(admin::update_promotion).delete(admin::delete_promotion),
        )
        .with_state(state)
}
