pub mod webhook;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Booking, TIME_FORMAT};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingCreated,
    BookingCancelled,
    ParticipantInvited,
    ParticipantAccepted,
    ParticipantDeclined,
    RefundApproved,
    RefundRejected,
}

/// Fire-and-forget event handed to the dispatcher. Rendering is the dispatcher's job.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient_user_id: String,
    pub booking_id: String,
    pub court_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub amount: Option<i64>,
    pub reason: Option<String>,
}

impl Notification {
    pub fn new(kind: NotificationKind, recipient: &str, booking_id: &str) -> Self {
        Self {
            kind,
            recipient_user_id: recipient.to_string(),
            booking_id: booking_id.to_string(),
            court_name: None,
            date: None,
            start_time: None,
            end_time: None,
            amount: None,
            reason: None,
        }
    }

    pub fn for_booking(
        kind: NotificationKind,
        recipient: &str,
        booking: &Booking,
        court_name: &str,
    ) -> Self {
        let mut n = Self::new(kind, recipient, &booking.id);
        n.court_name = Some(court_name.to_string());
        n.date = Some(booking.date);
        n.start_time = Some(booking.start_time.format(TIME_FORMAT).to_string());
        n.end_time = Some(booking.end_time.format(TIME_FORMAT).to_string());
        n
    }

    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Sends each notification in order. Failures are logged and never surface to the caller.
pub async fn dispatch_all(dispatcher: &dyn NotificationDispatcher, notifications: Vec<Notification>) {
    for notification in notifications {
        if let Err(e) = dispatcher.dispatch(&notification).await {
            tracing::error!(
                error = %e,
                kind = ?notification.kind,
                booking_id = %notification.booking_id,
                "failed to dispatch notification"
            );
        }
    }
}

/// Used when no delivery endpoint is configured.
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            kind = ?notification.kind,
            recipient = %notification.recipient_user_id,
            booking_id = %notification.booking_id,
            "notification"
        );
        Ok(())
    }
}
