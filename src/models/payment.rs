use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One row per attempted charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLog {
    pub id: String,
    pub booking_id: String,
    pub user_id: String,
    pub amount: i64,
    pub payment_type: PaymentType,
    pub status: PaymentLogStatus,
    pub gateway_ref: Option<String>,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Partial,
    Full,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Partial => "partial",
            PaymentType::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "partial" => PaymentType::Partial,
            _ => PaymentType::Full,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentLogStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentLogStatus::Pending => "pending",
            PaymentLogStatus::Succeeded => "succeeded",
            PaymentLogStatus::Failed => "failed",
            PaymentLogStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "succeeded" => PaymentLogStatus::Succeeded,
            "failed" => PaymentLogStatus::Failed,
            "refunded" => PaymentLogStatus::Refunded,
            _ => PaymentLogStatus::Pending,
        }
    }
}

/// Outcome reported by the payment provider for a charge it holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    ChargeSucceeded {
        reference: String,
        amount: i64,
    },
    ChargeFailed {
        reference: String,
        reason: String,
    },
    ChargeRefunded {
        reference: String,
        refund_reference: String,
        amount: i64,
    },
}

impl GatewayEvent {
    /// Charge reference the event belongs to.
    pub fn reference(&self) -> &str {
        match self {
            GatewayEvent::ChargeSucceeded { reference, .. }
            | GatewayEvent::ChargeFailed { reference, .. }
            | GatewayEvent::ChargeRefunded { reference, .. } => reference,
        }
    }

    /// Deduplication key; duplicate deliveries share it.
    pub fn event_key(&self) -> String {
        match self {
            GatewayEvent::ChargeSucceeded { reference, .. } => format!("succeeded:{reference}"),
            GatewayEvent::ChargeFailed { reference, .. } => format!("failed:{reference}"),
            GatewayEvent::ChargeRefunded {
                refund_reference, ..
            } => format!("refunded:{refund_reference}"),
        }
    }
}
