use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub booking_id: String,
    pub invited_user_id: String,
    pub status: ParticipantStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Pending,
    Accepted,
    Declined,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::Accepted => "accepted",
            ParticipantStatus::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "accepted" => ParticipantStatus::Accepted,
            "declined" => ParticipantStatus::Declined,
            _ => ParticipantStatus::Pending,
        }
    }

    /// Declined invitations keep their row but free the seat.
    pub fn holds_seat(&self) -> bool {
        *self != ParticipantStatus::Declined
    }
}
