use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    pub name: String,
    pub label: String,
    pub court_ids: Vec<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Amount,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Amount => "amount",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "amount" => DiscountType::Amount,
            _ => DiscountType::Percentage,
        }
    }
}

impl Promotion {
    /// Discount in minor units, never larger than the price.
    pub fn discount_for(&self, price: i64) -> i64 {
        let raw = match self.discount_type {
            DiscountType::Percentage => price * self.discount_value / 100,
            DiscountType::Amount => self.discount_value,
        };
        raw.clamp(0, price.max(0))
    }

    pub fn applies_to_court(&self, court_id: &str) -> bool {
        self.court_ids.iter().any(|id| id == court_id)
    }
}
