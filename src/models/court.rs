use serde::{Deserialize, Serialize};

pub const CAPACITY_CLASSES: [i64; 2] = [2, 4];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Court {
    pub id: String,
    pub name: String,
    pub capacity: i64,
    pub price: i64,
    pub is_active: bool,
}

impl Court {
    pub fn is_valid_capacity(capacity: i64) -> bool {
        CAPACITY_CLASSES.contains(&capacity)
    }
}
