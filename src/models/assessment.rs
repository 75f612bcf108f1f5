use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::SeverityBand;

/// Latest PHQ-9 result for a user. One row per user, updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub user_id: i64,
    pub score: u8,
    pub band: SeverityBand,
    pub updated_at: NaiveDateTime,
}
