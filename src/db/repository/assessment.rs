use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use super::conversation::parse_timestamp;
use crate::db::sqlite::TIMESTAMP_FORMAT;
use crate::db::DatabaseError;
use crate::models::enums::SeverityBand;
use crate::models::AssessmentResult;

/// Insert or update the single assessment row for a user.
pub fn upsert_assessment(
    conn: &Connection,
    user_id: i64,
    score: u8,
    band: SeverityBand,
    updated_at: NaiveDateTime,
) -> Result<AssessmentResult, DatabaseError> {
    if score > 27 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "PHQ-9 score {score} outside 0..=27"
        )));
    }

    conn.execute(
        "INSERT INTO assessment_results (user_id, score, band, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
             score = excluded.score,
             band = excluded.band,
             updated_at = excluded.updated_at",
        params![
            user_id,
            score,
            band.as_str(),
            updated_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;

    Ok(AssessmentResult {
        user_id,
        score,
        band,
        updated_at,
    })
}

pub fn get_assessment(
    conn: &Connection,
    user_id: i64,
) -> Result<Option<AssessmentResult>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT user_id, score, band, updated_at FROM assessment_results WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, u8>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(user_id, score, band, updated_at)| -> Result<AssessmentResult, DatabaseError> {
        Ok(AssessmentResult {
            user_id,
            score,
            band: SeverityBand::from_str(&band)?,
            updated_at: parse_timestamp(&updated_at),
        })
    })
    .transpose()
}

pub fn count_assessments(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM assessment_results", [], |row| {
        row.get(0)
    })?;
    Ok(count)
}
