//! Append-only record of coordinator opinions.
//!
//! Evaluations are drafted here but only ever persisted from inside
//! [`super::service::AdoptionService::evaluate_request`], in the same
//! atomic unit as the status transition they justify. There is no update
//! or delete path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{EvaluationId, RequestId, UserId, ValidationIssue};

/// Minimum length of a coordinator opinion, after trimming.
pub const MIN_OPINION_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub request: RequestId,
    pub coordinator: UserId,
    pub opinion: String,
    /// Which pass through review this opinion belongs to; a request that
    /// re-enters review after an appeal starts a new cycle.
    pub review_cycle: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Validate and assemble an evaluation row. Drafting does not persist.
pub(crate) fn draft(
    id: EvaluationId,
    request: RequestId,
    coordinator: UserId,
    opinion: &str,
    review_cycle: u32,
    now: DateTime<Utc>,
) -> Result<Evaluation, ValidationIssue> {
    let trimmed = opinion.trim();
    if trimmed.len() < MIN_OPINION_LEN {
        return Err(ValidationIssue::new(
            "opinion",
            format!("opinion must be at least {MIN_OPINION_LEN} characters"),
        ));
    }

    Ok(Evaluation {
        id,
        request,
        coordinator,
        opinion: trimmed.to_string(),
        review_cycle,
        recorded_at: now,
    })
}
