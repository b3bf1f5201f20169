use std::io;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::domain::{AdoptionRequest, RequestStatus};

/// Counts of requests by status plus the number past the review SLA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RequestStatistics {
    pub total: usize,
    pub editing: usize,
    pub under_review: usize,
    pub approved: usize,
    pub rejected: usize,
    pub appealing: usize,
    pub overdue: usize,
}

pub(crate) fn compile_statistics(
    requests: &[AdoptionRequest],
    now: DateTime<Utc>,
    sla: Duration,
) -> RequestStatistics {
    let mut stats = RequestStatistics {
        total: requests.len(),
        ..RequestStatistics::default()
    };
    for request in requests {
        match request.status {
            RequestStatus::Editing => stats.editing += 1,
            RequestStatus::UnderReview => stats.under_review += 1,
            RequestStatus::Approved => stats.approved += 1,
            RequestStatus::Rejected => stats.rejected += 1,
            RequestStatus::Appealing => stats.appealing += 1,
        }
        if request.is_overdue(now, sla) {
            stats.overdue += 1;
        }
    }
    stats
}

#[derive(Debug, Serialize)]
struct OverdueRow<'a> {
    request_id: u64,
    cat_id: u64,
    adopter_id: u64,
    status: &'a str,
    entered_status_at: String,
    days_in_status: i64,
}

/// Render the overdue requests as a CSV table, one row per request.
pub fn write_overdue_csv<W: io::Write>(
    writer: W,
    requests: &[AdoptionRequest],
    now: DateTime<Utc>,
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for request in requests {
        csv_writer.serialize(OverdueRow {
            request_id: request.id.0,
            cat_id: request.cat.0,
            adopter_id: request.adopter.0,
            status: request.status.label(),
            entered_status_at: request.status_entered_at.to_rfc3339(),
            days_in_status: (now - request.status_entered_at).num_days(),
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}
