use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for a user account in the external directory. Adopters and
/// coordinators share one identity space; capability sets distinguish them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// Identifier for a cat in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatId(pub u64);

/// Identifier for an adoption request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Identifier for a recorded evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvaluationId(pub u64);

/// Identifier for a document attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub u64);

macro_rules! display_as_inner {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_as_inner!(UserId, CatId, RequestId, EvaluationId, DocumentId);

/// The slice of the cat catalog this workflow owns: existence and the
/// availability flag. Everything else about a cat lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cat {
    pub id: CatId,
    pub name: String,
    pub available: bool,
}

/// Lifecycle states of an adoption request.
///
/// `Editing` -> `UnderReview` -> `Approved` | `Rejected`;
/// `Rejected` -> `Appealing` -> `UnderReview` (one re-entry);
/// `Editing`/`Appealing` may be cancelled, which deletes the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Editing,
    UnderReview,
    Approved,
    Rejected,
    Appealing,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Editing => "editing",
            RequestStatus::UnderReview => "under_review",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Appealing => "appealing",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "editing" => Some(RequestStatus::Editing),
            "under_review" => Some(RequestStatus::UnderReview),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            "appealing" => Some(RequestStatus::Appealing),
            _ => None,
        }
    }

    /// Active requests hold their cat off the adoption pool.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            RequestStatus::Editing | RequestStatus::UnderReview | RequestStatus::Appealing
        )
    }

    /// States in which the owning adopter may change the request.
    pub const fn is_editable(self) -> bool {
        matches!(self, RequestStatus::Editing | RequestStatus::Appealing)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coordinator verdict accompanying an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

/// An adoption request together with its transition bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdoptionRequest {
    pub id: RequestId,
    pub adopter: UserId,
    pub cat: CatId,
    pub status: RequestStatus,
    /// Set exactly once, when a rejection is appealed; its presence blocks
    /// a second appeal regardless of status.
    pub appeal_reason: Option<String>,
    /// Counts entries into `UnderReview`; evaluations are stamped with it
    /// so re-evaluation checks only look at the current cycle.
    pub review_cycle: u32,
    pub created_at: DateTime<Utc>,
    pub status_entered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdoptionRequest {
    pub fn new(id: RequestId, adopter: UserId, cat: CatId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            adopter,
            cat,
            status: RequestStatus::Editing,
            appeal_reason: None,
            review_cycle: 0,
            created_at: now,
            status_entered_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Reporting predicate only; nothing expires requests automatically.
    pub fn is_overdue(&self, now: DateTime<Utc>, sla: Duration) -> bool {
        matches!(
            self.status,
            RequestStatus::UnderReview | RequestStatus::Appealing
        ) && now > self.status_entered_at + sla
    }

    pub(crate) fn set_status(&mut self, status: RequestStatus, now: DateTime<Utc>) {
        self.status = status;
        self.status_entered_at = now;
        self.updated_at = now;
    }

    /// Enter (or re-enter) review, advancing the review cycle.
    pub(crate) fn begin_review(&mut self, now: DateTime<Utc>) {
        self.review_cycle += 1;
        self.set_status(RequestStatus::UnderReview, now);
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// A single field-level constraint violation. Operations collect every
/// violation they can detect before failing, rather than stopping at the
/// first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
