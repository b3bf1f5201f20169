//! Adoption-request lifecycle: intake, review, appeal, cancellation, and
//! the cat-availability bookkeeping tied to each transition.
//!
//! The service facade ([`AdoptionService`]) owns every status transition;
//! evaluations and document attachments are only ever mutated through it,
//! so no evaluation exists without its transition and no attachment
//! outlives its edit window rules.

pub mod documents;
pub mod domain;
pub mod evaluation;
pub mod memory;
pub mod report;
pub mod repository;
pub mod roles;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use documents::{
    BatchUploadOutcome, BlobError, DocumentAttachment, DocumentBlobStore, DocumentUpload,
    RejectedUpload, MAX_DOCUMENT_BYTES,
};
pub use domain::{
    AdoptionRequest, Cat, CatId, Decision, DocumentId, EvaluationId, RequestId, RequestStatus,
    UserId, ValidationIssue,
};
pub use evaluation::{Evaluation, MIN_OPINION_LEN};
pub use memory::{MemoryBlobStore, MemoryShelterRepository, StaticRoleDirectory};
pub use report::{write_overdue_csv, RequestStatistics};
pub use repository::{RepositoryError, RequestFilter, ShelterRepository};
pub use roles::{Role, RoleCache, RoleDirectory, RoleSet};
pub use router::adoption_router;
pub use service::{AdoptionError, AdoptionService, DEFAULT_REVIEW_SLA_DAYS, MIN_APPEAL_REASON_LEN};
