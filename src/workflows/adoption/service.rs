use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::documents::{
    self, BatchUploadOutcome, BlobError, DocumentAttachment, DocumentBlobStore, DocumentUpload,
    RejectedUpload,
};
use super::domain::{
    AdoptionRequest, Cat, CatId, Decision, DocumentId, RequestId, RequestStatus, UserId,
    ValidationIssue,
};
use super::evaluation::{self, Evaluation};
use super::report::{self, RequestStatistics};
use super::repository::{RepositoryError, RequestFilter, ShelterRepository};
use super::roles::{Role, RoleDirectory};

/// Days a request may sit in review or appeal before the reports flag it.
pub const DEFAULT_REVIEW_SLA_DAYS: i64 = 7;

/// Minimum length of an appeal justification, after trimming.
pub const MIN_APPEAL_REASON_LEN: usize = 10;

static CAT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static EVALUATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static DOCUMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_cat_id() -> CatId {
    CatId(CAT_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

fn next_request_id() -> RequestId {
    RequestId(REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

fn next_evaluation_id() -> super::domain::EvaluationId {
    super::domain::EvaluationId(EVALUATION_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

fn next_document_id() -> DocumentId {
    DocumentId(DOCUMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// The request lifecycle engine: owns every status transition and the cat
/// availability side effects that go with it.
pub struct AdoptionService<S, B, D> {
    repository: Arc<S>,
    blobs: Arc<B>,
    directory: Arc<D>,
    review_sla: Duration,
}

impl<S, B, D> AdoptionService<S, B, D>
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    pub fn new(repository: Arc<S>, blobs: Arc<B>, directory: Arc<D>) -> Self {
        Self {
            repository,
            blobs,
            directory,
            review_sla: Duration::days(DEFAULT_REVIEW_SLA_DAYS),
        }
    }

    pub fn with_review_sla_days(mut self, days: i64) -> Self {
        self.review_sla = Duration::days(days);
        self
    }

    pub fn review_sla(&self) -> Duration {
        self.review_sla
    }

    fn require_request(&self, id: RequestId) -> Result<AdoptionRequest, AdoptionError> {
        self.repository
            .fetch_request(id)?
            .ok_or(AdoptionError::NotFound { entity: "request" })
    }

    fn require_role(
        &self,
        user: UserId,
        role: Role,
        entity: &'static str,
    ) -> Result<(), AdoptionError> {
        if self.directory.roles_of(user).contains(role) {
            Ok(())
        } else {
            Err(AdoptionError::NotFound { entity })
        }
    }

    /// A compare-and-set write that lost its race is a conflict the caller
    /// may retry, not a storage fault.
    fn commit_conflict(err: RepositoryError) -> AdoptionError {
        match err {
            RepositoryError::Conflict => {
                AdoptionError::Conflict("the request was modified concurrently".to_string())
            }
            other => AdoptionError::from(other),
        }
    }

    // ---- catalog (narrow contract: existence and availability only) ----

    pub fn register_cat(&self, name: &str) -> Result<Cat, AdoptionError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(AdoptionError::Validation(vec![ValidationIssue::new(
                "name",
                "cat name must not be empty",
            )]));
        }
        let cat = Cat {
            id: next_cat_id(),
            name: trimmed.to_string(),
            available: true,
        };
        Ok(self.repository.insert_cat(cat)?)
    }

    pub fn list_cats(&self, only_available: bool) -> Result<Vec<Cat>, AdoptionError> {
        Ok(self.repository.list_cats(only_available)?)
    }

    // ---- lifecycle ----

    /// Open a request in `Editing` and pull the cat off the pool, as one
    /// atomic unit. Availability is re-checked inside that unit, so of two
    /// racing creates exactly one succeeds.
    pub fn create_request(
        &self,
        adopter: UserId,
        cat: CatId,
    ) -> Result<AdoptionRequest, AdoptionError> {
        self.require_role(adopter, Role::Adopter, "adopter")?;
        let listed = self
            .repository
            .fetch_cat(cat)?
            .ok_or(AdoptionError::NotFound { entity: "cat" })?;
        if !listed.available {
            return Err(AdoptionError::Conflict(
                "this cat is not available for adoption".to_string(),
            ));
        }
        if self.repository.active_request_for_cat(cat)?.is_some() {
            return Err(AdoptionError::Conflict(
                "an active request already exists for this cat".to_string(),
            ));
        }

        let request = AdoptionRequest::new(next_request_id(), adopter, cat, Utc::now());
        let request = self
            .repository
            .insert_request_holding_cat(request)
            .map_err(|err| match err {
                RepositoryError::Conflict => AdoptionError::Conflict(
                    "an active request already exists for this cat".to_string(),
                ),
                other => AdoptionError::from(other),
            })?;
        info!(request = %request.id, cat = %cat, adopter = %adopter, "adoption request opened");
        Ok(request)
    }

    /// `Editing` -> `UnderReview`.
    pub fn submit_request(&self, id: RequestId) -> Result<AdoptionRequest, AdoptionError> {
        let mut request = self.require_request(id)?;
        let previous = request.status;
        if previous != RequestStatus::Editing {
            return Err(invalid_state("editing", previous));
        }
        request.begin_review(Utc::now());
        self.repository
            .update_request(request.clone(), previous)
            .map_err(Self::commit_conflict)?;
        info!(request = %request.id, cycle = request.review_cycle, "request submitted for review");
        Ok(request)
    }

    /// Record a coordinator opinion and settle the review: approval keeps
    /// the cat off the pool for good, rejection releases it. One atomic
    /// unit covers the evaluation row, the status change, and the flag.
    pub fn evaluate_request(
        &self,
        id: RequestId,
        coordinator: UserId,
        opinion: &str,
        decision: Decision,
    ) -> Result<(AdoptionRequest, Evaluation), AdoptionError> {
        let mut request = self.require_request(id)?;
        let previous = request.status;
        if previous != RequestStatus::UnderReview {
            return Err(invalid_state("under_review", previous));
        }
        self.require_role(coordinator, Role::Coordinator, "coordinator")?;

        let now = Utc::now();
        let evaluation = evaluation::draft(
            next_evaluation_id(),
            request.id,
            coordinator,
            opinion,
            request.review_cycle,
            now,
        )
        .map_err(|issue| AdoptionError::Validation(vec![issue]))?;

        let cat_available = match decision {
            Decision::Approve => {
                request.set_status(RequestStatus::Approved, now);
                None
            }
            Decision::Reject => {
                request.set_status(RequestStatus::Rejected, now);
                Some(true)
            }
        };

        let evaluation = self
            .repository
            .record_evaluation(request.clone(), previous, evaluation, cat_available)
            .map_err(Self::commit_conflict)?;
        info!(
            request = %request.id,
            coordinator = %coordinator,
            status = %request.status,
            "request evaluated"
        );
        Ok((request, evaluation))
    }

    /// `Rejected` -> `Appealing`, allowed once per request. The stored
    /// reason is what blocks a second appeal, independent of status.
    pub fn lodge_appeal(
        &self,
        id: RequestId,
        reason: &str,
    ) -> Result<AdoptionRequest, AdoptionError> {
        let mut request = self.require_request(id)?;
        let previous = request.status;
        if previous != RequestStatus::Rejected {
            return Err(invalid_state("rejected", previous));
        }
        if request.appeal_reason.is_some() {
            return Err(AdoptionError::InvalidState {
                expected: "a rejection that has not been appealed before",
                actual: "already appealed",
            });
        }
        let reason = validated_appeal_reason(reason)?;

        let now = Utc::now();
        request.appeal_reason = Some(reason);
        request.set_status(RequestStatus::Appealing, now);
        // The cat leaves the pool again while the appeal is open.
        self.repository
            .update_request_and_cat(request.clone(), previous, false)
            .map_err(Self::commit_conflict)?;
        info!(request = %request.id, "appeal lodged");
        Ok(request)
    }

    /// `Appealing` -> `UnderReview`, starting a new review cycle.
    pub fn submit_appeal(&self, id: RequestId) -> Result<AdoptionRequest, AdoptionError> {
        let mut request = self.require_request(id)?;
        let previous = request.status;
        if previous != RequestStatus::Appealing {
            return Err(invalid_state("appealing", previous));
        }
        match request.appeal_reason.as_deref() {
            Some(reason) if reason.trim().len() >= MIN_APPEAL_REASON_LEN => {}
            _ => {
                return Err(AdoptionError::Validation(vec![ValidationIssue::new(
                    "appeal_reason",
                    "an appeal reason is required before resubmitting",
                )]))
            }
        }
        request.begin_review(Utc::now());
        self.repository
            .update_request(request.clone(), previous)
            .map_err(Self::commit_conflict)?;
        info!(request = %request.id, cycle = request.review_cycle, "appeal sent to review");
        Ok(request)
    }

    /// Overwrite the appeal justification while the appeal is open.
    pub fn update_appeal_reason(
        &self,
        id: RequestId,
        reason: &str,
    ) -> Result<AdoptionRequest, AdoptionError> {
        let mut request = self.require_request(id)?;
        let previous = request.status;
        if previous != RequestStatus::Appealing {
            return Err(invalid_state("appealing", previous));
        }
        request.appeal_reason = Some(validated_appeal_reason(reason)?);
        request.touch(Utc::now());
        self.repository
            .update_request(request.clone(), previous)
            .map_err(Self::commit_conflict)?;
        Ok(request)
    }

    /// Delete the request and return the cat to the pool. Only editable
    /// statuses may be cancelled; anything else fails before any write, so
    /// the availability flag is untouched.
    pub fn cancel_request(&self, id: RequestId) -> Result<(), AdoptionError> {
        let request = self.require_request(id)?;
        if !request.status.is_editable() {
            return Err(invalid_state("editing or appealing", request.status));
        }
        self.repository
            .delete_request_releasing_cat(request.id, request.status)
            .map_err(Self::commit_conflict)?;
        info!(request = %request.id, cat = %request.cat, "request cancelled, cat released");
        Ok(())
    }

    // ---- capability predicates for the presentation layer ----

    /// Owning adopter, editable status. Missing requests answer `false`.
    pub fn can_edit(&self, id: RequestId, user: UserId) -> Result<bool, AdoptionError> {
        Ok(self
            .repository
            .fetch_request(id)?
            .map(|request| request.adopter == user && request.status.is_editable())
            .unwrap_or(false))
    }

    /// Under review, coordinator capability, and no evaluation by this
    /// coordinator in the current review cycle. Evaluations from earlier
    /// cycles persist but do not block.
    pub fn can_evaluate(
        &self,
        id: RequestId,
        coordinator: UserId,
    ) -> Result<bool, AdoptionError> {
        let Some(request) = self.repository.fetch_request(id)? else {
            return Ok(false);
        };
        if request.status != RequestStatus::UnderReview {
            return Ok(false);
        }
        if !self.directory.roles_of(coordinator).contains(Role::Coordinator) {
            return Ok(false);
        }
        let evaluations = self.repository.evaluations_for(id)?;
        Ok(!evaluations.iter().any(|evaluation| {
            evaluation.coordinator == coordinator
                && evaluation.review_cycle == request.review_cycle
        }))
    }

    // ---- queries and reporting ----

    pub fn get_request(&self, id: RequestId) -> Result<AdoptionRequest, AdoptionError> {
        self.require_request(id)
    }

    pub fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<AdoptionRequest>, AdoptionError> {
        Ok(self.repository.list_requests(filter)?)
    }

    pub fn evaluations(&self, id: RequestId) -> Result<Vec<Evaluation>, AdoptionError> {
        self.require_request(id)?;
        Ok(self.repository.evaluations_for(id)?)
    }

    pub fn overdue_requests(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AdoptionRequest>, AdoptionError> {
        let mut requests = self.repository.list_requests(&RequestFilter::default())?;
        requests.retain(|request| request.is_overdue(now, self.review_sla));
        Ok(requests)
    }

    pub fn statistics(&self, now: DateTime<Utc>) -> Result<RequestStatistics, AdoptionError> {
        let requests = self.repository.list_requests(&RequestFilter::default())?;
        Ok(report::compile_statistics(&requests, now, self.review_sla))
    }

    // ---- document attachments ----

    /// Store a batch of uploads against an editable request. Each file is
    /// validated on its own; valid files are stored and invalid ones come
    /// back in `rejected`, never all-or-nothing.
    pub fn attach_documents(
        &self,
        id: RequestId,
        uploads: Vec<DocumentUpload>,
        base_description: Option<&str>,
    ) -> Result<BatchUploadOutcome, AdoptionError> {
        let request = self.require_request(id)?;
        if !request.status.is_editable() {
            return Err(invalid_state("editing or appealing", request.status));
        }
        if uploads.is_empty() {
            return Err(AdoptionError::Validation(vec![ValidationIssue::new(
                "files",
                "no file was selected",
            )]));
        }

        let total = uploads.len();
        let mut outcome = BatchUploadOutcome::default();
        for (index, upload) in uploads.into_iter().enumerate() {
            if let Err(issue) = documents::validate_upload(&upload) {
                outcome.rejected.push(RejectedUpload {
                    file_name: upload.file_name,
                    reason: issue.message,
                });
                continue;
            }

            let doc_id = next_document_id();
            let storage_key = format!("requests/{}/{}-{}", request.id, doc_id, upload.file_name);
            let description = upload
                .description
                .clone()
                .unwrap_or_else(|| {
                    documents::describe(base_description, index, &upload.file_name, total)
                });
            let document = DocumentAttachment {
                id: doc_id,
                request: request.id,
                file_name: upload.file_name.clone(),
                content_type: documents::content_type_of(&upload.file_name),
                size_bytes: upload.bytes.len(),
                storage_key: storage_key.clone(),
                description,
                uploaded_at: Utc::now(),
            };

            if let Err(err) = self.blobs.put(&storage_key, &upload.bytes) {
                outcome.rejected.push(RejectedUpload {
                    file_name: upload.file_name,
                    reason: err.to_string(),
                });
                continue;
            }
            match self.repository.insert_document(document) {
                Ok(stored) => outcome.stored.push(stored),
                Err(err) => {
                    // Do not leave a blob without its record.
                    let _ = self.blobs.delete(&storage_key);
                    outcome.rejected.push(RejectedUpload {
                        file_name: upload.file_name,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(outcome)
    }

    pub fn documents(&self, id: RequestId) -> Result<Vec<DocumentAttachment>, AdoptionError> {
        self.require_request(id)?;
        Ok(self.repository.documents_for(id)?)
    }

    fn managed_document(
        &self,
        id: DocumentId,
        requester: UserId,
    ) -> Result<DocumentAttachment, AdoptionError> {
        let document = self
            .repository
            .fetch_document(id)?
            .ok_or(AdoptionError::NotFound { entity: "document" })?;
        let request = self.require_request(document.request)?;
        if request.adopter != requester {
            return Err(AdoptionError::Validation(vec![ValidationIssue::new(
                "requester",
                "only the owning adopter may manage documents",
            )]));
        }
        if !request.status.is_editable() {
            return Err(invalid_state("editing or appealing", request.status));
        }
        Ok(document)
    }

    /// Blob first, then the record; if the blob deletion fails the record
    /// stays so no reference dangles.
    pub fn remove_document(
        &self,
        id: DocumentId,
        requester: UserId,
    ) -> Result<(), AdoptionError> {
        let document = self.managed_document(id, requester)?;
        self.blobs.delete(&document.storage_key)?;
        self.repository.delete_document(document.id)?;
        Ok(())
    }

    pub fn update_document_description(
        &self,
        id: DocumentId,
        description: &str,
        requester: UserId,
    ) -> Result<DocumentAttachment, AdoptionError> {
        let mut document = self.managed_document(id, requester)?;
        document.description = description.trim().to_string();
        self.repository.update_document(document.clone())?;
        Ok(document)
    }
}

fn invalid_state(expected: &'static str, actual: RequestStatus) -> AdoptionError {
    AdoptionError::InvalidState {
        expected,
        actual: actual.label(),
    }
}

fn validated_appeal_reason(reason: &str) -> Result<String, AdoptionError> {
    let trimmed = reason.trim();
    if trimmed.len() < MIN_APPEAL_REASON_LEN {
        return Err(AdoptionError::Validation(vec![ValidationIssue::new(
            "appeal_reason",
            format!("the appeal reason must be at least {MIN_APPEAL_REASON_LEN} characters"),
        )]));
    }
    Ok(trimmed.to_string())
}

fn issue_summary(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures raised by the adoption workflow.
#[derive(Debug, thiserror::Error)]
pub enum AdoptionError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("validation failed: {}", issue_summary(.0))]
    Validation(Vec<ValidationIssue>),
    #[error("operation requires a request in {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Blob(#[from] BlobError),
}
