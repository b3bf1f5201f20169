//! Storage abstraction for the adoption workflow.
//!
//! Every lifecycle mutation that touches more than one row (creating a
//! request while holding its cat, recording an evaluation with its status
//! change, releasing a cat on appeal or cancellation) is a single trait
//! method, so an implementation can execute it as one atomic unit. Write
//! methods take the status the caller last observed and fail with
//! [`RepositoryError::Conflict`] when the stored row has moved on, which
//! is how a racing concurrent call surfaces to the caller.

use thiserror::Error;

use super::documents::DocumentAttachment;
use super::domain::{AdoptionRequest, Cat, CatId, DocumentId, RequestId, RequestStatus, UserId};
use super::evaluation::Evaluation;

/// Optional criteria for request listings.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub adopter: Option<UserId>,
    pub cat: Option<CatId>,
    /// Case-insensitive match against the cat's display name.
    pub search: Option<String>,
}

pub trait ShelterRepository: Send + Sync {
    fn insert_cat(&self, cat: Cat) -> Result<Cat, RepositoryError>;
    fn fetch_cat(&self, id: CatId) -> Result<Option<Cat>, RepositoryError>;
    fn list_cats(&self, only_available: bool) -> Result<Vec<Cat>, RepositoryError>;

    fn fetch_request(&self, id: RequestId) -> Result<Option<AdoptionRequest>, RepositoryError>;
    /// Requests ordered by creation time, oldest first.
    fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<AdoptionRequest>, RepositoryError>;
    fn active_request_for_cat(
        &self,
        cat: CatId,
    ) -> Result<Option<AdoptionRequest>, RepositoryError>;

    /// Insert a new request and clear its cat's availability as one unit.
    /// The availability and no-active-request checks run again inside the
    /// unit; two racing creates for one cat yield exactly one success.
    fn insert_request_holding_cat(
        &self,
        request: AdoptionRequest,
    ) -> Result<AdoptionRequest, RepositoryError>;

    fn update_request(
        &self,
        request: AdoptionRequest,
        expected: RequestStatus,
    ) -> Result<(), RepositoryError>;

    /// Update the request and set its cat's availability as one unit.
    fn update_request_and_cat(
        &self,
        request: AdoptionRequest,
        expected: RequestStatus,
        cat_available: bool,
    ) -> Result<(), RepositoryError>;

    /// Delete the request and mark its cat available again as one unit.
    fn delete_request_releasing_cat(
        &self,
        id: RequestId,
        expected: RequestStatus,
    ) -> Result<(), RepositoryError>;

    /// Persist an evaluation together with the status change it justifies
    /// (and the cat release on rejection) as one unit.
    fn record_evaluation(
        &self,
        request: AdoptionRequest,
        expected: RequestStatus,
        evaluation: Evaluation,
        cat_available: Option<bool>,
    ) -> Result<Evaluation, RepositoryError>;

    /// Evaluations for a request, newest first.
    fn evaluations_for(&self, request: RequestId) -> Result<Vec<Evaluation>, RepositoryError>;

    fn insert_document(
        &self,
        document: DocumentAttachment,
    ) -> Result<DocumentAttachment, RepositoryError>;
    fn fetch_document(&self, id: DocumentId)
        -> Result<Option<DocumentAttachment>, RepositoryError>;
    fn update_document(&self, document: DocumentAttachment) -> Result<(), RepositoryError>;
    fn delete_document(&self, id: DocumentId) -> Result<(), RepositoryError>;
    /// Attachments for a request, newest first.
    fn documents_for(
        &self,
        request: RequestId,
    ) -> Result<Vec<DocumentAttachment>, RepositoryError>;
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record already exists or was changed concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
