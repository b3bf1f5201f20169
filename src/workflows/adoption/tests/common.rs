use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value;

use crate::workflows::adoption::documents::{BlobError, DocumentBlobStore, DocumentUpload};
use crate::workflows::adoption::domain::{AdoptionRequest, Cat, Decision, UserId};
use crate::workflows::adoption::memory::{
    MemoryBlobStore, MemoryShelterRepository, StaticRoleDirectory,
};
use crate::workflows::adoption::roles::{Role, RoleDirectory, RoleSet};
use crate::workflows::adoption::service::AdoptionService;

pub(super) const ADOPTER: UserId = UserId(101);
pub(super) const OTHER_ADOPTER: UserId = UserId(102);
pub(super) const COORDINATOR: UserId = UserId(201);
pub(super) const SECOND_COORDINATOR: UserId = UserId(202);
pub(super) const STRANGER: UserId = UserId(999);

pub(super) type MemoryService =
    AdoptionService<MemoryShelterRepository, MemoryBlobStore, StaticRoleDirectory>;

pub(super) fn directory() -> StaticRoleDirectory {
    StaticRoleDirectory::default()
        .grant(ADOPTER, Role::Adopter)
        .grant(OTHER_ADOPTER, Role::Adopter)
        .grant(COORDINATOR, Role::Coordinator)
        .grant(SECOND_COORDINATOR, Role::Coordinator)
}

pub(super) fn build_service() -> (
    MemoryService,
    Arc<MemoryShelterRepository>,
    Arc<MemoryBlobStore>,
) {
    let repository = Arc::new(MemoryShelterRepository::default());
    let blobs = Arc::new(MemoryBlobStore::default());
    let service = AdoptionService::new(repository.clone(), blobs.clone(), Arc::new(directory()));
    (service, repository, blobs)
}

pub(super) fn registered_cat(service: &MemoryService) -> Cat {
    service.register_cat("Frajola").expect("cat registers")
}

pub(super) fn editing_request(service: &MemoryService) -> (AdoptionRequest, Cat) {
    editing_request_with(service)
}

pub(super) fn editing_request_with<B: DocumentBlobStore + 'static>(
    service: &AdoptionService<MemoryShelterRepository, B, StaticRoleDirectory>,
) -> (AdoptionRequest, Cat) {
    let cat = service.register_cat("Frajola").expect("cat registers");
    let request = service
        .create_request(ADOPTER, cat.id)
        .expect("request opens");
    (request, cat)
}

pub(super) fn under_review_request(service: &MemoryService) -> (AdoptionRequest, Cat) {
    let (request, cat) = editing_request(service);
    let request = service.submit_request(request.id).expect("request submits");
    (request, cat)
}

pub(super) fn rejected_request(service: &MemoryService) -> (AdoptionRequest, Cat) {
    let (request, cat) = under_review_request(service);
    let (request, _) = service
        .evaluate_request(
            request.id,
            COORDINATOR,
            "household does not meet the placement criteria",
            Decision::Reject,
        )
        .expect("rejection records");
    (request, cat)
}

pub(super) fn upload(file_name: &str, bytes: &[u8]) -> DocumentUpload {
    DocumentUpload {
        file_name: file_name.to_string(),
        bytes: bytes.to_vec(),
        description: None,
    }
}

pub(super) fn pdf_upload(file_name: &str) -> DocumentUpload {
    upload(file_name, b"%PDF-1.4 minimal body")
}

/// Blob store double whose failure modes can be toggled per test; writes
/// that succeed land in the wrapped in-memory store.
pub(super) struct FlakyBlobStore {
    pub(super) inner: MemoryBlobStore,
    pub(super) fail_put: bool,
    pub(super) fail_delete: bool,
}

impl FlakyBlobStore {
    pub(super) fn failing_puts() -> Self {
        Self {
            inner: MemoryBlobStore::default(),
            fail_put: true,
            fail_delete: false,
        }
    }

    pub(super) fn failing_deletes() -> Self {
        Self {
            inner: MemoryBlobStore::default(),
            fail_put: false,
            fail_delete: true,
        }
    }
}

impl DocumentBlobStore for FlakyBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        if self.fail_put {
            return Err(BlobError::Unavailable("blob store offline".to_string()));
        }
        self.inner.put(key, bytes)
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        if self.fail_delete {
            return Err(BlobError::Unavailable("blob store offline".to_string()));
        }
        self.inner.delete(key)
    }
}

/// Directory double that counts lookups, for cache memoization tests.
#[derive(Default)]
pub(super) struct CountingDirectory {
    pub(super) lookups: AtomicUsize,
}

impl RoleDirectory for CountingDirectory {
    fn roles_of(&self, user: UserId) -> RoleSet {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if user == COORDINATOR {
            RoleSet::of([Role::Coordinator])
        } else {
            RoleSet::empty()
        }
    }
}

pub(super) fn assert_conflict_response(response: &Response) {
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
