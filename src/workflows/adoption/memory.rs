//! In-memory adapters: the default repository, blob store, and role
//! directory. The repository serializes every operation behind one mutex,
//! which is what makes each multi-row method an atomic unit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::documents::{BlobError, DocumentAttachment, DocumentBlobStore};
use super::domain::{AdoptionRequest, Cat, CatId, DocumentId, RequestId, RequestStatus, UserId};
use super::evaluation::Evaluation;
use super::repository::{RepositoryError, RequestFilter, ShelterRepository};
use super::roles::{Role, RoleDirectory, RoleSet};

#[derive(Debug, Default)]
struct ShelterState {
    cats: HashMap<CatId, Cat>,
    requests: HashMap<RequestId, AdoptionRequest>,
    evaluations: Vec<Evaluation>,
    documents: HashMap<DocumentId, DocumentAttachment>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryShelterRepository {
    state: Arc<Mutex<ShelterState>>,
}

impl MemoryShelterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ShelterState> {
        self.state.lock().expect("shelter repository mutex poisoned")
    }
}

fn active_for_cat(state: &ShelterState, cat: CatId) -> Option<&AdoptionRequest> {
    state
        .requests
        .values()
        .find(|request| request.cat == cat && request.is_active())
}

impl ShelterRepository for MemoryShelterRepository {
    fn insert_cat(&self, cat: Cat) -> Result<Cat, RepositoryError> {
        let mut state = self.lock();
        if state.cats.contains_key(&cat.id) {
            return Err(RepositoryError::Conflict);
        }
        state.cats.insert(cat.id, cat.clone());
        Ok(cat)
    }

    fn fetch_cat(&self, id: CatId) -> Result<Option<Cat>, RepositoryError> {
        Ok(self.lock().cats.get(&id).cloned())
    }

    fn list_cats(&self, only_available: bool) -> Result<Vec<Cat>, RepositoryError> {
        let state = self.lock();
        let mut cats: Vec<Cat> = state
            .cats
            .values()
            .filter(|cat| !only_available || cat.available)
            .cloned()
            .collect();
        cats.sort_by_key(|cat| cat.id);
        Ok(cats)
    }

    fn fetch_request(&self, id: RequestId) -> Result<Option<AdoptionRequest>, RepositoryError> {
        Ok(self.lock().requests.get(&id).cloned())
    }

    fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<AdoptionRequest>, RepositoryError> {
        let state = self.lock();
        let needle = filter.search.as_ref().map(|s| s.to_lowercase());
        let mut requests: Vec<AdoptionRequest> = state
            .requests
            .values()
            .filter(|request| filter.status.map_or(true, |status| request.status == status))
            .filter(|request| filter.adopter.map_or(true, |adopter| request.adopter == adopter))
            .filter(|request| filter.cat.map_or(true, |cat| request.cat == cat))
            .filter(|request| match &needle {
                Some(needle) => state
                    .cats
                    .get(&request.cat)
                    .map(|cat| cat.name.to_lowercase().contains(needle))
                    .unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect();
        requests.sort_by_key(|request| (request.created_at, request.id));
        Ok(requests)
    }

    fn active_request_for_cat(
        &self,
        cat: CatId,
    ) -> Result<Option<AdoptionRequest>, RepositoryError> {
        Ok(active_for_cat(&self.lock(), cat).cloned())
    }

    fn insert_request_holding_cat(
        &self,
        request: AdoptionRequest,
    ) -> Result<AdoptionRequest, RepositoryError> {
        let mut state = self.lock();
        if state.requests.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        // Availability is re-checked here, under the lock: of two racing
        // creates for the same cat, the second sees the flag already
        // cleared.
        {
            let cat = state.cats.get(&request.cat).ok_or(RepositoryError::NotFound)?;
            if !cat.available || active_for_cat(&state, request.cat).is_some() {
                return Err(RepositoryError::Conflict);
            }
        }
        state
            .cats
            .get_mut(&request.cat)
            .expect("cat existence checked above")
            .available = false;
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    fn update_request(
        &self,
        request: AdoptionRequest,
        expected: RequestStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let stored = state
            .requests
            .get_mut(&request.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.status != expected {
            return Err(RepositoryError::Conflict);
        }
        *stored = request;
        Ok(())
    }

    fn update_request_and_cat(
        &self,
        request: AdoptionRequest,
        expected: RequestStatus,
        cat_available: bool,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        {
            let stored = state
                .requests
                .get(&request.id)
                .ok_or(RepositoryError::NotFound)?;
            if stored.status != expected {
                return Err(RepositoryError::Conflict);
            }
        }
        state
            .cats
            .get_mut(&request.cat)
            .ok_or(RepositoryError::NotFound)?
            .available = cat_available;
        state.requests.insert(request.id, request);
        Ok(())
    }

    fn delete_request_releasing_cat(
        &self,
        id: RequestId,
        expected: RequestStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let cat = {
            let stored = state.requests.get(&id).ok_or(RepositoryError::NotFound)?;
            if stored.status != expected {
                return Err(RepositoryError::Conflict);
            }
            stored.cat
        };
        state
            .cats
            .get_mut(&cat)
            .ok_or(RepositoryError::NotFound)?
            .available = true;
        state.requests.remove(&id);
        // Row-level cascade, as a relational schema would do.
        state.evaluations.retain(|evaluation| evaluation.request != id);
        state.documents.retain(|_, document| document.request != id);
        Ok(())
    }

    fn record_evaluation(
        &self,
        request: AdoptionRequest,
        expected: RequestStatus,
        evaluation: Evaluation,
        cat_available: Option<bool>,
    ) -> Result<Evaluation, RepositoryError> {
        let mut state = self.lock();
        {
            let stored = state
                .requests
                .get(&request.id)
                .ok_or(RepositoryError::NotFound)?;
            if stored.status != expected {
                return Err(RepositoryError::Conflict);
            }
        }
        if let Some(available) = cat_available {
            state
                .cats
                .get_mut(&request.cat)
                .ok_or(RepositoryError::NotFound)?
                .available = available;
        }
        state.requests.insert(request.id, request);
        state.evaluations.push(evaluation.clone());
        Ok(evaluation)
    }

    fn evaluations_for(&self, request: RequestId) -> Result<Vec<Evaluation>, RepositoryError> {
        let state = self.lock();
        let mut evaluations: Vec<Evaluation> = state
            .evaluations
            .iter()
            .filter(|evaluation| evaluation.request == request)
            .cloned()
            .collect();
        evaluations.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then(b.id.cmp(&a.id)));
        Ok(evaluations)
    }

    fn insert_document(
        &self,
        document: DocumentAttachment,
    ) -> Result<DocumentAttachment, RepositoryError> {
        let mut state = self.lock();
        if state.documents.contains_key(&document.id) {
            return Err(RepositoryError::Conflict);
        }
        state.documents.insert(document.id, document.clone());
        Ok(document)
    }

    fn fetch_document(
        &self,
        id: DocumentId,
    ) -> Result<Option<DocumentAttachment>, RepositoryError> {
        Ok(self.lock().documents.get(&id).cloned())
    }

    fn update_document(&self, document: DocumentAttachment) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if !state.documents.contains_key(&document.id) {
            return Err(RepositoryError::NotFound);
        }
        state.documents.insert(document.id, document);
        Ok(())
    }

    fn delete_document(&self, id: DocumentId) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        state
            .documents
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn documents_for(
        &self,
        request: RequestId,
    ) -> Result<Vec<DocumentAttachment>, RepositoryError> {
        let state = self.lock();
        let mut documents: Vec<DocumentAttachment> = state
            .documents
            .values()
            .filter(|document| document.request == request)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id)));
        Ok(documents)
    }
}

/// Keyed byte storage backing document attachments.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .lock()
            .expect("blob store mutex poisoned")
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().expect("blob store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentBlobStore for MemoryBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        self.blobs
            .lock()
            .expect("blob store mutex poisoned")
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.blobs
            .lock()
            .expect("blob store mutex poisoned")
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BlobError::Missing(key.to_string()))
    }
}

/// Fixed user-id-to-capability mapping, the stand-in for the external user
/// directory.
#[derive(Debug, Default, Clone)]
pub struct StaticRoleDirectory {
    grants: HashMap<UserId, RoleSet>,
}

impl StaticRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, user: UserId, role: Role) -> Self {
        self.grants.entry(user).or_default().insert(role);
        self
    }
}

impl RoleDirectory for StaticRoleDirectory {
    fn roles_of(&self, user: UserId) -> RoleSet {
        self.grants.get(&user).cloned().unwrap_or_default()
    }
}
