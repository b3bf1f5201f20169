use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::documents::{
    DocumentAttachment, DocumentBlobStore, DocumentUpload, RejectedUpload,
};
use super::domain::{
    AdoptionRequest, CatId, Decision, DocumentId, RequestId, RequestStatus, UserId,
    ValidationIssue,
};
use super::evaluation::Evaluation;
use super::report;
use super::repository::{RepositoryError, RequestFilter, ShelterRepository};
use super::roles::RoleDirectory;
use super::service::{AdoptionError, AdoptionService};

/// Uploads are validated per file at 10 MiB; the transport limit sits
/// above that so oversized files are rejected with a reason instead of a
/// dropped connection.
const UPLOAD_BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Router builder exposing the adoption workflow over HTTP.
pub fn adoption_router<S, B, D>(service: Arc<AdoptionService<S, B, D>>) -> Router
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/adoptions",
            post(create_handler::<S, B, D>).get(list_handler::<S, B, D>),
        )
        .route(
            "/api/v1/adoptions/:request_id",
            get(get_handler::<S, B, D>).delete(cancel_handler::<S, B, D>),
        )
        .route(
            "/api/v1/adoptions/:request_id/submit",
            post(submit_handler::<S, B, D>),
        )
        .route(
            "/api/v1/adoptions/:request_id/evaluations",
            post(evaluate_handler::<S, B, D>).get(evaluations_handler::<S, B, D>),
        )
        .route(
            "/api/v1/adoptions/:request_id/appeal",
            post(appeal_handler::<S, B, D>).put(update_appeal_handler::<S, B, D>),
        )
        .route(
            "/api/v1/adoptions/:request_id/appeal/submit",
            post(submit_appeal_handler::<S, B, D>),
        )
        .route(
            "/api/v1/adoptions/:request_id/permissions",
            get(permissions_handler::<S, B, D>),
        )
        .route(
            "/api/v1/adoptions/:request_id/documents",
            post(upload_documents_handler::<S, B, D>)
                .get(list_documents_handler::<S, B, D>)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/api/v1/documents/:document_id",
            patch(update_document_handler::<S, B, D>).delete(remove_document_handler::<S, B, D>),
        )
        .route(
            "/api/v1/reports/statistics",
            get(statistics_handler::<S, B, D>),
        )
        .route("/api/v1/reports/overdue", get(overdue_handler::<S, B, D>))
        .route(
            "/api/v1/reports/overdue.csv",
            get(overdue_csv_handler::<S, B, D>),
        )
        .route(
            "/api/v1/cats",
            post(register_cat_handler::<S, B, D>).get(list_cats_handler::<S, B, D>),
        )
        .with_state(service)
}

// ---- request and response bodies ----

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRequestBody {
    pub(crate) adopter_id: u64,
    pub(crate) cat_id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EvaluateBody {
    pub(crate) coordinator_id: u64,
    pub(crate) opinion: String,
    pub(crate) decision: Decision,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AppealBody {
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentUpdateBody {
    pub(crate) requester_id: u64,
    pub(crate) description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterCatBody {
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    pub(crate) status: Option<String>,
    pub(crate) adopter: Option<u64>,
    pub(crate) cat: Option<u64>,
    pub(crate) search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserQuery {
    pub(crate) user: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RequesterQuery {
    pub(crate) requester: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CatListQuery {
    #[serde(default)]
    pub(crate) available: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct RequestView {
    pub(crate) id: RequestId,
    pub(crate) adopter_id: UserId,
    pub(crate) cat_id: CatId,
    pub(crate) status: RequestStatus,
    pub(crate) appeal_reason: Option<String>,
    pub(crate) review_cycle: u32,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) status_entered_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) overdue: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct EvaluationView {
    pub(crate) id: u64,
    pub(crate) coordinator_id: UserId,
    pub(crate) opinion: String,
    pub(crate) review_cycle: u32,
    pub(crate) recorded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EvaluationOutcomeView {
    pub(crate) request: RequestView,
    pub(crate) evaluation: EvaluationView,
}

#[derive(Debug, Serialize)]
pub(crate) struct DocumentView {
    pub(crate) id: DocumentId,
    pub(crate) request_id: RequestId,
    pub(crate) file_name: String,
    pub(crate) content_type: String,
    pub(crate) size_bytes: usize,
    pub(crate) description: String,
    pub(crate) uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadOutcomeView {
    pub(crate) stored: Vec<DocumentView>,
    pub(crate) rejected: Vec<RejectedUpload>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PermissionsView {
    pub(crate) can_edit: bool,
    pub(crate) can_evaluate: bool,
}

fn evaluation_view(evaluation: Evaluation) -> EvaluationView {
    EvaluationView {
        id: evaluation.id.0,
        coordinator_id: evaluation.coordinator,
        opinion: evaluation.opinion,
        review_cycle: evaluation.review_cycle,
        recorded_at: evaluation.recorded_at,
    }
}

fn document_view(document: DocumentAttachment) -> DocumentView {
    DocumentView {
        id: document.id,
        request_id: document.request,
        file_name: document.file_name,
        content_type: document.content_type,
        size_bytes: document.size_bytes,
        description: document.description,
        uploaded_at: document.uploaded_at,
    }
}

fn error_response(err: AdoptionError) -> Response {
    let status = match &err {
        AdoptionError::NotFound { .. } | AdoptionError::Repository(RepositoryError::NotFound) => {
            StatusCode::NOT_FOUND
        }
        AdoptionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AdoptionError::InvalidState { .. }
        | AdoptionError::Conflict(_)
        | AdoptionError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        AdoptionError::Repository(RepositoryError::Unavailable(_)) | AdoptionError::Blob(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = match &err {
        AdoptionError::Validation(issues) => json!({
            "error": err.to_string(),
            "issues": issues,
        }),
        _ => json!({ "error": err.to_string() }),
    };
    (status, Json(payload)).into_response()
}

fn validation_response(issue: ValidationIssue) -> Response {
    error_response(AdoptionError::Validation(vec![issue]))
}

// ---- handlers ----

async fn create_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Json(body): Json<CreateRequestBody>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.create_request(UserId(body.adopter_id), CatId(body.cat_id)) {
        Ok(request) => {
            let view = request_view(&service, request);
            (StatusCode::CREATED, Json(view)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn list_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    let status = match query.status.as_deref() {
        None => None,
        Some(label) => match RequestStatus::from_label(label) {
            Some(status) => Some(status),
            None => {
                return validation_response(ValidationIssue::new(
                    "status",
                    format!("unknown status '{label}'"),
                ))
            }
        },
    };
    let filter = RequestFilter {
        status,
        adopter: query.adopter.map(UserId),
        cat: query.cat.map(CatId),
        search: query.search,
    };
    match service.list_requests(&filter) {
        Ok(requests) => {
            let views: Vec<_> = requests
                .into_iter()
                .map(|request| request_view(&service, request))
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn get_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(request_id): Path<u64>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.get_request(RequestId(request_id)) {
        Ok(request) => (StatusCode::OK, Json(request_view(&service, request))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn submit_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(request_id): Path<u64>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.submit_request(RequestId(request_id)) {
        Ok(request) => (StatusCode::OK, Json(request_view(&service, request))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn evaluate_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(request_id): Path<u64>,
    Json(body): Json<EvaluateBody>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.evaluate_request(
        RequestId(request_id),
        UserId(body.coordinator_id),
        &body.opinion,
        body.decision,
    ) {
        Ok((request, evaluation)) => {
            let view = EvaluationOutcomeView {
                request: request_view(&service, request),
                evaluation: evaluation_view(evaluation),
            };
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn evaluations_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(request_id): Path<u64>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.evaluations(RequestId(request_id)) {
        Ok(evaluations) => {
            let views: Vec<_> = evaluations.into_iter().map(evaluation_view).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn appeal_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(request_id): Path<u64>,
    Json(body): Json<AppealBody>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.lodge_appeal(RequestId(request_id), &body.reason) {
        Ok(request) => (StatusCode::OK, Json(request_view(&service, request))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn update_appeal_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(request_id): Path<u64>,
    Json(body): Json<AppealBody>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.update_appeal_reason(RequestId(request_id), &body.reason) {
        Ok(request) => (StatusCode::OK, Json(request_view(&service, request))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn submit_appeal_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(request_id): Path<u64>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.submit_appeal(RequestId(request_id)) {
        Ok(request) => (StatusCode::OK, Json(request_view(&service, request))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn cancel_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(request_id): Path<u64>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.cancel_request(RequestId(request_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

async fn permissions_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(request_id): Path<u64>,
    Query(query): Query<UserQuery>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    let id = RequestId(request_id);
    let user = UserId(query.user);
    let can_edit = match service.can_edit(id, user) {
        Ok(allowed) => allowed,
        Err(err) => return error_response(err),
    };
    let can_evaluate = match service.can_evaluate(id, user) {
        Ok(allowed) => allowed,
        Err(err) => return error_response(err),
    };
    (
        StatusCode::OK,
        Json(PermissionsView {
            can_edit,
            can_evaluate,
        }),
    )
        .into_response()
}

async fn upload_documents_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(request_id): Path<u64>,
    mut multipart: Multipart,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    let mut uploads = Vec::new();
    let mut base_description: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return validation_response(ValidationIssue::new("body", err.to_string()))
            }
        };
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("description") => match field.text().await {
                Ok(text) => base_description = Some(text),
                Err(err) => {
                    return validation_response(ValidationIssue::new(
                        "description",
                        err.to_string(),
                    ))
                }
            },
            Some("file") => {
                let file_name = field.file_name().unwrap_or("unnamed").to_string();
                match field.bytes().await {
                    Ok(bytes) => uploads.push(DocumentUpload {
                        file_name,
                        bytes: bytes.to_vec(),
                        description: None,
                    }),
                    Err(err) => {
                        return validation_response(ValidationIssue::new(
                            file_name,
                            err.to_string(),
                        ))
                    }
                }
            }
            _ => {}
        }
    }

    match service.attach_documents(RequestId(request_id), uploads, base_description.as_deref()) {
        Ok(outcome) => {
            let view = UploadOutcomeView {
                stored: outcome.stored.into_iter().map(document_view).collect(),
                rejected: outcome.rejected,
            };
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn list_documents_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(request_id): Path<u64>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.documents(RequestId(request_id)) {
        Ok(documents) => {
            let views: Vec<_> = documents.into_iter().map(document_view).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn update_document_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(document_id): Path<u64>,
    Json(body): Json<DocumentUpdateBody>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.update_document_description(
        DocumentId(document_id),
        &body.description,
        UserId(body.requester_id),
    ) {
        Ok(document) => (StatusCode::OK, Json(document_view(document))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn remove_document_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Path(document_id): Path<u64>,
    Query(query): Query<RequesterQuery>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.remove_document(DocumentId(document_id), UserId(query.requester)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

async fn statistics_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.statistics(Utc::now()) {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn overdue_handler<S, B, D>(State(service): State<Arc<AdoptionService<S, B, D>>>) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.overdue_requests(Utc::now()) {
        Ok(requests) => {
            let views: Vec<_> = requests
                .into_iter()
                .map(|request| request_view(&service, request))
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn overdue_csv_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    let now = Utc::now();
    let requests = match service.overdue_requests(now) {
        Ok(requests) => requests,
        Err(err) => return error_response(err),
    };

    let mut buffer = Cursor::new(Vec::new());
    if let Err(err) = report::write_overdue_csv(&mut buffer, &requests, now) {
        let payload = json!({ "error": err.to_string() });
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response();
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"overdue_requests.csv\"",
            ),
        ],
        buffer.into_inner(),
    )
        .into_response()
}

async fn register_cat_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Json(body): Json<RegisterCatBody>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.register_cat(&body.name) {
        Ok(cat) => (StatusCode::CREATED, Json(cat)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_cats_handler<S, B, D>(
    State(service): State<Arc<AdoptionService<S, B, D>>>,
    Query(query): Query<CatListQuery>,
) -> Response
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    match service.list_cats(query.available) {
        Ok(cats) => (StatusCode::OK, Json(cats)).into_response(),
        Err(err) => error_response(err),
    }
}

fn request_view<S, B, D>(
    service: &AdoptionService<S, B, D>,
    request: AdoptionRequest,
) -> RequestView
where
    S: ShelterRepository + 'static,
    B: DocumentBlobStore + 'static,
    D: RoleDirectory + 'static,
{
    let overdue = request.is_overdue(Utc::now(), service.review_sla());
    RequestView {
        id: request.id,
        adopter_id: request.adopter,
        cat_id: request.cat,
        status: request.status,
        appeal_reason: request.appeal_reason,
        review_cycle: request.review_cycle,
        created_at: request.created_at,
        status_entered_at: request.status_entered_at,
        updated_at: request.updated_at,
        overdue,
    }
}
