use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::workflows::adoption::domain::Decision;
use crate::workflows::adoption::router::adoption_router;

fn router(service: MemoryService) -> axum::Router {
    adoption_router(Arc::new(service))
}

fn json_request(method: &str, uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&payload).expect("encodes")))
        .expect("request builds")
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

#[tokio::test]
async fn create_route_returns_created_with_a_view() {
    let (service, _, _) = build_service();
    let cat = registered_cat(&service);
    let app = router(service);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/adoptions",
            json!({ "adopter_id": ADOPTER.0, "cat_id": cat.id.0 }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "editing");
    assert_eq!(payload["cat_id"], cat.id.0);
    assert_eq!(payload["overdue"], false);
}

#[tokio::test]
async fn missing_requests_map_to_not_found() {
    let (service, _, _) = build_service();
    let app = router(service);

    let response = app
        .oneshot(empty_request("GET", "/api/v1/adoptions/424242"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_transitions_map_to_conflict() {
    let (service, _, _) = build_service();
    let (request, _) = rejected_request(&service);
    let app = router(service);

    let response = app
        .oneshot(empty_request(
            "POST",
            &format!("/api/v1/adoptions/{}/submit", request.id),
        ))
        .await
        .expect("route executes");

    assert_conflict_response(&response);
}

#[tokio::test]
async fn double_create_for_one_cat_maps_to_conflict() {
    let (service, _, _) = build_service();
    let (_, cat) = editing_request(&service);
    let app = router(service);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/adoptions",
            json!({ "adopter_id": OTHER_ADOPTER.0, "cat_id": cat.id.0 }),
        ))
        .await
        .expect("route executes");

    assert_conflict_response(&response);
}

#[tokio::test]
async fn short_opinions_map_to_unprocessable_with_issues() {
    let (service, _, _) = build_service();
    let (request, _) = under_review_request(&service);
    let app = router(service);

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/adoptions/{}/evaluations", request.id),
            json!({
                "coordinator_id": COORDINATOR.0,
                "opinion": "nope",
                "decision": "reject",
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(payload["issues"][0]["field"], "opinion");
}

#[tokio::test]
async fn evaluation_route_returns_request_and_opinion() {
    let (service, _, _) = build_service();
    let (request, _) = under_review_request(&service);
    let app = router(service);

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/adoptions/{}/evaluations", request.id),
            json!({
                "coordinator_id": COORDINATOR.0,
                "opinion": "home visit confirmed a safe environment",
                "decision": "approve",
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["request"]["status"], "approved");
    assert_eq!(payload["evaluation"]["review_cycle"], 1);
}

#[tokio::test]
async fn unknown_status_filters_map_to_unprocessable() {
    let (service, _, _) = build_service();
    let app = router(service);

    let response = app
        .oneshot(empty_request("GET", "/api/v1/adoptions?status=waiting"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn permissions_route_reports_both_predicates() {
    let (service, _, _) = build_service();
    let (request, _) = under_review_request(&service);
    let app = router(service);

    let response = app
        .oneshot(empty_request(
            "GET",
            &format!(
                "/api/v1/adoptions/{}/permissions?user={}",
                request.id, COORDINATOR.0
            ),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["can_edit"], false);
    assert_eq!(payload["can_evaluate"], true);
}

#[tokio::test]
async fn cancel_route_returns_no_content() {
    let (service, _, _) = build_service();
    let (request, _) = editing_request(&service);
    let app = router(service);

    let response = app
        .oneshot(empty_request(
            "DELETE",
            &format!("/api/v1/adoptions/{}", request.id),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn statistics_route_serves_counts() {
    let (service, _, _) = build_service();
    let (_request, _) = editing_request(&service);
    let app = router(service);

    let response = app
        .oneshot(empty_request("GET", "/api/v1/reports/statistics"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["total"], 1);
    assert_eq!(payload["editing"], 1);
}

#[tokio::test]
async fn overdue_csv_route_serves_a_download() {
    let (service, _, _) = build_service();
    let app = router(service);

    let response = app
        .oneshot(empty_request("GET", "/api/v1/reports/overdue.csv"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .expect("content type set")
        .to_str()
        .expect("ascii header");
    assert!(content_type.starts_with("text/csv"));
}

#[tokio::test]
async fn multipart_uploads_store_files_and_report_rejects() {
    let (service, _, _) = build_service();
    let (request, _) = editing_request(&service);
    let app = router(service);

    let boundary = "X-SHELTERFLOW-TEST";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\nVeterinary records\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"exam.pdf\"\r\nContent-Type: application/pdf\r\n\r\n%PDF-1.4 test\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\nContent-Type: text/plain\r\n\r\nplain text\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/adoptions/{}/documents", request.id))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["stored"][0]["file_name"], "exam.pdf");
    assert_eq!(payload["stored"][0]["description"], "Veterinary records");
    assert_eq!(payload["rejected"][0]["file_name"], "notes.txt");
}

#[tokio::test]
async fn appeal_routes_drive_the_full_cycle() {
    let (service, _, _) = build_service();
    let (request, _) = rejected_request(&service);
    let app = router(service);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/adoptions/{}/appeal", request.id),
            json!({ "reason": "the household situation changed since the visit" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "appealing");

    let response = app
        .oneshot(empty_request(
            "POST",
            &format!("/api/v1/adoptions/{}/appeal/submit", request.id),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "under_review");
    assert_eq!(payload["review_cycle"], 2);
}

#[tokio::test]
async fn cats_routes_register_and_list() {
    let (service, _, _) = build_service();
    let app = router(service);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/cats",
            json!({ "name": "  Thor  " }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["name"], "Thor");
    assert_eq!(payload["available"], true);

    let response = app
        .oneshot(empty_request("GET", "/api/v1/cats?available=true"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.as_array().expect("array").len(), 1);
}

#[test]
fn decision_labels_round_trip_through_serde() {
    let approve = serde_json::to_string(&Decision::Approve).expect("encodes");
    assert_eq!(approve, "\"approve\"");
    let parsed: Decision = serde_json::from_str("\"reject\"").expect("decodes");
    assert_eq!(parsed, Decision::Reject);
}
