use chrono::{Duration, Utc};

use super::common::*;
use crate::workflows::adoption::domain::{CatId, Decision, RequestId, RequestStatus};
use crate::workflows::adoption::repository::{RepositoryError, RequestFilter, ShelterRepository};
use crate::workflows::adoption::service::AdoptionError;

#[test]
fn create_request_opens_in_editing_and_holds_the_cat() {
    let (service, repository, _) = build_service();
    let (request, cat) = editing_request(&service);

    assert_eq!(request.status, RequestStatus::Editing);
    assert_eq!(request.review_cycle, 0);
    assert!(request.appeal_reason.is_none());

    let stored_cat = repository
        .fetch_cat(cat.id)
        .expect("fetch succeeds")
        .expect("cat present");
    assert!(!stored_cat.available, "held cat leaves the adoption pool");
}

#[test]
fn create_request_rejects_a_held_cat() {
    let (service, _, _) = build_service();
    let (_, cat) = editing_request(&service);

    match service.create_request(OTHER_ADOPTER, cat.id) {
        Err(AdoptionError::Conflict(_)) => {}
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn create_request_requires_the_adopter_capability() {
    let (service, _, _) = build_service();
    let cat = registered_cat(&service);

    match service.create_request(STRANGER, cat.id) {
        Err(AdoptionError::NotFound { entity: "adopter" }) => {}
        other => panic!("expected unknown adopter, got {other:?}"),
    }
}

#[test]
fn create_request_requires_a_listed_cat() {
    let (service, _, _) = build_service();

    match service.create_request(ADOPTER, CatId(4040)) {
        Err(AdoptionError::NotFound { entity: "cat" }) => {}
        other => panic!("expected unknown cat, got {other:?}"),
    }
}

#[test]
fn submit_moves_to_under_review_and_starts_a_cycle() {
    let (service, _, _) = build_service();
    let (request, _) = editing_request(&service);

    let request = service.submit_request(request.id).expect("submits");
    assert_eq!(request.status, RequestStatus::UnderReview);
    assert_eq!(request.review_cycle, 1);
}

#[test]
fn submit_is_only_valid_from_editing() {
    let (service, _, _) = build_service();
    let (request, _) = under_review_request(&service);

    match service.submit_request(request.id) {
        Err(AdoptionError::InvalidState {
            expected: "editing",
            actual: "under_review",
        }) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn unknown_request_is_reported_as_missing() {
    let (service, _, _) = build_service();

    match service.submit_request(RequestId(7777)) {
        Err(AdoptionError::NotFound { entity: "request" }) => {}
        other => panic!("expected missing request, got {other:?}"),
    }
}

#[test]
fn cancel_editing_request_releases_the_cat_and_deletes_it() {
    let (service, repository, _) = build_service();
    let (request, cat) = editing_request(&service);

    service.cancel_request(request.id).expect("cancels");

    let stored_cat = repository
        .fetch_cat(cat.id)
        .expect("fetch succeeds")
        .expect("cat present");
    assert!(stored_cat.available, "cancellation returns the cat");
    match service.get_request(request.id) {
        Err(AdoptionError::NotFound { entity: "request" }) => {}
        other => panic!("expected deleted request, got {other:?}"),
    }
}

#[test]
fn cancel_is_refused_outside_editable_statuses() {
    let (service, _, _) = build_service();
    let (request, _) = under_review_request(&service);

    match service.cancel_request(request.id) {
        Err(AdoptionError::InvalidState { .. }) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn cancel_appealing_request_releases_the_cat() {
    let (service, repository, _) = build_service();
    let (request, cat) = rejected_request(&service);
    let request = service
        .lodge_appeal(request.id, "the household situation changed since the visit")
        .expect("appeal lodged");

    service.cancel_request(request.id).expect("cancels");

    let stored_cat = repository
        .fetch_cat(cat.id)
        .expect("fetch succeeds")
        .expect("cat present");
    assert!(stored_cat.available);
}

#[test]
fn appeal_holds_the_cat_again() {
    let (service, repository, _) = build_service();
    let (request, cat) = rejected_request(&service);

    let released = repository
        .fetch_cat(cat.id)
        .expect("fetch succeeds")
        .expect("cat present");
    assert!(released.available, "rejection returns the cat");

    let request = service
        .lodge_appeal(request.id, "the household situation changed since the visit")
        .expect("appeal lodged");
    assert_eq!(request.status, RequestStatus::Appealing);
    assert!(request.appeal_reason.is_some());

    let held = repository
        .fetch_cat(cat.id)
        .expect("fetch succeeds")
        .expect("cat present");
    assert!(!held.available, "open appeal holds the cat");
}

#[test]
fn appeal_reason_below_minimum_is_rejected() {
    let (service, _, _) = build_service();
    let (request, _) = rejected_request(&service);

    match service.lodge_appeal(request.id, "   too short   ") {
        Err(AdoptionError::Validation(issues)) => {
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].field, "appeal_reason");
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn a_request_can_only_be_appealed_once() {
    let (service, _, _) = build_service();
    let (request, _) = rejected_request(&service);

    let request = service
        .lodge_appeal(request.id, "the household situation changed since the visit")
        .expect("first appeal lodged");
    let request = service.submit_appeal(request.id).expect("appeal submitted");
    let (request, _) = service
        .evaluate_request(
            request.id,
            SECOND_COORDINATOR,
            "the follow-up visit confirmed the original concerns",
            Decision::Reject,
        )
        .expect("second rejection records");

    match service.lodge_appeal(request.id, "please reconsider the decision once more") {
        Err(AdoptionError::InvalidState { .. }) => {}
        other => panic!("expected second appeal to be refused, got {other:?}"),
    }
}

#[test]
fn submit_appeal_starts_a_new_review_cycle() {
    let (service, _, _) = build_service();
    let (request, _) = rejected_request(&service);
    assert_eq!(request.review_cycle, 1);

    let request = service
        .lodge_appeal(request.id, "the household situation changed since the visit")
        .expect("appeal lodged");
    let request = service.submit_appeal(request.id).expect("appeal submitted");

    assert_eq!(request.status, RequestStatus::UnderReview);
    assert_eq!(request.review_cycle, 2);
}

#[test]
fn appeal_reason_can_be_reworded_while_appealing() {
    let (service, _, _) = build_service();
    let (request, _) = rejected_request(&service);
    let request = service
        .lodge_appeal(request.id, "the household situation changed since the visit")
        .expect("appeal lodged");

    let request = service
        .update_appeal_reason(request.id, "  a second income now covers veterinary costs  ")
        .expect("reason updates");
    assert_eq!(
        request.appeal_reason.as_deref(),
        Some("a second income now covers veterinary costs")
    );

    let request = service.submit_appeal(request.id).expect("appeal submitted");
    match service.update_appeal_reason(request.id, "no longer editable at this point") {
        Err(AdoptionError::InvalidState { .. }) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn stale_status_writes_are_rejected_by_the_repository() {
    let (service, repository, _) = build_service();
    let (request, _) = editing_request(&service);

    let mut stale = request.clone();
    stale.set_status(RequestStatus::UnderReview, Utc::now());
    match repository.update_request(stale, RequestStatus::Appealing) {
        Err(RepositoryError::Conflict) => {}
        other => panic!("expected conflict, got {other:?}"),
    }

    let stored = repository
        .fetch_request(request.id)
        .expect("fetch succeeds")
        .expect("request present");
    assert_eq!(stored.status, RequestStatus::Editing);
}

#[test]
fn can_edit_requires_owner_and_editable_status() {
    let (service, _, _) = build_service();
    let (request, _) = editing_request(&service);

    assert!(service.can_edit(request.id, ADOPTER).expect("answers"));
    assert!(!service.can_edit(request.id, OTHER_ADOPTER).expect("answers"));

    let request = service.submit_request(request.id).expect("submits");
    assert!(!service.can_edit(request.id, ADOPTER).expect("answers"));

    assert!(!service
        .can_edit(RequestId(8888), ADOPTER)
        .expect("missing request answers false"));
}

#[test]
fn listing_filters_by_status_adopter_and_cat() {
    let (service, _, _) = build_service();
    let (editing, cat_a) = editing_request(&service);
    let other_cat = service.register_cat("Thor").expect("cat registers");
    let reviewing = service
        .create_request(OTHER_ADOPTER, other_cat.id)
        .expect("request opens");
    let reviewing = service
        .submit_request(reviewing.id)
        .expect("request submits");

    let by_status = service
        .list_requests(&RequestFilter {
            status: Some(RequestStatus::UnderReview),
            ..RequestFilter::default()
        })
        .expect("lists");
    assert_eq!(by_status.len(), 1);
    assert_eq!(by_status[0].id, reviewing.id);

    let by_adopter = service
        .list_requests(&RequestFilter {
            adopter: Some(ADOPTER),
            ..RequestFilter::default()
        })
        .expect("lists");
    assert_eq!(by_adopter.len(), 1);
    assert_eq!(by_adopter[0].id, editing.id);

    let by_cat = service
        .list_requests(&RequestFilter {
            cat: Some(cat_a.id),
            ..RequestFilter::default()
        })
        .expect("lists");
    assert_eq!(by_cat.len(), 1);

    let all = service
        .list_requests(&RequestFilter::default())
        .expect("lists");
    assert_eq!(all.len(), 2);
    assert!(
        all[0].created_at <= all[1].created_at,
        "listing is oldest first"
    );
}

#[test]
fn overdue_requests_flags_long_running_reviews_only() {
    let (service, _, _) = build_service();
    let (reviewing, _) = under_review_request(&service);
    let (_editing, _) = editing_request(&service);

    let now = Utc::now();
    assert!(service.overdue_requests(now).expect("lists").is_empty());

    let later = now + Duration::days(8);
    let overdue = service.overdue_requests(later).expect("lists");
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, reviewing.id);
}
