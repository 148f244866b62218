use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::coordination::domain::{Party, VoteChoice};
use crate::workflows::coordination::router;
use crate::workflows::coordination::router::{EventsQuery, SubmitRequest, VoteRequest};
use crate::workflows::coordination::service::{CoordinationConfig, CoordinationService};

#[tokio::test]
async fn submit_route_creates_an_application() {
    let (service, _, _) = build_service();
    let app = test_router(service);

    let response = app
        .oneshot(
            axum::http::Request::post("/api/v1/applications")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(axum::body::Body::from(
                    serde_json::to_vec(&json!({
                        "applicant_id": "cand-mia",
                        "household_id": "wg-linden",
                        "answer_text": "Tidy, sociable, works from a studio nearby.",
                    }))
                    .expect("serializes"),
                ))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert!(payload.get("application_id").is_some());
    assert_eq!(payload.get("status"), Some(&json!("pending")));
    assert_eq!(
        payload.pointer("/tally/total_residents"),
        Some(&json!(3))
    );
}

#[tokio::test]
async fn submit_route_rejects_overlong_answers() {
    let (service, _, _) = build_service();
    let app = test_router(service);

    let response = app
        .oneshot(
            axum::http::Request::post("/api/v1/applications")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(axum::body::Body::from(
                    serde_json::to_vec(&json!({
                        "applicant_id": "cand-mia",
                        "household_id": "wg-linden",
                        "answer_text": "x".repeat(101),
                    }))
                    .expect("serializes"),
                ))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert!(payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .contains("exceeds"));
}

#[tokio::test]
async fn status_route_returns_404_for_unknown_threads() {
    let (service, _, _) = build_service();
    let app = test_router(service);

    let response = app
        .oneshot(
            axum::http::Request::get("/api/v1/applications/app-unknown")
                .body(axum::body::Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn vote_handler_returns_the_running_tally() {
    let (service, _, _) = build_service();
    let record = submit_pending(&service);

    let response = router::vote_handler(
        State(service.clone()),
        Path(record.application.id.0.clone()),
        axum::Json(VoteRequest {
            resident_id: anna(),
            choice: VoteChoice::Invite,
            version: None,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.pointer("/tally/invite"), Some(&json!(1)));
    assert_eq!(payload.get("status"), Some(&json!("pending")));
}

#[tokio::test]
async fn vote_after_decision_conflicts_with_state_attached() {
    let (service, _, _) = build_service();
    let record = invited_record(&service);

    let response = router::vote_handler(
        State(service.clone()),
        Path(record.application.id.0.clone()),
        axum::Json(VoteRequest {
            resident_id: cara(),
            choice: VoteChoice::Decline,
            version: None,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert!(payload.get("error").is_some());
    // The authoritative state rides along so the caller can resynchronize.
    assert_eq!(
        payload.pointer("/application/status"),
        Some(&json!("invited"))
    );
}

#[tokio::test]
async fn forced_decision_requires_admin_rights() {
    let (service, _, _) = build_service();
    let record = submit_pending(&service);

    let response = router::decision_handler(
        State(service.clone()),
        Path(record.application.id.0.clone()),
        axum::Json(VoteRequest {
            resident_id: ben(),
            choice: VoteChoice::Invite,
            version: None,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn propose_route_rejects_face_to_face_without_location() {
    let (service, _, _) = build_service();
    let record = invited_record(&service);
    let app = test_router(service);

    let response = app
        .oneshot(
            axum::http::Request::post(format!(
                "/api/v1/applications/{}/proposals",
                record.application.id.0
            ))
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(
                serde_json::to_vec(&json!({
                    "proposed_by": { "role": "resident", "resident_id": "r-anna" },
                    "date": "2026-08-12",
                    "time": "19:00",
                    "duration_minutes": 60,
                    "format": "face_to_face",
                }))
                .expect("serializes"),
            ))
            .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proposal_lifecycle_over_http() {
    let (service, _, _) = build_service();
    let record = invited_record(&service);
    let app = test_router(service.clone());

    let response = app
        .clone()
        .oneshot(
            axum::http::Request::post(format!(
                "/api/v1/applications/{}/proposals",
                record.application.id.0
            ))
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(
                serde_json::to_vec(&json!({
                    "proposed_by": { "role": "applicant" },
                    "date": "2026-08-12",
                    "time": "18:00",
                    "duration_minutes": 45,
                    "format": "video",
                }))
                .expect("serializes"),
            ))
            .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    let proposal_id = payload
        .pointer("/proposal/proposal_id")
        .and_then(Value::as_str)
        .expect("proposal id present")
        .to_string();

    let response = app
        .oneshot(
            axum::http::Request::post(format!("/api/v1/proposals/{proposal_id}/confirm"))
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(axum::body::Body::from(
                    serde_json::to_vec(&json!({
                        "acting_party": { "role": "resident", "resident_id": "r-ben" },
                    }))
                    .expect("serializes"),
                ))
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload.pointer("/proposal/status"),
        Some(&json!("confirmed"))
    );
}

#[tokio::test]
async fn slots_route_returns_ordered_annotated_slots() {
    let (service, _, _) = build_service();
    let record = submit_pending(&service);
    let app = test_router(service);

    let response = app
        .oneshot(
            axum::http::Request::post(format!(
                "/api/v1/applications/{}/slots",
                record.application.id.0
            ))
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(
                serde_json::to_vec(&json!({
                    "from": "2026-08-10",
                    "availabilities": {
                        "r-anna": [
                            { "date": "2026-08-11", "time": "18:00" },
                            { "date": "2026-08-13", "time": "19:00" },
                        ],
                        "r-ben": [
                            { "date": "2026-08-11", "time": "18:00" },
                        ],
                    },
                }))
                .expect("serializes"),
            ))
            .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let slots = payload.get("slots").and_then(Value::as_array).expect("slots");
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].get("day_of_week"), Some(&json!("Tuesday")));
    assert_eq!(
        slots[0]
            .get("available_residents")
            .and_then(Value::as_array)
            .map(Vec::len),
        Some(2)
    );
}

#[tokio::test]
async fn events_handler_pages_by_cursor() {
    let (service, _, _) = build_service();
    let record = submit_pending(&service);
    service
        .cast_vote(&record.application.id, anna(), VoteChoice::Invite, None)
        .expect("vote");
    service
        .post_message(&record.application.id, Party::Applicant, "hi".to_string())
        .expect("message");

    let response = router::events_handler(
        State(service.clone()),
        Path(record.application.id.0.clone()),
        Query(EventsQuery {
            after: Some(1),
            limit: Some(1),
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let events = payload.get("events").and_then(Value::as_array).expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("seq"), Some(&json!(2)));
    assert_eq!(payload.get("next_cursor"), Some(&json!(2)));
}

#[tokio::test]
async fn submit_handler_reports_store_outages() {
    let service = Arc::new(CoordinationService::new(
        Arc::new(UnavailableStore),
        Arc::new(StaticDirectory::seeded()),
        Arc::new(RecordingNotifier::default()),
        CoordinationConfig::default(),
    ));

    let response = router::submit_handler(
        State(service),
        axum::Json(SubmitRequest {
            applicant_id: applicant(),
            household_id: household(),
            answer_text: answer(),
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
