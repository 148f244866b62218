use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ApplicantId, ApplicationId, HouseholdId, InvalidStateError, MeetingFormat, Party, ProposalId,
    ResidentId, VoteChoice,
};
use super::repository::{
    CoordinationStore, DirectoryError, HouseholdDirectory, NotificationPublisher, RepositoryError,
};
use super::service::{CoordinationError, CoordinationService};
use super::slots::ResidentAvailability;

const DEFAULT_EVENT_PAGE: usize = 50;

/// Router builder exposing the coordination endpoints.
pub fn coordination_router<S, D, N>(service: Arc<CoordinationService<S, D, N>>) -> Router
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/applications", post(submit_handler::<S, D, N>))
        .route(
            "/api/v1/applications/:application_id",
            get(status_handler::<S, D, N>),
        )
        .route(
            "/api/v1/applications/:application_id/votes",
            post(vote_handler::<S, D, N>),
        )
        .route(
            "/api/v1/applications/:application_id/decision",
            post(decision_handler::<S, D, N>),
        )
        .route(
            "/api/v1/applications/:application_id/archive",
            post(archive_handler::<S, D, N>),
        )
        .route(
            "/api/v1/applications/:application_id/proposals",
            post(propose_handler::<S, D, N>),
        )
        .route(
            "/api/v1/applications/:application_id/slots",
            post(slots_handler::<S, D, N>),
        )
        .route(
            "/api/v1/applications/:application_id/events",
            get(events_handler::<S, D, N>),
        )
        .route(
            "/api/v1/applications/:application_id/messages",
            post(message_handler::<S, D, N>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/confirm",
            post(confirm_handler::<S, D, N>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/request-change",
            post(request_change_handler::<S, D, N>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/cancel",
            post(cancel_handler::<S, D, N>),
        )
        .route("/api/v1/intents", put(intent_handler::<S, D, N>))
        .route(
            "/api/v1/intents/promote",
            post(promote_handler::<S, D, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    pub(crate) applicant_id: ApplicantId,
    pub(crate) household_id: HouseholdId,
    pub(crate) answer_text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VoteRequest {
    pub(crate) resident_id: ResidentId,
    pub(crate) choice: VoteChoice,
    #[serde(default)]
    pub(crate) version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProposeRequest {
    pub(crate) proposed_by: Party,
    pub(crate) date: NaiveDate,
    #[serde(deserialize_with = "deserialize_time")]
    pub(crate) time: NaiveTime,
    pub(crate) duration_minutes: u32,
    pub(crate) format: MeetingFormat,
    #[serde(default)]
    pub(crate) location: Option<String>,
    #[serde(default)]
    pub(crate) version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProposalActionRequest {
    pub(crate) acting_party: Party,
    #[serde(default)]
    pub(crate) reason: Option<String>,
    #[serde(default)]
    pub(crate) version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlotOffer {
    pub(crate) date: NaiveDate,
    #[serde(deserialize_with = "deserialize_time")]
    pub(crate) time: NaiveTime,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlotsRequest {
    pub(crate) availabilities: BTreeMap<ResidentId, Vec<SlotOffer>>,
    pub(crate) from: NaiveDate,
    #[serde(default)]
    pub(crate) lookahead_days: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventsQuery {
    #[serde(default)]
    pub(crate) after: Option<u64>,
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageRequest {
    pub(crate) sender: Party,
    pub(crate) body: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IntentRequest {
    pub(crate) applicant_id: ApplicantId,
    pub(crate) household_id: HouseholdId,
    pub(crate) answer_text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PromoteRequest {
    pub(crate) applicant_id: ApplicantId,
    pub(crate) household_id: HouseholdId,
}

pub(crate) fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|err| format!("failed to parse '{raw}' as HH:MM ({err})"))
}

fn deserialize_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_time(&raw).map_err(serde::de::Error::custom)
}

/// Map a service error to a response. Rejected transitions and stale
/// writes attach the current thread view so the caller can resynchronize.
fn reject<S, D, N>(
    service: &CoordinationService<S, D, N>,
    thread: Option<&ApplicationId>,
    error: CoordinationError,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let status = match &error {
        CoordinationError::Validation(_) => StatusCode::BAD_REQUEST,
        CoordinationError::InvalidState(InvalidStateError::NotAHouseholdAdmin { .. }) => {
            StatusCode::FORBIDDEN
        }
        CoordinationError::InvalidState(_) | CoordinationError::Conflict(_) => {
            StatusCode::CONFLICT
        }
        CoordinationError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        CoordinationError::Directory(DirectoryError::UnknownHousehold(_)) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut payload = json!({ "error": error.to_string() });
    let resync = status == StatusCode::CONFLICT || status == StatusCode::FORBIDDEN;
    if resync {
        if let Some(application_id) = thread {
            if let Ok(view) = service.view(application_id) {
                if let Ok(state) = serde_json::to_value(view) {
                    payload["application"] = state;
                }
            }
        }
    }

    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn submit_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    axum::Json(request): axum::Json<SubmitRequest>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    match service.submit(request.applicant_id, request.household_id, request.answer_text) {
        Ok(record) => match service.view(&record.application.id) {
            Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
            Err(error) => reject(&service, None, error),
        },
        Err(error) => reject(&service, None, error),
    }
}

pub(crate) async fn status_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.view(&id) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => reject(&service, Some(&id), error),
    }
}

pub(crate) async fn vote_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<VoteRequest>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.cast_vote(&id, request.resident_id, request.choice, request.version) {
        Ok((record, tally)) => {
            let payload = json!({
                "application_id": record.application.id,
                "status": record.application.status.label(),
                "version": record.version,
                "tally": tally,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => reject(&service, Some(&id), error),
    }
}

pub(crate) async fn decision_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<VoteRequest>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.force_decision(&id, request.resident_id, request.choice, request.version) {
        Ok(record) => {
            let payload = json!({
                "application_id": record.application.id,
                "status": record.application.status.label(),
                "version": record.version,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => reject(&service, Some(&id), error),
    }
}

pub(crate) async fn archive_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.archive(&id, None) {
        Ok(record) => {
            let payload = json!({
                "application_id": record.application.id,
                "archived": record.application.archived,
                "version": record.version,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => reject(&service, Some(&id), error),
    }
}

pub(crate) async fn propose_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<ProposeRequest>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.propose(
        &id,
        request.proposed_by,
        request.date,
        request.time,
        request.duration_minutes,
        request.format,
        request.location,
        request.version,
    ) {
        Ok((record, proposal_id)) => {
            let view = record.proposal(&proposal_id).map(super::repository::ProposalView::from);
            (StatusCode::CREATED, axum::Json(json!({
                "proposal": view,
                "version": record.version,
            })))
                .into_response()
        }
        Err(error) => reject(&service, Some(&id), error),
    }
}

pub(crate) async fn slots_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<SlotsRequest>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    let availabilities: ResidentAvailability = request
        .availabilities
        .into_iter()
        .map(|(resident, offers)| {
            let calendar = offers
                .into_iter()
                .map(|offer| (offer.date, offer.time))
                .collect();
            (resident, calendar)
        })
        .collect();

    match service.resolve_slots(&id, &availabilities, request.from, request.lookahead_days) {
        Ok(slots) => (StatusCode::OK, axum::Json(json!({ "slots": slots }))).into_response(),
        Err(error) => reject(&service, Some(&id), error),
    }
}

pub(crate) async fn events_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    Path(application_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_PAGE);
    match service.events(&id, query.after, limit) {
        Ok(events) => {
            let next_cursor = events.last().map(|event| event.seq);
            (StatusCode::OK, axum::Json(json!({
                "events": events,
                "next_cursor": next_cursor,
            })))
                .into_response()
        }
        Err(error) => reject(&service, Some(&id), error),
    }
}

pub(crate) async fn message_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<MessageRequest>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.post_message(&id, request.sender, request.body) {
        Ok((_, event)) => (StatusCode::CREATED, axum::Json(event)).into_response(),
        Err(error) => reject(&service, Some(&id), error),
    }
}

pub(crate) async fn confirm_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    Path(proposal_id): Path<String>,
    axum::Json(request): axum::Json<ProposalActionRequest>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ProposalId(proposal_id);
    let thread = service.application_for_proposal(&id).ok();
    match service.confirm(&id, request.acting_party, request.version) {
        Ok(record) => proposal_response(&record, &id),
        Err(error) => reject(&service, thread.as_ref(), error),
    }
}

pub(crate) async fn request_change_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    Path(proposal_id): Path<String>,
    axum::Json(request): axum::Json<ProposalActionRequest>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ProposalId(proposal_id);
    let thread = service.application_for_proposal(&id).ok();
    match service.request_change(&id, request.acting_party, request.reason, request.version) {
        Ok(record) => proposal_response(&record, &id),
        Err(error) => reject(&service, thread.as_ref(), error),
    }
}

pub(crate) async fn cancel_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    Path(proposal_id): Path<String>,
    axum::Json(request): axum::Json<ProposalActionRequest>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ProposalId(proposal_id);
    let thread = service.application_for_proposal(&id).ok();
    match service.cancel(&id, request.acting_party, request.version) {
        Ok(record) => proposal_response(&record, &id),
        Err(error) => reject(&service, thread.as_ref(), error),
    }
}

pub(crate) async fn intent_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    axum::Json(request): axum::Json<IntentRequest>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    match service.save_intent(request.applicant_id, request.household_id, request.answer_text) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => reject(&service, None, error),
    }
}

pub(crate) async fn promote_handler<S, D, N>(
    State(service): State<Arc<CoordinationService<S, D, N>>>,
    axum::Json(request): axum::Json<PromoteRequest>,
) -> Response
where
    S: CoordinationStore + 'static,
    D: HouseholdDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    match service.promote_intent(&request.applicant_id, &request.household_id) {
        Ok(record) => match service.view(&record.application.id) {
            Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
            Err(error) => reject(&service, None, error),
        },
        Err(error) => reject(&service, None, error),
    }
}

fn proposal_response(
    record: &super::repository::ApplicationRecord,
    proposal_id: &ProposalId,
) -> Response {
    let view = record
        .proposal(proposal_id)
        .map(super::repository::ProposalView::from);
    (StatusCode::OK, axum::Json(json!({
        "proposal": view,
        "version": record.version,
    })))
        .into_response()
}
