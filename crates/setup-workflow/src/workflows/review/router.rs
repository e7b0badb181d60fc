use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::authorizer::Authorizer;
use super::domain::{ActorId, ApplicationSubmission, RecordId, ReviewDecision};
use super::events::EventPublisher;
use super::repository::{
    ApplicationFilter, ApplicationListing, ApplicationStore, RecordSummary, StoreError,
};
use super::service::{ReviewWorkflowService, TransitionRequest, WorkflowError};

/// Header carrying the already-authenticated caller identity.
pub const ACTOR_HEADER: &str = "x-actor-id";

type SharedService<S, A, P> = Arc<ReviewWorkflowService<S, A, P>>;

/// Router exposing the review workflow over HTTP.
pub fn review_router<S, A, P>(service: SharedService<S, A, P>) -> Router
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications",
            post(submit_handler::<S, A, P>).get(list_handler::<S, A, P>),
        )
        .route(
            "/api/v1/applications/:record_id",
            get(application_handler::<S, A, P>),
        )
        .route(
            "/api/v1/applications/:record_id/history",
            get(history_handler::<S, A, P>),
        )
        .route(
            "/api/v1/applications/:record_id/history.csv",
            get(history_csv_handler::<S, A, P>),
        )
        .route(
            "/api/v1/applications/:record_id/operations",
            get(operations_handler::<S, A, P>),
        )
        .route(
            "/api/v1/applications/:record_id/assignment",
            post(assignment_handler::<S, A, P>),
        )
        .route(
            "/api/v1/applications/:record_id/provincial-review",
            post(provincial_review_handler::<S, A, P>),
        )
        .route(
            "/api/v1/applications/:record_id/resubmit",
            post(resubmit_handler::<S, A, P>),
        )
        .route(
            "/api/v1/applications/:record_id/assessment/conducted",
            post(assessment_conducted_handler::<S, A, P>),
        )
        .route(
            "/api/v1/applications/:record_id/assessment/report",
            post(assessment_report_handler::<S, A, P>),
        )
        .route(
            "/api/v1/applications/:record_id/forward",
            post(forward_handler::<S, A, P>),
        )
        .route(
            "/api/v1/applications/:record_id/regional-review",
            post(regional_review_handler::<S, A, P>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct VersionedBody {
    #[serde(default)]
    pub(crate) expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewBody {
    pub(crate) decision: ReviewDecision,
    #[serde(default)]
    pub(crate) comment: Option<String>,
    #[serde(default)]
    pub(crate) expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignmentBody {
    pub(crate) reviewer: ActorId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssessmentReportBody {
    pub(crate) report_ref: String,
    #[serde(default)]
    pub(crate) expected_version: Option<u64>,
}

pub(crate) fn actor_from(headers: &HeaderMap) -> Result<ActorId, Response> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ActorId::new)
        .ok_or_else(|| {
            let payload = json!({
                "error": "unauthenticated",
                "message": format!("missing {ACTOR_HEADER} header"),
            });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

fn transition_request(actor: ActorId, expected_version: Option<u64>) -> TransitionRequest {
    TransitionRequest {
        actor,
        expected_version,
    }
}

pub(crate) fn error_response(error: WorkflowError) -> Response {
    let status = match &error {
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::InvalidTransition { .. } | WorkflowError::VersionConflict { .. } => {
            StatusCode::CONFLICT
        }
        WorkflowError::GuardNotSatisfied(_) => StatusCode::PRECONDITION_FAILED,
        WorkflowError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        WorkflowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut payload = json!({
        "error": error.kind(),
        "message": error.to_string(),
    });
    match &error {
        WorkflowError::GuardNotSatisfied(failure) => {
            payload["reason"] = json!(failure.code());
        }
        WorkflowError::VersionConflict { expected, actual } => {
            payload["expected_version"] = json!(expected);
            payload["current_version"] = json!(actual);
        }
        _ => {}
    }

    (status, Json(payload)).into_response()
}

fn summary_response(result: Result<RecordSummary, WorkflowError>) -> Response {
    match result {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    headers: HeaderMap,
    Json(submission): Json<ApplicationSubmission>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.submit(&actor, submission) {
        Ok(record) => (StatusCode::CREATED, Json(record.summary())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Query(filter): Query<ApplicationFilter>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    match service.list_applications(&filter) {
        Ok(records) => {
            let listings: Vec<ApplicationListing> =
                records.iter().map(|record| record.listing()).collect();
            (StatusCode::OK, Json(listings)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn application_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Path(record_id): Path<Uuid>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    match service.get_application(&RecordId(record_id)) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn history_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Path(record_id): Path<Uuid>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    match service.get_history(&RecordId(record_id)) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn history_csv_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Path(record_id): Path<Uuid>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    let record = match service.get_application(&RecordId(record_id)) {
        Ok(record) => record,
        Err(error) => return error_response(error),
    };

    let mut buffer = Vec::new();
    match record.history.write_csv(&mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            buffer,
        )
            .into_response(),
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn operations_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Path(record_id): Path<Uuid>,
    headers: HeaderMap,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.allowed_operations(&RecordId(record_id), &actor) {
        Ok(operations) => (StatusCode::OK, Json(operations)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn assignment_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Path(record_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<AssignmentBody>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.assign_reviewer(&RecordId(record_id), &actor, body.reviewer) {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn provincial_review_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Path(record_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ReviewBody>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request = transition_request(actor, body.expected_version);
    summary_response(service.review_by_provincial_office(
        &RecordId(record_id),
        &request,
        body.decision,
        body.comment,
    ))
}

pub(crate) async fn resubmit_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Path(record_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<VersionedBody>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request = transition_request(actor, body.expected_version);
    summary_response(service.resubmit_after_return(&RecordId(record_id), &request))
}

pub(crate) async fn assessment_conducted_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Path(record_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<VersionedBody>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request = transition_request(actor, body.expected_version);
    summary_response(service.mark_assessment_conducted(&RecordId(record_id), &request))
}

pub(crate) async fn assessment_report_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Path(record_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<AssessmentReportBody>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request = transition_request(actor, body.expected_version);
    summary_response(service.submit_assessment_report(
        &RecordId(record_id),
        &request,
        &body.report_ref,
    ))
}

pub(crate) async fn forward_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Path(record_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<VersionedBody>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request = transition_request(actor, body.expected_version);
    summary_response(service.forward_to_regional_office(&RecordId(record_id), &request))
}

pub(crate) async fn regional_review_handler<S, A, P>(
    State(service): State<SharedService<S, A, P>>,
    Path(record_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ReviewBody>,
) -> Response
where
    S: ApplicationStore + 'static,
    A: Authorizer + 'static,
    P: EventPublisher + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request = transition_request(actor, body.expected_version);
    summary_response(service.review_by_regional_office(
        &RecordId(record_id),
        &request,
        body.decision,
        body.comment,
    ))
}
