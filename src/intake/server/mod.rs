// SPDX-License-Identifier: MIT

//! JSON HTTP surface for the applicant and admin UIs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::engine::error::{ApplicationError, IntakeError, VersionError};
use crate::engine::predicate::parse;
use crate::engine::question::ConceptId;
use crate::intake::application::{ApplicantService, RawAnswer};
use crate::intake::program::VersionSelector;
use crate::intake::store::MemoryStore;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ApplicantService<MemoryStore>>,
}

impl AppState {
    pub fn new(service: ApplicantService<MemoryStore>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/applications", post(start_application))
        .route("/api/applications/{id}/blocks", get(visible_blocks))
        .route("/api/applications/{id}/next", get(next_block))
        .route("/api/applications/{id}/blocks/{block}", post(answer_block))
        .route("/api/applications/{id}/eligibility", get(eligibility))
        .route("/api/applications/{id}/submit", post(submit))
        .route(
            "/api/programs/{program}/predicates/validate",
            post(validate_predicate),
        )
        .route("/api/programs/{program}/publish", post(publish))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> Result<(), IntakeError> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn status_of(error: &IntakeError) -> StatusCode {
    match error {
        IntakeError::Application(ApplicationError::NotFound(_)) => StatusCode::NOT_FOUND,
        IntakeError::Version(
            VersionError::UnknownProgram(_)
            | VersionError::UnknownVersion { .. }
            | VersionError::NoActiveVersion(_)
            | VersionError::NoDraft(_),
        ) => StatusCode::NOT_FOUND,
        IntakeError::Application(ApplicationError::AlreadySubmitted(_))
        | IntakeError::DraftConflict { .. }
        | IntakeError::StaleVersionRace { .. } => StatusCode::CONFLICT,
        IntakeError::Application(ApplicationError::Ineligible(_)) => StatusCode::FORBIDDEN,
        IntakeError::Application(_) | IntakeError::Parse(_) | IntakeError::Version(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Applicant-facing failure: never names concept ids
fn applicant_error(error: IntakeError) -> Response {
    log::warn!("Applicant request failed: {}", error);
    let body = json!({
        "error": error.applicant_message(),
        "retry": error.is_recoverable(),
    });
    (status_of(&error), Json(body)).into_response()
}

/// Admin-facing failure: the full error
fn admin_error(error: IntakeError) -> Response {
    log::error!("Admin request failed: {}", error);
    (status_of(&error), Json(json!({ "error": error.to_string() }))).into_response()
}

fn applicant<T: serde::Serialize>(result: Result<T, IntakeError>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => applicant_error(e),
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct StartRequest {
    program: ConceptId,
}

async fn start_application(
    State(state): State<AppState>,
    Json(payload): Json<StartRequest>,
) -> Response {
    match state.service.start_application(&payload.program).await {
        Ok(app) => (StatusCode::CREATED, Json(app)).into_response(),
        Err(e) => applicant_error(e),
    }
}

async fn visible_blocks(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    applicant(state.service.get_visible_blocks(id).await)
}

async fn next_block(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.service.next_block(id).await {
        Ok(Some(block)) => Json(json!({ "done": false, "block": block })).into_response(),
        Ok(None) => Json(json!({ "done": true })).into_response(),
        Err(e) => applicant_error(e),
    }
}

#[derive(Deserialize)]
struct AnswerRequest {
    answers: Vec<RawAnswer>,
}

async fn answer_block(
    State(state): State<AppState>,
    Path((id, block)): Path<(Uuid, String)>,
    Json(payload): Json<AnswerRequest>,
) -> Response {
    let block = ConceptId::from(block);
    match state.service.answer_block(id, &block, payload.answers).await {
        // Failing conditions are left to the eligibility route, which describes them by text
        Ok(view) => Json(json!({
            "version": view.version,
            "blocks": view.blocks,
            "visible": view.visible,
            "eligibility": {
                "eligible": view.eligibility.eligible,
                "definitively_ineligible": view.eligibility.is_definitively_ineligible(),
            },
        }))
        .into_response(),
        Err(e) => applicant_error(e),
    }
}

async fn eligibility(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    applicant(state.service.eligibility_summary(id).await)
}

async fn submit(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    applicant(state.service.submit(id).await)
}

#[derive(Deserialize)]
struct ValidateRequest {
    predicate: String,
    #[serde(default)]
    version: VersionSelector,
}

async fn validate_predicate(
    State(state): State<AppState>,
    Path(program): Path<String>,
    Json(payload): Json<ValidateRequest>,
) -> Response {
    let program = ConceptId::from(program);
    let expr = match parse(&payload.predicate) {
        Ok(expr) => expr,
        Err(e) => return admin_error(e.into()),
    };
    match state
        .service
        .validate_predicate(&program, payload.version, &expr)
        .await
    {
        Ok(result) => Json(json!({
            "valid": result.is_valid(),
            "predicate": expr.to_string(),
            "errors": result.messages(),
        }))
        .into_response(),
        Err(e) => admin_error(e),
    }
}

async fn publish(State(state): State<AppState>, Path(program): Path<String>) -> Response {
    let program = ConceptId::from(program);
    match state.service.publish_program(&program).await {
        Ok(version) => Json(version.as_ref()).into_response(),
        Err(e) => admin_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::config::IntakeConfig;
    use crate::intake::loader::BundleLoader;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::NaiveDate;
    use tower::ServiceExt;

    const BUNDLE: &str = r#"
questions:
  - id: name
    type: text
  - id: household_size
    type: number
    text: "How many people live with you?"
program:
  id: snap
  eligibility_is_gating: true
  blocks:
    - id: about
      questions: [name]
    - id: household
      name: Household
      questions: [household_size]
      eligibility: "household_size.number <= 4"
"#;

    async fn app() -> (Router, AppState) {
        let store = MemoryStore::default();
        BundleLoader::parse_yaml(BUNDLE)
            .unwrap()
            .install(store.graph())
            .await
            .unwrap();
        let config = IntakeConfig {
            eligibility_date_override: NaiveDate::from_ymd_opt(2024, 6, 1),
            ..IntakeConfig::default()
        };
        let state = AppState::new(ApplicantService::new(store, config));
        (router(state.clone()), state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        let (status, body) = call(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_applicant_round_trip() {
        let (app, _) = app().await;
        let (status, created) =
            call(&app, "POST", "/api/applications", Some(json!({ "program": "snap" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let (_, next) = call(&app, "GET", &format!("/api/applications/{}/next", id), None).await;
        assert_eq!(next["block"]["id"], "about");

        let answers = json!({ "answers": [
            { "question": "household_size", "scalar": "number", "value": "7" }
        ]});
        let (status, view) = call(
            &app,
            "POST",
            &format!("/api/applications/{}/blocks/household", id),
            Some(answers),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["eligibility"]["eligible"], false);

        let (_, eligibility) =
            call(&app, "GET", &format!("/api/applications/{}/eligibility", id), None).await;
        assert_eq!(eligibility["definitively_ineligible"], true);
        assert_eq!(eligibility["failing"][0]["section"], "Household");
        assert_eq!(
            eligibility["failing"][0]["question"],
            "How many people live with you?"
        );
        assert_eq!(eligibility["failing"][0]["requirement"], "<= 4");
        assert!(!eligibility.to_string().contains("household_size"));
        assert!(!view.to_string().contains("household_size"));

        let (status, body) =
            call(&app, "POST", &format!("/api/applications/{}/submit", id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!body["error"].as_str().unwrap().contains("household_size"));
    }

    #[tokio::test]
    async fn test_unknown_application() {
        let (app, _) = app().await;
        let uri = format!("/api/applications/{}/blocks", Uuid::new_v4());
        let (status, body) = call(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "We could not find that application.");
    }

    #[tokio::test]
    async fn test_validate_predicate_reports_errors() {
        let (app, _) = app().await;
        let uri = "/api/programs/snap/predicates/validate";

        let (status, body) = call(&app, "POST", uri, Some(json!({ "predicate": "household_size.number > 2" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);

        let (_, body) = call(&app, "POST", uri, Some(json!({ "predicate": "income.number > 2" }))).await;
        assert_eq!(body["valid"], false);
        assert!(body["errors"][0].as_str().unwrap().contains("income"));

        let (status, _) = call(&app, "POST", uri, Some(json!({ "predicate": "household_size.number >" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_publish_without_draft() {
        let (app, state) = app().await;
        let (status, body) = call(&app, "POST", "/api/programs/snap/publish", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("snap"));

        state.service.store().graph().create_draft("snap").await.unwrap();
        let (status, body) = call(&app, "POST", "/api/programs/snap/publish", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], 2);
    }
}
