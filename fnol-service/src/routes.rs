//! HTTP surface: one endpoint per conversational-turn operation.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::{error, info};

use fnol_flow::evidence::ExtractedEntities;
use fnol_flow::machine::{SummaryResponse, TurnInput, TurnResponse};
use fnol_flow::{EvidenceKind, FnolError, FnolMachine, InMemoryEvidenceStore, ProductLine};

#[derive(Clone)]
pub struct AppState {
    pub machine: Arc<FnolMachine>,
    pub evidence: Arc<InMemoryEvidenceStore>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub policy_id: Option<String>,
    pub user_id: Option<String>,
    pub product_line: Option<ProductLine>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub thread_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct EvidenceRequest {
    pub evidence_ref: String,
    pub kind: EvidenceKind,
    pub subtype: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Ready,
    Processing,
    Invalid,
}

/// Callback body from the extraction pipeline.
#[derive(Debug, Deserialize)]
pub struct ExtractionResultRequest {
    pub evidence_ref: String,
    pub status: ExtractionStatus,
    pub entities: Option<ExtractedEntities>,
    pub reason: Option<String>,
}

fn map_error(err: FnolError) -> StatusCode {
    match err {
        FnolError::SessionNotFound(_) | FnolError::PolicyNotFound(_) => StatusCode::NOT_FOUND,
        FnolError::SessionBusy(_) | FnolError::StoreConflict(_) => StatusCode::CONFLICT,
        FnolError::SessionTerminated(_) => StatusCode::GONE,
        FnolError::EvidenceInvalid(_) | FnolError::PolicyDataIncomplete(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        FnolError::EvidenceNotReady(_)
        | FnolError::SystemUnavailable(_)
        | FnolError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<TurnResponse>, StatusCode> {
    info!(policy_id = ?request.policy_id, "creating FNOL session");
    state
        .machine
        .create_session(request.policy_id, request.user_id, request.product_line)
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "failed to create session");
            map_error(e)
        })
}

pub async fn post_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<TurnResponse>, StatusCode> {
    info!(
        thread_id = %request.thread_id,
        content_length = request.message.len(),
        "processing message"
    );
    state
        .machine
        .advance(&request.thread_id, TurnInput::Message(request.message))
        .await
        .map(Json)
        .map_err(|e| {
            error!(thread_id = %request.thread_id, error = %e, "advance failed");
            map_error(e)
        })
}

pub async fn attach_evidence(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(request): Json<EvidenceRequest>,
) -> Result<Json<TurnResponse>, StatusCode> {
    info!(
        thread_id = %thread_id,
        evidence_ref = %request.evidence_ref,
        "attaching evidence"
    );
    state
        .machine
        .attach_evidence(
            &thread_id,
            request.evidence_ref,
            request.kind,
            request.subtype,
        )
        .await
        .map(Json)
        .map_err(|e| {
            error!(thread_id = %thread_id, error = %e, "attach evidence failed");
            map_error(e)
        })
}

/// Integration point for the external extraction pipeline: it posts the
/// structured result here once an upload has been processed.
pub async fn register_extraction(
    State(state): State<AppState>,
    Json(request): Json<ExtractionResultRequest>,
) -> StatusCode {
    match request.status {
        ExtractionStatus::Ready => match request.entities {
            Some(entities) => {
                state.evidence.put_extracted(&request.evidence_ref, entities);
                StatusCode::NO_CONTENT
            }
            None => StatusCode::BAD_REQUEST,
        },
        ExtractionStatus::Processing => {
            state.evidence.mark_processing(&request.evidence_ref);
            StatusCode::NO_CONTENT
        }
        ExtractionStatus::Invalid => {
            state.evidence.mark_invalid(
                &request.evidence_ref,
                request.reason.as_deref().unwrap_or("extraction failed"),
            );
            StatusCode::NO_CONTENT
        }
    }
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<TurnResponse>, StatusCode> {
    state
        .machine
        .resume(&thread_id)
        .await
        .map(Json)
        .map_err(map_error)
}

pub async fn get_summary(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<SummaryResponse>, StatusCode> {
    state
        .machine
        .get_summary(&thread_id)
        .await
        .map(Json)
        .map_err(map_error)
}

pub async fn abandon_session(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    state
        .machine
        .abandon(&thread_id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| {
            error!(thread_id = %thread_id, error = %e, "abandon failed");
            map_error(e)
        })
}
