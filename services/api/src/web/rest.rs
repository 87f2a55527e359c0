//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skin_consult_core::{
    controller::{ConversationController, TurnOutcome},
    domain::{ChatSession, Dermatologist, ImagePayload, Message, Role, Severity},
    ports::PortError,
};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_sessions_handler,
        create_session_handler,
        current_session_handler,
        select_session_handler,
        delete_session_handler,
        send_message_handler,
        find_specialists_handler,
    ),
    components(
        schemas(
            SessionSummary,
            SessionView,
            MessageView,
            ImageView,
            AnalysisView,
            TurnResponse,
            SpecialistView,
        )
    ),
    tags(
        (name = "Skin Consult API", description = "API endpoints for the AI dermatology consultation assistant.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A sidebar-sized view of one session.
#[derive(Serialize, ToSchema)]
pub struct SessionSummary {
    id: Uuid,
    title: String,
    last_updated: DateTime<Utc>,
    message_count: usize,
}

impl From<&ChatSession> for SessionSummary {
    fn from(session: &ChatSession) -> Self {
        Self {
            id: session.id,
            title: session.title.clone(),
            last_updated: session.last_updated,
            message_count: session.messages.len(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ImageView {
    mime_type: String,
    /// Base64 of the original image bytes.
    data: String,
}

#[derive(Serialize, ToSchema)]
pub struct AnalysisView {
    condition_name: String,
    confidence_score: f32,
    severity: String,
    description: String,
    symptoms_observed: Vec<String>,
    recommendations: Vec<String>,
    treatment_options: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct MessageView {
    id: Uuid,
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<ImageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<AnalysisView>,
    timestamp: DateTime<Utc>,
}

/// The full transcript of one session.
#[derive(Serialize, ToSchema)]
pub struct SessionView {
    id: Uuid,
    title: String,
    messages: Vec<MessageView>,
    last_updated: DateTime<Utc>,
}

/// The result of submitting one turn.
#[derive(Serialize, ToSchema)]
pub struct TurnResponse {
    /// One of `completed`, `failed`, `discarded` or `ignored`.
    outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<SessionView>,
}

#[derive(Serialize, ToSchema)]
pub struct SpecialistView {
    name: String,
    clinic_name: String,
    address: String,
    phone: String,
    rating: String,
    distance: String,
}

impl From<Dermatologist> for SpecialistView {
    fn from(d: Dermatologist) -> Self {
        Self {
            name: d.name,
            clinic_name: d.clinic_name,
            address: d.address,
            phone: d.phone,
            rating: d.rating,
            distance: d.distance,
        }
    }
}

/// Coordinates of the device's geolocation fix.
#[derive(Deserialize, IntoParams)]
pub struct SpecialistQuery {
    lat: f64,
    lon: f64,
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Mild => "Mild",
        Severity::Moderate => "Moderate",
        Severity::Severe => "Severe",
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            role: role_label(message.role).to_string(),
            content: message.content.clone(),
            image: message.image.as_ref().map(|image| ImageView {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            }),
            analysis: message.analysis.as_ref().map(|analysis| AnalysisView {
                condition_name: analysis.condition_name.clone(),
                confidence_score: analysis.confidence_score,
                severity: severity_label(analysis.severity).to_string(),
                description: analysis.description.clone(),
                symptoms_observed: analysis.symptoms_observed.clone(),
                recommendations: analysis.recommendations.clone(),
                treatment_options: analysis.treatment_options.clone(),
            }),
            timestamp: message.timestamp,
        }
    }
}

impl From<&ChatSession> for SessionView {
    fn from(session: &ChatSession) -> Self {
        Self {
            id: session.id,
            title: session.title.clone(),
            messages: session.messages.iter().map(MessageView::from).collect(),
            last_updated: session.last_updated,
        }
    }
}

/// Maps a port error to the HTTP response the client sees.
fn port_error_response(e: PortError) -> (StatusCode, String) {
    let status = match e {
        PortError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        PortError::TurnInFlight => StatusCode::CONFLICT,
        PortError::Analysis(_) | PortError::Chat(_) | PortError::Location(_) => {
            StatusCode::BAD_GATEWAY
        }
        PortError::Storage(_) | PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List all consultation sessions, most recently created first.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "All sessions", body = [SessionSummary])
    )
)]
pub async fn list_sessions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let consultation = app_state.consultation.lock().await;
    let summaries: Vec<SessionSummary> = consultation
        .store
        .sessions()
        .iter()
        .map(SessionSummary::from)
        .collect();
    Ok(Json(summaries))
}

/// Create a new consultation session and select it as current.
#[utoipa::path(
    post,
    path = "/sessions",
    responses(
        (status = 201, description = "Session created successfully", body = SessionView),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut consultation = app_state.consultation.lock().await;
    let session = consultation
        .store
        .create_session()
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(SessionView::from(&session))))
}

/// Fetch the currently selected session in full.
#[utoipa::path(
    get,
    path = "/sessions/current",
    responses(
        (status = 200, description = "The current session", body = SessionView),
        (status = 404, description = "No session exists")
    )
)]
pub async fn current_session_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let consultation = app_state.consultation.lock().await;
    let session = consultation
        .store
        .current()
        .ok_or((StatusCode::NOT_FOUND, "No session exists".to_string()))?;
    Ok(Json(SessionView::from(session)))
}

/// Select the given session as current.
#[utoipa::path(
    post,
    path = "/sessions/{id}/select",
    responses(
        (status = 200, description = "Session selected", body = SessionView),
        (status = 404, description = "Unknown session id")
    ),
    params(
        ("id" = Uuid, Path, description = "The session to select.")
    )
)]
pub async fn select_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut consultation = app_state.consultation.lock().await;
    consultation
        .store
        .select_session(id)
        .map_err(port_error_response)?;
    let session = consultation.store.session(id).ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Selected session disappeared".to_string(),
    ))?;
    Ok(Json(SessionView::from(session)))
}

/// Delete a session. The collection is never left empty: deleting the last
/// session produces a fresh one, and deleting the current session selects
/// the next most recent.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "Session deleted; the refreshed current session", body = SessionView),
        (status = 404, description = "Unknown session id")
    ),
    params(
        ("id" = Uuid, Path, description = "The session to delete.")
    )
)]
pub async fn delete_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut consultation = app_state.consultation.lock().await;
    consultation
        .store
        .delete_session(id)
        .await
        .map_err(port_error_response)?;
    let current = consultation
        .store
        .current()
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "No session selected after delete".to_string()))?;
    Ok(Json(SessionView::from(current)))
}

/// Submit one user turn: text and/or an attached image as multipart form data.
///
/// The user message is appended immediately; the assistant reply (or the
/// inline error) follows once the gateway call resolves. A blank turn is a
/// no-op. While another turn is in flight the endpoint answers 409.
#[utoipa::path(
    post,
    path = "/sessions/{id}/messages",
    request_body(content_type = "multipart/form-data", description = "An optional `text` field and an optional `image` file part."),
    responses(
        (status = 200, description = "Turn processed", body = TurnResponse),
        (status = 404, description = "Unknown session id"),
        (status = 409, description = "A turn is already in flight"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("id" = Uuid, Path, description = "The session the turn belongs to.")
    )
)]
pub async fn send_message_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // --- Read the multipart form ---
    let mut text = String::new();
    let mut image: Option<ImagePayload> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => {
                text = field.text().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read text field: {}", e),
                    )
                })?;
            }
            "image" => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("image/jpeg")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read image bytes: {}", e),
                    )
                })?;
                image = Some(ImagePayload {
                    mime_type,
                    data: BASE64.encode(&bytes),
                });
            }
            _ => {}
        }
    }

    // --- Phase 1: append the user message and enter Sending ---
    let pending = {
        let mut guard = app_state.consultation.lock().await;
        let consultation = &mut *guard;
        consultation
            .controller
            .begin_turn(&mut consultation.store, id, &text, image)
            .await
            .map_err(port_error_response)?
    };

    let Some(pending) = pending else {
        let guard = app_state.consultation.lock().await;
        return Ok(Json(TurnResponse {
            outcome: "ignored".to_string(),
            error: None,
            session: guard.store.session(id).map(SessionView::from),
        }));
    };

    // --- Gateway dispatch, with the lock released ---
    let reply = ConversationController::resolve_reply(
        app_state.analysis_adapter.as_ref(),
        app_state.chat_adapter.as_ref(),
        &pending,
    )
    .await;

    // --- Phase 2: append the reply or record the failure ---
    let mut guard = app_state.consultation.lock().await;
    let consultation = &mut *guard;
    let outcome = consultation
        .controller
        .complete_turn(&mut consultation.store, id, reply)
        .await
        .map_err(port_error_response)?;

    let (outcome, error) = match outcome {
        TurnOutcome::Completed => ("completed".to_string(), None),
        TurnOutcome::Failed(description) => ("failed".to_string(), Some(description)),
        TurnOutcome::Discarded => ("discarded".to_string(), None),
    };
    Ok(Json(TurnResponse {
        outcome,
        error,
        session: consultation.store.session(id).map(SessionView::from),
    }))
}

/// Find dermatologists near the device's geolocation fix.
#[utoipa::path(
    get,
    path = "/specialists",
    responses(
        (status = 200, description = "Nearby specialists, in lookup order", body = [SpecialistView]),
        (status = 502, description = "The lookup failed")
    ),
    params(SpecialistQuery)
)]
pub async fn find_specialists_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<SpecialistQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let specialists = app_state
        .specialist_adapter
        .find_specialists(query.lat, query.lon)
        .await
        .map_err(|e| {
            error!("Specialist lookup failed: {:?}", e);
            port_error_response(e)
        })?;

    let views: Vec<SpecialistView> = specialists.into_iter().map(SpecialistView::from).collect();
    Ok(Json(views))
}
