//! REST + WebSocket endpoints for questionnaire sessions.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        FromRequestParts, Path, State,
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::QuestionnaireOptions;
use super::session::{QuestionnaireSession, SessionRegistry};
use super::state::{WizardEvent, WizardState};
use crate::error::QuestionnaireError;
use crate::identity::{AuthUser, bearer_token};
use crate::mailer::{MailTransport, compose_itinerary_email};

/// Records returned by `GET /api/preferences`.
const PREFERENCES_PAGE_SIZE: usize = 20;

/// Shared state for questionnaire routes.
#[derive(Clone)]
pub struct QuestionnaireRouteState {
    pub registry: Arc<SessionRegistry>,
    /// `None` when SMTP is not configured.
    pub mailer: Option<Arc<dyn MailTransport>>,
}

/// Messages pushed to WebSocket clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsMessage {
    Sync { state: WizardState },
    Update { event: &'static str, state: WizardState },
    Error { message: String },
}

/// Build the questionnaire router.
pub fn questionnaire_routes(state: QuestionnaireRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/questionnaire", post(create_session))
        .route("/api/questionnaire/options", get(options))
        .route(
            "/api/questionnaire/{id}",
            get(get_session).delete(delete_session),
        )
        .route("/api/questionnaire/{id}/events", post(post_event))
        .route("/api/questionnaire/{id}/submit", post(submit))
        .route("/api/questionnaire/{id}/recommendation", get(get_recommendation))
        .route("/api/questionnaire/{id}/email", post(email_itinerary))
        .route("/api/questionnaire/{id}/ws", get(ws_handler))
        .route("/api/preferences", get(list_preferences))
        .with_state(state)
}

// ── Responses ───────────────────────────────────────────────────────────

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn redirect_response(status: StatusCode, message: impl Into<String>, redirect: &str) -> Response {
    (
        status,
        Json(json!({ "error": message.into(), "redirect": redirect })),
    )
        .into_response()
}

fn session_not_found(id: Uuid) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("No questionnaire session {id}"),
    )
}

fn submit_error_response(error: QuestionnaireError) -> Response {
    let message = error.to_string();
    match error {
        QuestionnaireError::NotAuthenticated => {
            redirect_response(StatusCode::UNAUTHORIZED, message, "/login")
        }
        QuestionnaireError::SubmissionInFlight | QuestionnaireError::AlreadySubmitted => {
            error_response(StatusCode::CONFLICT, message)
        }
        QuestionnaireError::ValidationIncomplete { step } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": message, "step": step })),
        )
            .into_response(),
        QuestionnaireError::PersistenceFailure(_) | QuestionnaireError::GenerationFailure(_) => {
            error_response(StatusCode::BAD_GATEWAY, message)
        }
    }
}

/// Session id from the path. Malformed ids get a JSON 400.
struct SessionId(Uuid);

impl<S: Send + Sync> FromRequestParts<S> for SessionId {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<Uuid>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(Self(id)),
            Err(rejection) => Err(error_response(
                rejection.status(),
                format!("Invalid session id: {}", rejection.body_text()),
            )),
        }
    }
}

fn access_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    bearer_token(header).map(String::from)
}

async fn lookup(state: &QuestionnaireRouteState, id: Uuid) -> Result<Arc<QuestionnaireSession>, Response> {
    state.registry.get(id).await.ok_or_else(|| session_not_found(id))
}

async fn signed_in_user(
    state: &QuestionnaireRouteState,
    headers: &HeaderMap,
) -> Result<AuthUser, Response> {
    let token = access_token(headers);
    match state
        .registry
        .deps()
        .identity
        .current_user(token.as_deref())
        .await
    {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(redirect_response(
            StatusCode::UNAUTHORIZED,
            QuestionnaireError::NotAuthenticated.to_string(),
            "/login",
        )),
        Err(e) => {
            warn!(error = %e, "Identity lookup failed");
            Err(redirect_response(
                StatusCode::UNAUTHORIZED,
                QuestionnaireError::NotAuthenticated.to_string(),
                "/login",
            ))
        }
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "trip-planner"
    }))
}

// ── Sessions ────────────────────────────────────────────────────────────

/// GET /api/questionnaire/options
async fn options() -> impl IntoResponse {
    Json(QuestionnaireOptions::new())
}

/// POST /api/questionnaire
async fn create_session(State(state): State<QuestionnaireRouteState>) -> impl IntoResponse {
    let session = state.registry.create().await;
    let snapshot = session.snapshot().await;
    (
        StatusCode::CREATED,
        Json(json!({ "session_id": session.id(), "state": snapshot })),
    )
}

/// GET /api/questionnaire/{id}
async fn get_session(
    State(state): State<QuestionnaireRouteState>,
    SessionId(id): SessionId,
) -> Response {
    match lookup(&state, id).await {
        Ok(session) => Json(session.snapshot().await).into_response(),
        Err(resp) => resp,
    }
}

/// DELETE /api/questionnaire/{id}
async fn delete_session(
    State(state): State<QuestionnaireRouteState>,
    SessionId(id): SessionId,
) -> Response {
    if state.registry.remove(id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        session_not_found(id)
    }
}

/// POST /api/questionnaire/{id}/events
///
/// Applies one user-input event and returns the resulting state.
async fn post_event(
    State(state): State<QuestionnaireRouteState>,
    SessionId(id): SessionId,
    body: Result<Json<WizardEvent>, JsonRejection>,
) -> Response {
    let session = match lookup(&state, id).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let event = match body {
        Ok(Json(event)) => event,
        Err(rejection) => {
            return error_response(
                rejection.status(),
                format!("Invalid event: {}", rejection.body_text()),
            );
        }
    };
    if !event.is_user_input() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Event '{}' cannot be sent by clients", event.kind()),
        );
    }
    Json(session.dispatch(event).await).into_response()
}

/// POST /api/questionnaire/{id}/submit
///
/// Runs the submission on its own task so a dropped request cannot leave
/// the session stuck in the loading state.
async fn submit(
    State(state): State<QuestionnaireRouteState>,
    SessionId(id): SessionId,
    headers: HeaderMap,
) -> Response {
    let session = match lookup(&state, id).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let token = access_token(&headers);

    let task = tokio::spawn(async move { session.submit(token.as_deref()).await });
    match task.await {
        Ok(Ok(view)) => Json(view).into_response(),
        Ok(Err(e)) => submit_error_response(e),
        Err(e) => {
            warn!(session_id = %id, error = %e, "Submit task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Submission failed")
        }
    }
}

/// GET /api/questionnaire/{id}/recommendation
async fn get_recommendation(
    State(state): State<QuestionnaireRouteState>,
    SessionId(id): SessionId,
) -> Response {
    let session = match lookup(&state, id).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    match session.snapshot().await.results {
        Some(view) => Json(view).into_response(),
        None => redirect_response(
            StatusCode::NOT_FOUND,
            "No preferences have been submitted",
            "/questionnaire",
        ),
    }
}

/// POST /api/questionnaire/{id}/email
///
/// Sends the settled itinerary to the submitter's address. Other users get
/// a 403.
async fn email_itinerary(
    State(state): State<QuestionnaireRouteState>,
    SessionId(id): SessionId,
    headers: HeaderMap,
) -> Response {
    let Some(mailer) = state.mailer.clone() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "E-mail is not configured");
    };
    let session = match lookup(&state, id).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    let user = match signed_in_user(&state, &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let Some(record) = session.submitted_record().await else {
        return redirect_response(
            StatusCode::NOT_FOUND,
            "No preferences have been submitted",
            "/questionnaire",
        );
    };
    if record.user_id != user.id {
        warn!(session_id = %id, user_id = %user.id, "E-mail requested by someone other than the submitter");
        return error_response(
            StatusCode::FORBIDDEN,
            "This itinerary belongs to another user",
        );
    }
    let view = session.snapshot().await.results.unwrap_or_default();
    if view.loading || view.failed {
        return error_response(StatusCode::CONFLICT, "The itinerary is not ready");
    }
    let Some(address) = user.email.filter(|e| !e.is_empty()) else {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "No e-mail address on file",
        );
    };

    let email = compose_itinerary_email(&address, &record, &view.plain_text);
    match mailer.send(email).await {
        Ok(()) => Json(json!({ "message": "Email sent successfully" })).into_response(),
        Err(e) => {
            warn!(session_id = %id, error = %e, "Failed to send itinerary e-mail");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

/// GET /api/preferences
async fn list_preferences(
    State(state): State<QuestionnaireRouteState>,
    headers: HeaderMap,
) -> Response {
    let user = match signed_in_user(&state, &headers).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    match state
        .registry
        .deps()
        .db
        .list_preferences(&user.id, PREFERENCES_PAGE_SIZE)
        .await
    {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Failed to list preferences");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load preferences")
        }
    }
}

// ── WebSocket ───────────────────────────────────────────────────────────

/// GET /api/questionnaire/{id}/ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<QuestionnaireRouteState>,
    SessionId(id): SessionId,
) -> Response {
    match lookup(&state, id).await {
        Ok(session) => {
            info!(session_id = %id, "WebSocket client connecting");
            ws.on_upgrade(move |socket| handle_socket(socket, session))
        }
        Err(resp) => resp,
    }
}

async fn send_json(socket: &mut WebSocket, msg: &WsMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket message");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, session: Arc<QuestionnaireSession>) {
    // Subscribe first so nothing between the snapshot and the loop is lost.
    let mut rx = session.subscribe();

    let sync = WsMessage::Sync {
        state: session.snapshot().await,
    };
    if !send_json(&mut socket, &sync).await {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(update) => {
                        let msg = WsMessage::Update { event: update.event, state: update.state };
                        if !send_json(&mut socket, &msg).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind broadcast");
                        let sync = WsMessage::Sync { state: session.snapshot().await };
                        if !send_json(&mut socket, &sync).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&text, &session).await {
                            if !send_json(&mut socket, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %session.id(), "WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Apply an event sent over the socket. The resulting state arrives through
/// the broadcast; only rejections are answered directly.
async fn handle_client_message(text: &str, session: &QuestionnaireSession) -> Option<WsMessage> {
    let event: WizardEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            return Some(WsMessage::Error {
                message: format!("Invalid event: {e}"),
            });
        }
    };
    if !event.is_user_input() {
        return Some(WsMessage::Error {
            message: format!("Event '{}' cannot be sent by clients", event.kind()),
        });
    }
    session.dispatch(event).await;
    None
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, header::CONTENT_TYPE};
    use tower::ServiceExt;

    use super::*;
    use crate::identity::StaticIdentity;
    use crate::questionnaire::requester::stub::StubLlm;
    use crate::questionnaire::requester::{RecommendationRequester, RequesterConfig};
    use crate::questionnaire::session::{SessionDeps, SessionLimits};
    use crate::store::LibSqlBackend;

    async fn test_router(identity: StaticIdentity) -> Router {
        let llm = Arc::new(StubLlm::replying("**Day 1**"));
        let registry = SessionRegistry::new(
            SessionDeps {
                identity: Arc::new(identity),
                db: Arc::new(LibSqlBackend::new_memory().await.unwrap()),
                requester: Arc::new(RecommendationRequester::new(llm, RequesterConfig::default())),
            },
            SessionLimits::default(),
        );
        questionnaire_routes(QuestionnaireRouteState {
            registry,
            mailer: None,
        })
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn create(router: &Router) -> String {
        let (status, body) = call(router, empty("POST", "/api/questionnaire")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["state"]["step"], 1);
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_check() {
        let router = test_router(StaticIdentity::anonymous()).await;
        let (status, body) = call(&router, empty("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_and_invalid_session_ids() {
        let router = test_router(StaticIdentity::anonymous()).await;
        let uri = format!("/api/questionnaire/{}", Uuid::new_v4());
        let (status, _) = call(&router, empty("GET", &uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&router, empty("GET", "/api/questionnaire/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid session id"));

        let (status, body) = call(
            &router,
            post_json("/api/questionnaire/42/events", json!({"type": "advance"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn malformed_event_gets_json_error() {
        let router = test_router(StaticIdentity::anonymous()).await;
        let id = create(&router).await;
        let (status, body) = call(
            &router,
            post_json(
                &format!("/api/questionnaire/{id}/events"),
                json!({"type": "teleport"}),
            ),
        )
        .await;
        assert!(status.is_client_error());
        assert!(body["error"].as_str().unwrap().starts_with("Invalid event"));
    }

    #[tokio::test]
    async fn options_describe_the_form() {
        let router = test_router(StaticIdentity::anonymous()).await;
        let (status, body) = call(&router, empty("GET", "/api/questionnaire/options")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activities"][0], "Outdoor Adventures");
        assert_eq!(body["trip_lengths"][1]["value"], "short");
        assert_eq!(body["trip_lengths"][1]["label"], "Short Trip (4-7 days)");
        assert_eq!(body["travel_paces"][1]["label"], "Balanced (Mix of activities and rest)");
    }

    #[tokio::test]
    async fn events_update_state() {
        let router = test_router(StaticIdentity::anonymous()).await;
        let id = create(&router).await;
        let uri = format!("/api/questionnaire/{id}/events");

        let (status, body) = call(&router, post_json(&uri, json!({"type": "advance"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], 1);
        assert_eq!(
            body["error_message"],
            "Please complete all required fields before continuing"
        );

        let (status, body) = call(
            &router,
            post_json(&uri, json!({"type": "set_custom_days", "input": "5"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["draft"]["trip_length"], "5 days");

        let (_, body) = call(&router, empty("GET", &format!("/api/questionnaire/{id}"))).await;
        assert_eq!(body["custom_day_count"], 5);
    }

    #[tokio::test]
    async fn internal_events_are_rejected() {
        let router = test_router(StaticIdentity::anonymous()).await;
        let id = create(&router).await;
        let (status, body) = call(
            &router,
            post_json(
                &format!("/api/questionnaire/{id}/events"),
                json!({"type": "generation_failed", "message": "x"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("generation_failed"));
    }

    #[tokio::test]
    async fn submit_incomplete_is_unprocessable() {
        let router = test_router(StaticIdentity::signed_in("user-1", None)).await;
        let id = create(&router).await;
        let (status, body) = call(
            &router,
            empty("POST", &format!("/api/questionnaire/{id}/submit")),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["step"], 1);
    }

    #[tokio::test]
    async fn recommendation_before_submit_redirects() {
        let router = test_router(StaticIdentity::anonymous()).await;
        let id = create(&router).await;
        let (status, body) = call(
            &router,
            empty("GET", &format!("/api/questionnaire/{id}/recommendation")),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["redirect"], "/questionnaire");
    }

    #[tokio::test]
    async fn email_without_mailer_is_unavailable() {
        let router = test_router(StaticIdentity::signed_in("user-1", None)).await;
        let id = create(&router).await;
        let (status, _) = call(
            &router,
            empty("POST", &format!("/api/questionnaire/{id}/email")),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn preferences_require_sign_in() {
        let router = test_router(StaticIdentity::anonymous()).await;
        let (status, body) = call(&router, empty("GET", "/api/preferences")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["redirect"], "/login");

        let router = test_router(StaticIdentity::signed_in("user-1", None)).await;
        let (status, body) = call(&router, empty("GET", "/api/preferences")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn delete_session() {
        let router = test_router(StaticIdentity::anonymous()).await;
        let id = create(&router).await;
        let uri = format!("/api/questionnaire/{id}");

        let (status, _) = call(&router, empty("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&router, empty("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn submit_errors_map_to_statuses() {
        let cases = [
            (QuestionnaireError::NotAuthenticated, StatusCode::UNAUTHORIZED),
            (QuestionnaireError::SubmissionInFlight, StatusCode::CONFLICT),
            (QuestionnaireError::AlreadySubmitted, StatusCode::CONFLICT),
            (
                QuestionnaireError::ValidationIncomplete { step: 4 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                QuestionnaireError::PersistenceFailure("disk full".into()),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(submit_error_response(error).status(), expected);
        }
    }
}
