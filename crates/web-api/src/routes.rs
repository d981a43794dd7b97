use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use application::MAX_HISTORY_LIMIT;
use domain::{ChatMessage, DisplayName};

use crate::{auth::SessionResponse, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct SessionPayload {
    username: String,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    body: String,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/session", post(create_session))
        .route("/messages", post(send_message).get(get_history))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 登记显示名称并签发令牌
async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionPayload>,
) -> Result<Json<SessionResponse>, ApiError> {
    let username = DisplayName::parse(payload.username)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    let token = state.jwt_service.generate_token(&username)?;

    tracing::info!(username = %username, "显示名称已登记");
    Ok(Json(SessionResponse { token, username }))
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    // 正文校验优先于身份检查，交给服务处理
    let identity = state.jwt_service.extract_name_from_headers(&headers).ok();
    let message = state
        .chat_service
        .post_message(identity.as_ref().map(DisplayName::as_str), &payload.body)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    state.jwt_service.extract_name_from_headers(&headers)?;

    let limit = query.limit.unwrap_or(MAX_HISTORY_LIMIT);
    let items = state.chat_service.recent_messages(limit).await?;

    Ok(Json(items))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let name = state.jwt_service.verify_token(&query.token)?;
    let hub = state.hub().clone();

    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, hub, name).run()))
}
