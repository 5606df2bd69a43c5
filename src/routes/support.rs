use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::support::{ConversationList, MessageList, SendMessageRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::{SupportConversation, SupportMessage},
    response::ApiResponse,
    routes::params::Pagination,
    services::support_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/conversations",
            get(list_conversations).post(open_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/{id}/read", post(mark_read))
        .route("/conversations/{id}/close", patch(close_conversation))
}

#[utoipa::path(
    post,
    path = "/api/support/conversations",
    responses(
        (status = 200, description = "The customer's open conversation, created when missing", body = ApiResponse<SupportConversation>),
        (status = 403, description = "Customer only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Support"
)]
pub async fn open_conversation(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<SupportConversation>>> {
    let resp = support_service::open_conversation(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/support/conversations",
    params(Pagination),
    responses(
        (status = 200, description = "Own conversations, or every conversation for sellers", body = ApiResponse<ConversationList>),
    ),
    security(("bearer_auth" = [])),
    tag = "Support"
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ConversationList>>> {
    let resp = support_service::list_conversations(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/support/conversations/{id}/messages",
    params(("id" = Uuid, Path, description = "Conversation id"), Pagination),
    responses(
        (status = 200, description = "Messages in chronological order", body = ApiResponse<MessageList>),
        (status = 404, description = "Conversation not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Support"
)]
pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<MessageList>>> {
    let resp = support_service::list_messages(&state, &user, id, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/support/conversations/{id}/messages",
    params(("id" = Uuid, Path, description = "Conversation id")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message stored and relayed", body = ApiResponse<SupportMessage>),
        (status = 400, description = "Empty, too long, or conversation closed"),
        (status = 404, description = "Conversation not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Support"
)]
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<Json<ApiResponse<SupportMessage>>> {
    payload.validate()?;
    let resp = support_service::post_message(&state, &user, id, &payload.content).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/support/conversations/{id}/read",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Unread counter cleared", body = ApiResponse<SupportConversation>),
        (status = 404, description = "Conversation not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Support"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SupportConversation>>> {
    let resp = support_service::read_conversation(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/support/conversations/{id}/close",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Conversation closed", body = ApiResponse<SupportConversation>),
        (status = 403, description = "Seller only"),
        (status = 404, description = "Conversation not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Support"
)]
pub async fn close_conversation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SupportConversation>>> {
    let resp = support_service::close_conversation(&state, &user, id).await?;
    Ok(Json(resp))
}
