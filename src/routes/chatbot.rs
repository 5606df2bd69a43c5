use axum::{Json, Router, extract::State, routing::post};
use validator::Validate;

use crate::{
    dto::chatbot::{ChatbotReply, ChatbotRequest},
    error::AppResult,
    response::ApiResponse,
    services::chatbot_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(chat))
}

#[utoipa::path(
    post,
    path = "/api/chatbot",
    request_body = ChatbotRequest,
    responses(
        (status = 200, description = "Assistant reply with matching products", body = ApiResponse<ChatbotReply>),
        (status = 400, description = "Empty message"),
    ),
    tag = "Chatbot"
)]
pub async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatbotRequest>,
) -> AppResult<Json<ApiResponse<ChatbotReply>>> {
    payload.validate()?;
    let resp = chatbot_service::chat(&state, payload).await?;
    Ok(Json(resp))
}
