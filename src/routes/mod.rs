use axum::{
    Json, Router,
    http::{StatusCode, Uri},
    routing::get,
};

use crate::{
    realtime::gateway,
    response::ApiResponse,
    state::AppState,
};

pub mod auth;
pub mod cart;
pub mod chatbot;
pub mod doc;
pub mod favorites;
pub mod health;
pub mod hometown;
pub mod media;
pub mod notifications;
pub mod orders;
pub mod params;
pub mod payments;
pub mod products;
pub mod ratings;
pub mod revenue;
pub mod support;
pub mod users;
pub mod vouchers;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/products", products::router())
        .nest("/ratings", ratings::router())
        .nest("/favorites", favorites::router())
        .nest("/cart", cart::router())
        .nest("/vouchers", vouchers::router())
        .nest("/orders", orders::route())
        .nest("/payments", payments::router())
        .nest("/notifications", notifications::router())
        .nest("/revenue", revenue::router())
        .nest("/support", support::router())
        .nest("/chatbot", chatbot::router())
        .nest("/media", media::router())
        .nest("/hometown", hometown::router())
}

/// Full application router with state bound. Middleware layers are added by
/// the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ws", get(gateway::ws_handler))
        .nest("/api", create_api_router())
        .merge(doc::scalar_docs())
        .fallback(not_found)
        .with_state(state)
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ApiResponse<serde_json::Value>>) {
    let body = ApiResponse::failure(
        "Not Found",
        Some(serde_json::json!({ "path": uri.path() })),
    );
    (StatusCode::NOT_FOUND, Json(body))
}
