use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::delete,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::ratings::{RateProductRequest, RatingList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Rating,
    response::ApiResponse,
    routes::params::Pagination,
    services::rating_service,
    state::AppState,
};

/// Rating lookups by product are mounted under `/products/{id}/ratings`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", delete(delete_rating))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}/ratings",
    params(("id" = Uuid, Path, description = "Product id"), Pagination),
    responses(
        (status = 200, description = "Ratings with average", body = ApiResponse<RatingList>),
        (status = 404, description = "Product not found"),
    ),
    tag = "Ratings"
)]
pub async fn list_ratings(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<RatingList>>> {
    let resp = rating_service::list_ratings(&state, product_id, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products/{id}/ratings",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = RateProductRequest,
    responses(
        (status = 200, description = "Rating saved", body = ApiResponse<Rating>),
        (status = 400, description = "Stars out of range or product not from a delivered order"),
    ),
    security(("bearer_auth" = [])),
    tag = "Ratings"
)]
pub async fn rate_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<RateProductRequest>,
) -> AppResult<Json<ApiResponse<Rating>>> {
    payload.validate()?;
    let resp = rating_service::rate_product(&state, &user, product_id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/ratings/{id}",
    params(("id" = Uuid, Path, description = "Rating id")),
    responses(
        (status = 200, description = "Rating deleted", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Rating not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Ratings"
)]
pub async fn delete_rating(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = rating_service::delete_rating(&state, &user, id).await?;
    Ok(Json(resp))
}
