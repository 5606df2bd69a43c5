use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::hometown::{CreatePostRequest, PostList, UpdatePostRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::HometownPost,
    response::ApiResponse,
    routes::params::SearchQuery,
    services::hometown_service,
    state::AppState,
};

// Reads go by slug and writes by id; both share the single path segment.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/manage", get(list_manage))
        .route(
            "/{slug}",
            get(get_post).put(update_post).delete(delete_post),
        )
}

#[utoipa::path(
    get,
    path = "/api/hometown",
    params(SearchQuery),
    responses(
        (status = 200, description = "Published posts", body = ApiResponse<PostList>),
    ),
    tag = "Hometown"
)]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<PostList>>> {
    let resp = hometown_service::list_published(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/hometown/manage",
    params(SearchQuery),
    responses(
        (status = 200, description = "Every post including drafts", body = ApiResponse<PostList>),
        (status = 403, description = "Seller only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Hometown"
)]
pub async fn list_manage(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<PostList>>> {
    let resp = hometown_service::list_manage(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/hometown/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Post", body = ApiResponse<HometownPost>),
        (status = 404, description = "Post not found"),
    ),
    tag = "Hometown"
)]
pub async fn get_post(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    Path(slug): Path<String>,
) -> AppResult<Json<ApiResponse<HometownPost>>> {
    let resp = hometown_service::get_by_slug(&state, viewer.as_ref(), &slug).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/hometown",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = ApiResponse<HometownPost>),
        (status = 400, description = "Title or content missing"),
        (status = 403, description = "Seller only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Hometown"
)]
pub async fn create_post(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<HometownPost>>)> {
    payload.validate()?;
    let resp = hometown_service::create_post(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/hometown/{id}",
    params(("id" = Uuid, Path, description = "Post id")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Post updated", body = ApiResponse<HometownPost>),
        (status = 404, description = "Post not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Hometown"
)]
pub async fn update_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> AppResult<Json<ApiResponse<HometownPost>>> {
    payload.validate()?;
    let resp = hometown_service::update_post(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/hometown/{id}",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post deleted", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Post not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Hometown"
)]
pub async fn delete_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = hometown_service::delete_post(&state, &user, id).await?;
    Ok(Json(resp))
}
