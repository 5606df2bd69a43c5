use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::vouchers::{
        ApplyVoucherRequest, CreateVoucherRequest, UpdateVoucherRequest, VoucherList, VoucherQuote,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Voucher,
    response::ApiResponse,
    routes::params::Pagination,
    services::voucher_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_available).post(create_voucher))
        .route("/apply", post(apply_voucher))
        .route("/all", get(list_all))
        .route("/{id}", put(update_voucher).delete(delete_voucher))
}

#[utoipa::path(
    get,
    path = "/api/vouchers",
    responses(
        (status = 200, description = "Vouchers currently usable", body = ApiResponse<VoucherList>),
    ),
    tag = "Vouchers"
)]
pub async fn list_available(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<VoucherList>>> {
    let resp = voucher_service::list_available(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/vouchers/apply",
    request_body = ApplyVoucherRequest,
    responses(
        (status = 200, description = "Price quote with the voucher applied", body = ApiResponse<VoucherQuote>),
        (status = 400, description = "Voucher expired, exhausted or below minimum order"),
        (status = 404, description = "Unknown voucher code"),
    ),
    tag = "Vouchers"
)]
pub async fn apply_voucher(
    State(state): State<AppState>,
    Json(payload): Json<ApplyVoucherRequest>,
) -> AppResult<Json<ApiResponse<VoucherQuote>>> {
    payload.validate()?;
    let resp = voucher_service::apply_voucher(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/vouchers/all",
    params(Pagination),
    responses(
        (status = 200, description = "Every voucher", body = ApiResponse<VoucherList>),
        (status = 403, description = "Seller only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Vouchers"
)]
pub async fn list_all(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<VoucherList>>> {
    let resp = voucher_service::list_all(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/vouchers",
    request_body = CreateVoucherRequest,
    responses(
        (status = 201, description = "Voucher created", body = ApiResponse<Voucher>),
        (status = 400, description = "Invalid terms"),
        (status = 409, description = "Code already exists"),
    ),
    security(("bearer_auth" = [])),
    tag = "Vouchers"
)]
pub async fn create_voucher(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateVoucherRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Voucher>>)> {
    payload.validate()?;
    let resp = voucher_service::create_voucher(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/vouchers/{id}",
    params(("id" = Uuid, Path, description = "Voucher id")),
    request_body = UpdateVoucherRequest,
    responses(
        (status = 200, description = "Voucher updated", body = ApiResponse<Voucher>),
        (status = 404, description = "Voucher not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Vouchers"
)]
pub async fn update_voucher(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateVoucherRequest>,
) -> AppResult<Json<ApiResponse<Voucher>>> {
    payload.validate()?;
    let resp = voucher_service::update_voucher(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/vouchers/{id}",
    params(("id" = Uuid, Path, description = "Voucher id")),
    responses(
        (status = 200, description = "Voucher deleted", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Voucher not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Vouchers"
)]
pub async fn delete_voucher(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = voucher_service::delete_voucher(&state, &user, id).await?;
    Ok(Json(resp))
}
