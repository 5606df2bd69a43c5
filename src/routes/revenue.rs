use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::revenue::{
        DailyRevenueList, DailyRevenueQuery, RevenueRangeQuery, RevenueSummary, TopProductList,
        TopProductsQuery,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::revenue_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/daily", get(daily))
        .route("/top-products", get(top_products))
}

#[utoipa::path(
    get,
    path = "/api/revenue/summary",
    params(RevenueRangeQuery),
    responses(
        (status = 200, description = "Revenue totals and order counts per status", body = ApiResponse<RevenueSummary>),
        (status = 403, description = "Seller only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Revenue"
)]
pub async fn summary(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RevenueRangeQuery>,
) -> AppResult<Json<ApiResponse<RevenueSummary>>> {
    let resp = revenue_service::summary(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/revenue/daily",
    params(DailyRevenueQuery),
    responses(
        (status = 200, description = "Paid revenue per day", body = ApiResponse<DailyRevenueList>),
        (status = 403, description = "Seller only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Revenue"
)]
pub async fn daily(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<DailyRevenueQuery>,
) -> AppResult<Json<ApiResponse<DailyRevenueList>>> {
    let resp = revenue_service::daily(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/revenue/top-products",
    params(TopProductsQuery),
    responses(
        (status = 200, description = "Best-selling products", body = ApiResponse<TopProductList>),
        (status = 403, description = "Seller only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Revenue"
)]
pub async fn top_products(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TopProductsQuery>,
) -> AppResult<Json<ApiResponse<TopProductList>>> {
    let resp = revenue_service::top_products(&state, &user, query).await?;
    Ok(Json(resp))
}
