use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
};

use crate::{
    dto::payments::{CreatePaymentRequest, PaymentResult, VnpayPayment, ZalopayPayment},
    error::AppResult,
    integrations::{
        vnpay::IpnResponse,
        zalopay::{CallbackRequest, CallbackResponse},
    },
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/vnpay/create", post(create_vnpay_payment))
        .route("/vnpay/return", get(vnpay_return))
        .route("/vnpay/ipn", get(vnpay_ipn))
        .route("/zalopay/create", post(create_zalopay_payment))
        .route("/zalopay/callback", post(zalopay_callback))
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`, else loopback.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("127.0.0.1")
        .to_string()
}

#[utoipa::path(
    post,
    path = "/api/payments/vnpay/create",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Signed VNPay checkout URL", body = ApiResponse<VnpayPayment>),
        (status = 400, description = "Order already paid, cancelled or not a VNPay order"),
        (status = 503, description = "VNPay is not configured"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_vnpay_payment(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentRequest>,
) -> AppResult<Json<ApiResponse<VnpayPayment>>> {
    let ip = client_ip(&headers);
    let resp = payment_service::create_vnpay_payment(&state, &user, payload, &ip).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/payments/vnpay/return",
    params(("vnp_TxnRef" = String, Query, description = "Payment reference; every vnp_* field is forwarded")),
    responses(
        (status = 200, description = "Payment outcome", body = ApiResponse<PaymentResult>),
        (status = 400, description = "Invalid signature"),
    ),
    tag = "Payments"
)]
pub async fn vnpay_return(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<ApiResponse<PaymentResult>>> {
    let resp = payment_service::vnpay_return(&state, params).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/payments/vnpay/ipn",
    params(("vnp_TxnRef" = String, Query, description = "Payment reference; every vnp_* field is forwarded")),
    responses(
        (status = 200, description = "VNPay acknowledgement code", body = IpnResponse),
    ),
    tag = "Payments"
)]
pub async fn vnpay_ipn(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<IpnResponse> {
    Json(payment_service::vnpay_ipn(&state, params).await)
}

#[utoipa::path(
    post,
    path = "/api/payments/zalopay/create",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "ZaloPay order URL", body = ApiResponse<ZalopayPayment>),
        (status = 400, description = "Order already paid, cancelled or not a ZaloPay order"),
        (status = 502, description = "ZaloPay rejected the order"),
        (status = 503, description = "ZaloPay is not configured"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_zalopay_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> AppResult<Json<ApiResponse<ZalopayPayment>>> {
    let resp = payment_service::create_zalopay_payment(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/zalopay/callback",
    request_body = CallbackRequest,
    responses(
        (status = 200, description = "ZaloPay acknowledgement code", body = CallbackResponse),
    ),
    tag = "Payments"
)]
pub async fn zalopay_callback(
    State(state): State<AppState>,
    Json(payload): Json<CallbackRequest>,
) -> Json<CallbackResponse> {
    Json(payment_service::zalopay_callback(&state, payload).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "127.0.0.1");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers), "10.0.0.9");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.113.1.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "203.113.1.7");
    }
}
