use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait};
use uuid::Uuid;

use crate::{
    audit::audit,
    config::{VnpayConfig, ZalopayConfig},
    dto::payments::{CreatePaymentRequest, PaymentResult, VnpayPayment, ZalopayPayment},
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    integrations::{
        vnpay::{self, IpnResponse},
        zalopay::{self, CallbackRequest, CallbackResponse, CreateOrderForm},
    },
    middleware::auth::AuthUser,
    models::{Order, OrderStatus, PaymentMethod, PaymentStatus},
    realtime::hub::{SELLERS_ROOM, ServerEvent},
    response::ApiResponse,
    services::notification_service::{self, NewNotification, ORDER_PAID_EVENT},
    state::AppState,
};

/// Result of applying a gateway confirmation to an order.
#[derive(Debug)]
pub enum Settlement {
    Paid(Order),
    AlreadyPaid(Order),
    /// The customer paid for an order that was cancelled meanwhile. It
    /// stays unpaid and the seller refunds through the gateway dashboard.
    OrderCancelled(Order),
    NotFound,
    AmountMismatch,
}

/// A gateway's confirmation that `amount` VND was captured for `reference`.
#[derive(Debug, Clone)]
pub struct Confirmation<'a> {
    pub reference: &'a str,
    pub amount: i64,
    pub gateway: &'static str,
    /// The gateway's own transaction id, kept in the audit trail.
    pub gateway_txn: Option<String>,
}

impl<'a> Confirmation<'a> {
    fn vnpay(callback: &'a vnpay::Callback) -> Option<Self> {
        Some(Self {
            reference: &callback.txn_ref,
            amount: callback.amount_vnd()?,
            gateway: "vnpay",
            gateway_txn: callback.transaction_no.clone(),
        })
    }
}

fn vnpay_config(state: &AppState) -> AppResult<&VnpayConfig> {
    state
        .config
        .vnpay
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("VNPay is not configured".into()))
}

fn zalopay_config(state: &AppState) -> AppResult<&ZalopayConfig> {
    state
        .config
        .zalopay
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("ZaloPay is not configured".into()))
}

/// Unique per payment attempt: the invoice digits plus a timestamp.
pub fn payment_reference(invoice_number: &str) -> String {
    let compact: String = invoice_number.chars().filter(char::is_ascii_alphanumeric).collect();
    format!("{}{}", compact, Utc::now().format("%H%M%S"))
}

/// Loads the caller's order and checks it can still be paid online with
/// `method`, then records `reference` as its payment reference.
async fn prepare_payment(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    method: PaymentMethod,
    reference: impl FnOnce(&OrderModel) -> String,
) -> AppResult<OrderModel> {
    let order = Orders::find_by_id(order_id)
        .filter(OrderCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.payment_method != method.as_str() {
        return Err(AppError::BadRequest(format!(
            "Order was placed with payment method {}",
            order.payment_method
        )));
    }
    if order.payment_status != PaymentStatus::Unpaid.as_str() {
        return Err(AppError::BadRequest("Order is already paid".into()));
    }
    if order.status == OrderStatus::Cancelled.as_str() {
        return Err(AppError::BadRequest("Order has been cancelled".into()));
    }

    let payment_ref = reference(&order);
    let mut active: OrderActive = order.into();
    active.payment_ref = Set(Some(payment_ref));
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(&state.orm).await?)
}

pub async fn create_vnpay_payment(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePaymentRequest,
    client_ip: &str,
) -> AppResult<ApiResponse<VnpayPayment>> {
    let config = vnpay_config(state)?;
    let order = prepare_payment(state, user, payload.order_id, PaymentMethod::Vnpay, |o| {
        payment_reference(&o.invoice_number)
    })
    .await?;
    let txn_ref = order.payment_ref.clone().unwrap_or_default();

    let order_info = format!("Thanh toan don hang {}", order.invoice_number);
    let payment_url = vnpay::build_payment_url(
        config,
        &vnpay::PaymentRequest {
            txn_ref: &txn_ref,
            amount: order.total_amount,
            order_info: &order_info,
            ip_addr: client_ip,
            created_at: Utc::now(),
        },
    );

    tracing::info!(order_id = %order.id, %txn_ref, "vnpay payment created");
    Ok(ApiResponse::success(
        "Payment URL created",
        VnpayPayment { payment_url, txn_ref },
        None,
    ))
}

/// Browser return from VNPay. Settles the order as the IPN would, so a
/// missed IPN does not leave a paid order unpaid.
pub async fn vnpay_return(
    state: &AppState,
    params: HashMap<String, String>,
) -> AppResult<ApiResponse<PaymentResult>> {
    let config = vnpay_config(state)?;
    if !vnpay::verify(config, &params) {
        return Err(AppError::BadRequest("Invalid signature".into()));
    }
    let callback = vnpay::Callback::from_params(&params)
        .ok_or_else(|| AppError::BadRequest("Missing payment parameters".into()))?;

    let order = if callback.is_success() {
        let confirmation = Confirmation::vnpay(&callback)
            .ok_or_else(|| AppError::BadRequest("Invalid amount".into()))?;
        match settle(state, confirmation).await? {
            Settlement::Paid(order) | Settlement::AlreadyPaid(order) => Some(order),
            Settlement::NotFound => return Err(AppError::NotFound),
            Settlement::AmountMismatch => {
                return Err(AppError::BadRequest("Invalid amount".into()));
            }
            Settlement::OrderCancelled(_) => {
                return Err(AppError::BadRequest("Order has been cancelled".into()));
            }
        }
    } else {
        find_by_reference(state, &callback.txn_ref).await?.map(Order::from)
    };

    let paid = callback.is_success() && order.is_some();
    let message = if paid { "Payment successful" } else { "Payment failed" };
    Ok(ApiResponse::success(
        message,
        PaymentResult {
            paid,
            response_code: callback.response_code,
            order_id: order.as_ref().map(|o| o.id),
            invoice_number: order.map(|o| o.invoice_number),
        },
        None,
    ))
}

/// Server-to-server notification. Always answers with a VNPay code; never
/// an HTTP error.
pub async fn vnpay_ipn(state: &AppState, params: HashMap<String, String>) -> IpnResponse {
    let Ok(config) = vnpay_config(state) else {
        return IpnResponse::unknown_error();
    };
    if !vnpay::verify(config, &params) {
        return IpnResponse::invalid_signature();
    }
    let Some(callback) = vnpay::Callback::from_params(&params) else {
        return IpnResponse::unknown_error();
    };

    if !callback.is_success() {
        return match find_by_reference(state, &callback.txn_ref).await {
            Ok(Some(order)) if callback.amount_vnd() != Some(order.total_amount) => {
                IpnResponse::invalid_amount()
            }
            Ok(Some(order)) if order.payment_status != PaymentStatus::Unpaid.as_str() => {
                IpnResponse::already_confirmed()
            }
            Ok(Some(_)) => {
                tracing::info!(txn_ref = %callback.txn_ref, code = %callback.response_code, "vnpay payment failed");
                IpnResponse::confirmed()
            }
            Ok(None) => IpnResponse::order_not_found(),
            Err(err) => {
                tracing::error!(error = %err, "vnpay ipn lookup failed");
                IpnResponse::unknown_error()
            }
        };
    }

    let Some(confirmation) = Confirmation::vnpay(&callback) else {
        return IpnResponse::invalid_amount();
    };
    match settle(state, confirmation).await {
        Ok(Settlement::Paid(_)) => IpnResponse::confirmed(),
        Ok(Settlement::AlreadyPaid(_)) | Ok(Settlement::OrderCancelled(_)) => {
            IpnResponse::already_confirmed()
        }
        Ok(Settlement::NotFound) => IpnResponse::order_not_found(),
        Ok(Settlement::AmountMismatch) => IpnResponse::invalid_amount(),
        Err(err) => {
            tracing::error!(error = %err, "vnpay ipn settlement failed");
            IpnResponse::unknown_error()
        }
    }
}

pub async fn create_zalopay_payment(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePaymentRequest,
) -> AppResult<ApiResponse<ZalopayPayment>> {
    let config = zalopay_config(state)?;
    let now = Utc::now();
    let order = prepare_payment(state, user, payload.order_id, PaymentMethod::Zalopay, |o| {
        zalopay::app_trans_id(&payment_reference(&o.invoice_number), now)
    })
    .await?;
    let app_trans_id = order.payment_ref.clone().unwrap_or_default();

    let items: Vec<serde_json::Value> = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|item| {
            serde_json::json!({
                "itemid": item.product_id,
                "itemname": item.product_name,
                "itemprice": item.price,
                "itemquantity": item.quantity,
            })
        })
        .collect();

    let form = CreateOrderForm::new(
        config,
        &user.user_id.to_string(),
        app_trans_id.clone(),
        order.total_amount,
        serde_json::Value::Array(items),
        format!("Đặc sản Phú Yên - Thanh toán đơn hàng {}", order.invoice_number),
        now,
    );
    let response = zalopay::create_order(&state.http, config, &form).await?;
    let order_url = response
        .order_url
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("ZaloPay response has no order_url")))?;

    tracing::info!(order_id = %order.id, %app_trans_id, "zalopay payment created");
    Ok(ApiResponse::success(
        "Payment URL created",
        ZalopayPayment {
            order_url,
            app_trans_id,
        },
        None,
    ))
}

pub async fn zalopay_callback(state: &AppState, payload: CallbackRequest) -> CallbackResponse {
    let Ok(config) = zalopay_config(state) else {
        return CallbackResponse::retry("ZaloPay is not configured");
    };
    if !zalopay::verify_callback(config, &payload) {
        tracing::warn!("zalopay callback with invalid mac");
        return CallbackResponse::invalid_mac();
    }
    let data = match zalopay::parse_callback_data(&payload.data) {
        Ok(data) => data,
        Err(err) => return CallbackResponse::retry(err.to_string()),
    };

    let confirmation = Confirmation {
        reference: &data.app_trans_id,
        amount: data.amount,
        gateway: "zalopay",
        gateway_txn: data.zp_trans_id.map(|id| id.to_string()),
    };
    match settle(state, confirmation).await {
        Ok(Settlement::Paid(_)) | Ok(Settlement::AlreadyPaid(_)) => CallbackResponse::success(),
        Ok(Settlement::OrderCancelled(_)) => CallbackResponse::retry("order has been cancelled"),
        Ok(Settlement::NotFound) => CallbackResponse::retry("order not found"),
        Ok(Settlement::AmountMismatch) => CallbackResponse::retry("invalid amount"),
        Err(err) => {
            tracing::error!(error = %err, "zalopay callback settlement failed");
            CallbackResponse::retry(err.to_string())
        }
    }
}

async fn find_by_reference(state: &AppState, reference: &str) -> AppResult<Option<OrderModel>> {
    Ok(Orders::find()
        .filter(OrderCol::PaymentRef.eq(reference))
        .one(&state.orm)
        .await?)
}

/// Outcome for a locked order that must not be marked paid, if any.
fn refuse(order: &OrderModel, amount: i64) -> Option<Settlement> {
    if order.total_amount != amount {
        return Some(Settlement::AmountMismatch);
    }
    if order.payment_status != PaymentStatus::Unpaid.as_str() {
        return Some(Settlement::AlreadyPaid(Order::from(order.clone())));
    }
    if order.status == OrderStatus::Cancelled.as_str() {
        return Some(Settlement::OrderCancelled(Order::from(order.clone())));
    }
    None
}

/// Marks the order behind the confirmation's reference paid. Idempotent:
/// a second confirmation reports `AlreadyPaid`. Cancelled orders are never
/// marked paid.
pub async fn settle(state: &AppState, confirmation: Confirmation<'_>) -> AppResult<Settlement> {
    let Confirmation {
        reference,
        amount,
        gateway,
        gateway_txn,
    } = confirmation;

    let txn = state.orm.begin().await?;
    let Some(order) = Orders::find()
        .filter(OrderCol::PaymentRef.eq(reference))
        .lock_exclusive()
        .one(&txn)
        .await?
    else {
        return Ok(Settlement::NotFound);
    };

    match refuse(&order, amount) {
        Some(Settlement::AmountMismatch) => {
            tracing::warn!(order_id = %order.id, expected = order.total_amount, amount, gateway, "payment amount mismatch");
            return Ok(Settlement::AmountMismatch);
        }
        Some(Settlement::OrderCancelled(cancelled)) => {
            tracing::warn!(order_id = %cancelled.id, gateway, ?gateway_txn, "payment received for a cancelled order");
            audit(
                state,
                cancelled.user_id,
                "payment_on_cancelled_order",
                "orders",
                serde_json::json!({
                    "order_id": cancelled.id,
                    "gateway": gateway,
                    "reference": reference,
                    "gateway_txn": gateway_txn,
                    "amount": amount,
                }),
            )
            .await;
            return Ok(Settlement::OrderCancelled(cancelled));
        }
        Some(outcome) => return Ok(outcome),
        None => {}
    }

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.payment_status = Set(PaymentStatus::Paid.as_str().into());
    active.paid_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let order = Order::from(active.update(&txn).await?);
    txn.commit().await?;

    tracing::info!(order_id = %order.id, gateway, "order paid");
    audit(
        state,
        order.user_id,
        "order_paid",
        "orders",
        serde_json::json!({
            "order_id": order.id,
            "gateway": gateway,
            "reference": reference,
            "gateway_txn": gateway_txn,
        }),
    )
    .await;
    state
        .hub
        .emit(SELLERS_ROOM, ServerEvent::new(ORDER_PAID_EVENT, &order))
        .await;
    notification_service::notify(
        state,
        order.user_id,
        NewNotification {
            kind: "payment",
            title: format!("Đơn hàng {}", order.invoice_number),
            body: format!(
                "Đã nhận thanh toán {} VND cho đơn hàng {}",
                order.total_amount, order.invoice_number
            ),
            link: Some(format!("/orders/{}", order.id)),
        },
    )
    .await;

    Ok(Settlement::Paid(order))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus, payment_status: PaymentStatus) -> OrderModel {
        let now = Utc::now().into();
        OrderModel {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            invoice_number: "PY-20250601-ABCD1234".into(),
            status: status.as_str().into(),
            payment_status: payment_status.as_str().into(),
            payment_method: PaymentMethod::Vnpay.as_str().into(),
            payment_ref: Some("PY20250601ABCD1234123456".into()),
            subtotal: 215_000,
            shipping_fee: 30_000,
            discount: 0,
            total_amount: 245_000,
            voucher_code: None,
            recipient_name: "Nguyễn Văn A".into(),
            phone: "0905123456".into(),
            shipping_address: "12 Trần Hưng Đạo, Tuy Hòa".into(),
            note: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn pending_unpaid_orders_can_be_settled() {
        assert!(refuse(&order(OrderStatus::Pending, PaymentStatus::Unpaid), 245_000).is_none());
    }

    #[test]
    fn cancelled_orders_are_never_marked_paid() {
        let cancelled = order(OrderStatus::Cancelled, PaymentStatus::Unpaid);
        assert!(matches!(
            refuse(&cancelled, 245_000),
            Some(Settlement::OrderCancelled(_))
        ));
    }

    #[test]
    fn repeated_and_mismatched_confirmations() {
        let paid = order(OrderStatus::Confirmed, PaymentStatus::Paid);
        assert!(matches!(refuse(&paid, 245_000), Some(Settlement::AlreadyPaid(_))));
        let pending = order(OrderStatus::Pending, PaymentStatus::Unpaid);
        assert!(matches!(refuse(&pending, 244_999), Some(Settlement::AmountMismatch)));
    }

    #[test]
    fn payment_reference_is_alphanumeric() {
        let reference = payment_reference("PY-20250601-ABCD1234");
        assert!(reference.starts_with("PY20250601ABCD1234"));
        assert!(reference.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(reference.len(), "PY20250601ABCD1234".len() + 6);
    }
}
