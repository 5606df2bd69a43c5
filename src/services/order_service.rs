use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    audit::audit,
    config::ShopConfig,
    dto::{
        MAX_ORDER_AMOUNT,
        orders::{CreateOrderRequest, OrderItemInput, OrderList, OrderWithItems, ShippingInfo, UpdateOrderStatusRequest},
    },
    entity::{
        addresses::{Column as AddressCol, Entity as Addresses},
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products},
        vouchers::{Column as VoucherCol, Entity as Vouchers},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_seller},
    models::{Address, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, Voucher},
    realtime::hub::{SELLERS_ROOM, ServerEvent},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        notification_service::{self, NEW_ORDER_EVENT, NewNotification, ORDER_CANCELLED_EVENT},
        voucher_service,
    },
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
}

/// Sum of `(unit price, quantity)` lines, bounded by [`MAX_ORDER_AMOUNT`].
pub fn order_subtotal(lines: &[(i64, i32)]) -> AppResult<i64> {
    lines
        .iter()
        .try_fold(0i64, |acc, (price, qty)| {
            price.checked_mul(i64::from(*qty)).and_then(|line| acc.checked_add(line))
        })
        .filter(|subtotal| *subtotal <= MAX_ORDER_AMOUNT)
        .ok_or_else(|| AppError::BadRequest("Order amount exceeds the allowed maximum".into()))
}

/// Totals for a priced list of `(unit price, quantity)` lines.
pub fn compute_totals(
    lines: &[(i64, i32)],
    shop: &ShopConfig,
    voucher: Option<&Voucher>,
) -> AppResult<OrderTotals> {
    let subtotal = order_subtotal(lines)?;
    let shipping_fee = voucher_service::shipping_fee_for(shop, subtotal);
    let discount = voucher.map_or(0, |v| voucher_service::compute_discount(v, subtotal, shipping_fee));
    Ok(OrderTotals {
        subtotal,
        shipping_fee,
        discount,
        total: subtotal.saturating_add(shipping_fee).saturating_sub(discount).max(0),
    })
}

/// Sums duplicate product lines and rejects non-positive quantities.
pub fn merge_items(items: &[OrderItemInput]) -> AppResult<Vec<(Uuid, i32)>> {
    let mut merged: Vec<(Uuid, i32)> = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest("quantity must be greater than 0".into()));
        }
        match merged.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, qty)) => {
                *qty = qty
                    .checked_add(item.quantity)
                    .ok_or_else(|| AppError::BadRequest("quantity is too large".into()))?;
            }
            None => merged.push((item.product_id, item.quantity)),
        }
    }
    Ok(merged)
}

pub fn build_invoice_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.simple().to_string().to_uppercase();
    format!("PY-{}-{}", date, &suffix[..8])
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let shipping = resolve_shipping(state, user, payload.shipping.clone(), payload.address_id).await?;

    let txn = state.orm.begin().await?;

    let requested = if payload.items.is_empty() {
        CartItems::find()
            .filter(CartCol::UserId.eq(user.user_id))
            .order_by_asc(CartCol::CreatedAt)
            .all(&txn)
            .await?
            .into_iter()
            .map(|c| (c.product_id, c.quantity))
            .collect()
    } else {
        merge_items(&payload.items)?
    };
    if requested.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let ids: Vec<Uuid> = requested.iter().map(|(id, _)| *id).collect();
    let products: HashMap<Uuid, _> = Products::find()
        .filter(ProdCol::Id.is_in(ids.clone()))
        .lock_exclusive()
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut lines = Vec::with_capacity(requested.len());
    for (product_id, quantity) in &requested {
        let product = products
            .get(product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::BadRequest(format!("Product {product_id} is not available")))?;
        if product.stock < *quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for \"{}\" ({} left)",
                product.name, product.stock
            )));
        }
        lines.push((product, *quantity));
    }

    let priced: Vec<(i64, i32)> = lines.iter().map(|(p, q)| (p.price, *q)).collect();
    let subtotal = order_subtotal(&priced)?;

    let voucher = match payload.voucher_code.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(code) => {
            let voucher = voucher_service::find_by_code(&txn, code, true)
                .await?
                .map(Voucher::from)
                .ok_or_else(|| AppError::BadRequest("Voucher not found".into()))?;
            voucher_service::check_usable(&voucher, subtotal, Utc::now())?;
            Some(voucher)
        }
        None => None,
    };

    let totals = compute_totals(&priced, &state.config.shop, voucher.as_ref())?;

    let now = Utc::now();
    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        invoice_number: Set(build_invoice_number(order_id)),
        status: Set(OrderStatus::Pending.as_str().into()),
        payment_status: Set(PaymentStatus::Unpaid.as_str().into()),
        payment_method: Set(payload.payment_method.as_str().into()),
        payment_ref: Set(None),
        subtotal: Set(totals.subtotal),
        shipping_fee: Set(totals.shipping_fee),
        discount: Set(totals.discount),
        total_amount: Set(totals.total),
        voucher_code: Set(voucher.as_ref().map(|v| v.code.clone())),
        recipient_name: Set(shipping.name),
        phone: Set(shipping.phone),
        shipping_address: Set(shipping.address),
        note: Set(payload.note.filter(|n| !n.trim().is_empty())),
        paid_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (product, quantity) in &lines {
        let thumbnail = serde_json::from_value::<Vec<String>>(product.images.clone())
            .ok()
            .and_then(|imgs| imgs.into_iter().next());
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(Some(product.id)),
            product_name: Set(product.name.clone()),
            product_image: Set(thumbnail),
            price: Set(product.price),
            quantity: Set(*quantity),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
        items.push(OrderItem::from(item));

        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(*quantity))
            .col_expr(ProdCol::Sold, Expr::col(ProdCol::Sold).add(*quantity))
            .filter(ProdCol::Id.eq(product.id))
            .exec(&txn)
            .await?;
    }

    if let Some(voucher) = &voucher {
        Vouchers::update_many()
            .col_expr(VoucherCol::UsedCount, Expr::col(VoucherCol::UsedCount).add(1))
            .filter(VoucherCol::Id.eq(voucher.id))
            .exec(&txn)
            .await?;
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::ProductId.is_in(ids))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    let order = Order::from(order);
    tracing::info!(order_id = %order.id, invoice = %order.invoice_number, total = order.total_amount, "order created");
    audit(state, user.user_id, "order_create", "orders", serde_json::json!({ "order_id": order.id })).await;
    state
        .hub
        .emit(SELLERS_ROOM, ServerEvent::new(NEW_ORDER_EVENT, &order))
        .await;

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

async fn resolve_shipping(
    state: &AppState,
    user: &AuthUser,
    shipping: Option<ShippingInfo>,
    address_id: Option<Uuid>,
) -> AppResult<ShippingInfo> {
    if let Some(info) = shipping {
        return Ok(ShippingInfo {
            name: info.name.trim().to_string(),
            phone: info.phone.trim().to_string(),
            address: info.address.trim().to_string(),
        });
    }

    let mut finder = Addresses::find().filter(AddressCol::UserId.eq(user.user_id));
    finder = match address_id {
        Some(id) => finder.filter(AddressCol::Id.eq(id)),
        None => finder.filter(AddressCol::IsDefault.eq(true)),
    };
    let address = finder
        .one(&state.orm)
        .await?
        .map(Address::from)
        .ok_or_else(|| AppError::BadRequest("shipping information is required".into()))?;

    Ok(ShippingInfo {
        address: address.full_address(),
        name: address.recipient_name,
        phone: address.phone,
    })
}

pub async fn list_my_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    list_orders(state, Some(user.user_id), query).await
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_seller(user)?;
    list_orders(state, None, query).await
}

async fn list_orders(
    state: &AppState,
    owner: Option<Uuid>,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();
    if let Some(user_id) = owner {
        condition = condition.add(OrderCol::UserId.eq(user_id));
    }
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status: OrderStatus = status.parse().map_err(AppError::BadRequest)?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Ok", OrderList { items: orders }, Some(meta)))
}

/// Customers see their own orders; sellers see every order.
pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let mut finder = Orders::find_by_id(id);
    if !user.is_seller() {
        finder = finder.filter(OrderCol::UserId.eq(user.user_id));
    }
    let order = finder.one(&state.orm).await?.ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: Order::from(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Customer cancellation, allowed only before the shop confirms.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;
    let order = Orders::find_by_id(id)
        .filter(OrderCol::UserId.eq(user.user_id))
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if parse_status(&order)? != OrderStatus::Pending {
        return Err(AppError::BadRequest("Only pending orders can be cancelled".into()));
    }

    let order = apply_status(&txn, order, OrderStatus::Cancelled).await?;
    txn.commit().await?;

    audit(state, user.user_id, "order_cancel", "orders", serde_json::json!({ "order_id": order.id })).await;
    state
        .hub
        .emit(SELLERS_ROOM, ServerEvent::new(ORDER_CANCELLED_EVENT, &order))
        .await;
    notify_status(state, &order, OrderStatus::Cancelled).await;

    Ok(ApiResponse::success("Order cancelled", order, None))
}

pub async fn update_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_seller(user)?;
    let next = payload.status;

    let txn = state.orm.begin().await?;
    let order = Orders::find_by_id(id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let current = parse_status(&order)?;
    if !current.can_transition_to(next) {
        return Err(AppError::BadRequest(format!(
            "Cannot change order status from {current} to {next}"
        )));
    }

    let order = apply_status(&txn, order, next).await?;
    txn.commit().await?;

    audit(
        state,
        user.user_id,
        "order_status",
        "orders",
        serde_json::json!({ "order_id": order.id, "from": current, "to": next }),
    )
    .await;
    notify_status(state, &order, next).await;

    Ok(ApiResponse::success("Order status updated", order, None))
}

fn parse_status(order: &OrderModel) -> AppResult<OrderStatus> {
    order
        .status
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))
}

/// Writes the new status with its side effects: delivered COD orders are
/// paid, cancellations put stock and voucher usage back and refund paid
/// orders.
async fn apply_status(
    txn: &DatabaseTransaction,
    order: OrderModel,
    next: OrderStatus,
) -> AppResult<Order> {
    let now = Utc::now();
    let payment_method: PaymentMethod = order
        .payment_method
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
    let payment_status: PaymentStatus = order
        .payment_status
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;

    if next == OrderStatus::Cancelled {
        restore_inventory(txn, &order).await?;
    }

    let order_id = order.id;
    let mut active: OrderActive = order.into();
    active.status = Set(next.as_str().into());
    active.updated_at = Set(now.into());

    match next {
        OrderStatus::Delivered if payment_method == PaymentMethod::Cod && payment_status == PaymentStatus::Unpaid => {
            active.payment_status = Set(PaymentStatus::Paid.as_str().into());
            active.paid_at = Set(Some(now.into()));
        }
        OrderStatus::Cancelled if payment_status == PaymentStatus::Paid => {
            active.payment_status = Set(PaymentStatus::Refunded.as_str().into());
        }
        _ => {}
    }

    let updated = active.update(txn).await?;
    tracing::info!(%order_id, status = %next, "order status changed");
    Ok(Order::from(updated))
}

async fn restore_inventory(txn: &DatabaseTransaction, order: &OrderModel) -> AppResult<()> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(txn)
        .await?;

    for item in items {
        let Some(product_id) = item.product_id else {
            continue;
        };
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
            .col_expr(ProdCol::Sold, Expr::col(ProdCol::Sold).sub(item.quantity))
            .filter(ProdCol::Id.eq(product_id))
            .exec(txn)
            .await?;
    }

    if let Some(code) = order.voucher_code.as_deref() {
        Vouchers::update_many()
            .col_expr(VoucherCol::UsedCount, Expr::col(VoucherCol::UsedCount).sub(1))
            .filter(VoucherCol::Code.eq(code))
            .filter(VoucherCol::UsedCount.gt(0))
            .exec(txn)
            .await?;
    }
    Ok(())
}

async fn notify_status(state: &AppState, order: &Order, status: OrderStatus) {
    notification_service::notify(
        state,
        order.user_id,
        NewNotification {
            kind: "order_status",
            title: format!("Đơn hàng {}", order.invoice_number),
            body: format!("Đơn hàng {} {}", order.invoice_number, status.label_vi().to_lowercase()),
            link: Some(format!("/orders/{}", order.id)),
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::VoucherKind;

    fn shop() -> ShopConfig {
        ShopConfig {
            shipping_fee: 30_000,
            free_shipping_threshold: 500_000,
        }
    }

    #[test]
    fn totals_without_voucher() {
        let totals = compute_totals(&[(85_000, 2), (40_000, 1)], &shop(), None).unwrap();
        assert_eq!(
            totals,
            OrderTotals {
                subtotal: 210_000,
                shipping_fee: 30_000,
                discount: 0,
                total: 240_000,
            }
        );
    }

    #[test]
    fn totals_with_free_shipping_and_voucher() {
        let now = Utc::now();
        let voucher = Voucher {
            id: Uuid::new_v4(),
            code: "GIAM10".into(),
            description: None,
            kind: VoucherKind::Percentage,
            value: 10,
            max_discount: Some(40_000),
            min_order_value: 0,
            usage_limit: None,
            used_count: 0,
            starts_at: now - Duration::days(1),
            expires_at: now + Duration::days(1),
            is_active: true,
        };
        let totals = compute_totals(&[(250_000, 3)], &shop(), Some(&voucher)).unwrap();
        assert_eq!(totals.subtotal, 750_000);
        assert_eq!(totals.shipping_fee, 0);
        assert_eq!(totals.discount, 40_000);
        assert_eq!(totals.total, 710_000);
    }

    #[test]
    fn duplicate_lines_are_merged() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let merged = merge_items(&[
            OrderItemInput { product_id: id, quantity: 1 },
            OrderItemInput { product_id: other, quantity: 2 },
            OrderItemInput { product_id: id, quantity: 3 },
        ])
        .unwrap();
        assert_eq!(merged, vec![(id, 4), (other, 2)]);
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        assert!(matches!(
            order_subtotal(&[(i64::MAX / 2, 3)]),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            order_subtotal(&[(i64::MAX, 1), (1, 1)]),
            Err(AppError::BadRequest(_))
        ));
        assert!(compute_totals(&[(1_000_000_000, 11)], &shop(), None).is_err());
        assert_eq!(order_subtotal(&[(1_000_000_000, 10)]).unwrap(), MAX_ORDER_AMOUNT);
    }

    #[test]
    fn merged_quantity_overflow_is_rejected() {
        let id = Uuid::new_v4();
        let res = merge_items(&[
            OrderItemInput { product_id: id, quantity: i32::MAX },
            OrderItemInput { product_id: id, quantity: 1 },
        ]);
        assert!(matches!(res, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let res = merge_items(&[OrderItemInput {
            product_id: Uuid::new_v4(),
            quantity: 0,
        }]);
        assert!(matches!(res, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn invoice_number_format() {
        let invoice = build_invoice_number(Uuid::new_v4());
        assert!(invoice.starts_with("PY-"));
        assert_eq!(invoice.len(), "PY-20250101-ABCDEF12".len());
    }

    #[test]
    fn status_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!Shipping.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Delivered));
    }
}
