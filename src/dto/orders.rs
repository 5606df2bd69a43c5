use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{not_blank, phone_number},
    models::{Order, OrderItem, OrderStatus, PaymentMethod},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000, message = "quantity must be between 1 and 1000"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct ShippingInfo {
    #[validate(length(max = 100), custom(function = "not_blank"))]
    pub name: String,
    #[validate(custom(function = "phone_number"))]
    pub phone: String,
    #[validate(length(max = 255), custom(function = "not_blank"))]
    pub address: String,
}

/// `items` falls back to the cart when empty; `shipping` falls back to the
/// saved address `address_id`, then to the default address.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateOrderRequest {
    #[serde(default)]
    #[validate(length(max = 50, message = "at most 50 lines per order"), nested)]
    pub items: Vec<OrderItemInput>,
    #[validate(nested)]
    pub shipping: Option<ShippingInfo>,
    pub address_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 32))]
    pub voucher_code: Option<String>,
    #[validate(length(max = 500, message = "note must be at most 500 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
