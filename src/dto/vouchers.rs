use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::not_blank,
    models::{Voucher, VoucherKind},
};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateVoucherRequest {
    #[validate(length(max = 32), custom(function = "not_blank"))]
    pub code: String,
    pub description: Option<String>,
    pub kind: VoucherKind,
    #[validate(range(min = 0, max = 10_000_000_000i64))]
    pub value: i64,
    #[validate(range(min = 0, max = 10_000_000_000i64))]
    pub max_discount: Option<i64>,
    #[serde(default)]
    #[validate(range(min = 0, max = 10_000_000_000i64))]
    pub min_order_value: i64,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateVoucherRequest {
    pub description: Option<String>,
    #[validate(range(min = 0, max = 10_000_000_000i64))]
    pub value: Option<i64>,
    #[validate(range(min = 0, max = 10_000_000_000i64))]
    pub max_discount: Option<i64>,
    #[validate(range(min = 0, max = 10_000_000_000i64))]
    pub min_order_value: Option<i64>,
    pub usage_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ApplyVoucherRequest {
    #[validate(length(min = 1, max = 32, message = "code is required"))]
    pub code: String,
    #[validate(range(min = 1, max = 10_000_000_000i64, message = "subtotal must be between 1 and 10,000,000,000"))]
    pub subtotal: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VoucherQuote {
    pub code: String,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VoucherList {
    pub items: Vec<Voucher>,
}
