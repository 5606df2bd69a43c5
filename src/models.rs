use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Seller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    Vnpay,
    Zalopay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoucherKind {
    Percentage,
    Fixed,
    Freeship,
}

/// Implements `as_str`, `Display` and `FromStr` over the snake_case names
/// stored in the database.
macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(format!("invalid {}: {}", stringify!($ty), other)),
                }
            }
        }
    };
}

string_enum!(Role { Customer => "customer", Seller => "seller" });
string_enum!(OrderStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Shipping => "shipping",
    Delivered => "delivered",
    Cancelled => "cancelled",
});
string_enum!(PaymentStatus { Unpaid => "unpaid", Paid => "paid", Refunded => "refunded" });
string_enum!(PaymentMethod { Cod => "cod", Vnpay => "vnpay", Zalopay => "zalopay" });
string_enum!(VoucherKind { Percentage => "percentage", Fixed => "fixed", Freeship => "freeship" });

impl OrderStatus {
    /// Seller-driven lifecycle: pending → confirmed → shipping → delivered,
    /// with cancellation allowed until the parcel leaves the shop.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Shipping)
                | (Shipping, Delivered)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
        )
    }

    pub fn label_vi(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Chờ xác nhận",
            OrderStatus::Confirmed => "Đã xác nhận",
            OrderStatus::Shipping => "Đang giao hàng",
            OrderStatus::Delivered => "Đã giao hàng",
            OrderStatus::Cancelled => "Đã hủy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub id: Uuid,
    pub recipient_name: String,
    pub phone: String,
    pub address_line: String,
    pub ward: Option<String>,
    pub district: Option<String>,
    pub province: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Address {
    pub fn full_address(&self) -> String {
        let mut parts = vec![self.address_line.as_str()];
        if let Some(ward) = self.ward.as_deref() {
            parts.push(ward);
        }
        if let Some(district) = self.district.as_deref() {
            parts.push(district);
        }
        parts.push(self.province.as_str());
        parts.join(", ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: i64,
    pub original_price: Option<i64>,
    pub stock: i32,
    pub sold: i32,
    pub images: Vec<String>,
    pub view_count: i64,
    pub favorite_count: i32,
    pub rating_avg: f64,
    pub rating_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn thumbnail(&self) -> Option<String> {
        self.images.first().cloned()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Favorite {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub invoice_number: String,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total_amount: i64,
    pub voucher_code: Option<String>,
    pub recipient_name: String,
    pub phone: String,
    pub shipping_address: String,
    pub note: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub product_image: Option<String>,
    pub quantity: i32,
    pub price: i64,
    pub line_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Voucher {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub kind: VoucherKind,
    pub value: i64,
    pub max_discount: Option<i64>,
    pub min_order_value: i64,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Rating {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub stars: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SupportConversation {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: String,
    pub last_message: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub customer_unread: i32,
    pub seller_unread: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SupportMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HometownPost {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub content: String,
    pub cover_image: Option<String>,
    pub author_id: Uuid,
    pub is_published: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<entity::users::Model> for User {
    fn from(model: entity::users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            avatar_url: model.avatar_url,
            role: model.role,
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::addresses::Model> for Address {
    fn from(model: entity::addresses::Model) -> Self {
        Self {
            id: model.id,
            recipient_name: model.recipient_name,
            phone: model.phone,
            address_line: model.address_line,
            ward: model.ward,
            district: model.district,
            province: model.province,
            is_default: model.is_default,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::products::Model> for Product {
    fn from(model: entity::products::Model) -> Self {
        let images = serde_json::from_value::<Vec<String>>(model.images).unwrap_or_default();
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            category: model.category,
            price: model.price,
            original_price: model.original_price,
            stock: model.stock,
            sold: model.sold,
            images,
            view_count: model.view_count,
            favorite_count: model.favorite_count,
            rating_avg: model.rating_avg,
            rating_count: model.rating_count,
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::favorites::Model> for Favorite {
    fn from(model: entity::favorites::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            user_id: model.user_id,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::cart_items::Model> for CartItem {
    fn from(model: entity::cart_items::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            user_id: model.user_id,
            quantity: model.quantity,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::orders::Model> for Order {
    fn from(model: entity::orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            invoice_number: model.invoice_number,
            status: model.status,
            payment_status: model.payment_status,
            payment_method: model.payment_method,
            subtotal: model.subtotal,
            shipping_fee: model.shipping_fee,
            discount: model.discount,
            total_amount: model.total_amount,
            voucher_code: model.voucher_code,
            recipient_name: model.recipient_name,
            phone: model.phone,
            shipping_address: model.shipping_address,
            note: model.note,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::order_items::Model> for OrderItem {
    fn from(model: entity::order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            product_name: model.product_name,
            product_image: model.product_image,
            quantity: model.quantity,
            price: model.price,
            line_total: model.price * i64::from(model.quantity),
        }
    }
}

impl From<entity::vouchers::Model> for Voucher {
    fn from(model: entity::vouchers::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            description: model.description,
            kind: model.kind.parse().unwrap_or(VoucherKind::Fixed),
            value: model.value,
            max_discount: model.max_discount,
            min_order_value: model.min_order_value,
            usage_limit: model.usage_limit,
            used_count: model.used_count,
            starts_at: model.starts_at.with_timezone(&Utc),
            expires_at: model.expires_at.with_timezone(&Utc),
            is_active: model.is_active,
        }
    }
}

impl From<entity::ratings::Model> for Rating {
    fn from(model: entity::ratings::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            product_id: model.product_id,
            stars: model.stars,
            comment: model.comment,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::notifications::Model> for Notification {
    fn from(model: entity::notifications::Model) -> Self {
        Self {
            id: model.id,
            kind: model.kind,
            title: model.title,
            body: model.body,
            link: model.link,
            is_read: model.is_read,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::support_conversations::Model> for SupportConversation {
    fn from(model: entity::support_conversations::Model) -> Self {
        Self {
            id: model.id,
            customer_id: model.customer_id,
            status: model.status,
            last_message: model.last_message,
            last_message_at: model.last_message_at.with_timezone(&Utc),
            customer_unread: model.customer_unread,
            seller_unread: model.seller_unread,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::support_messages::Model> for SupportMessage {
    fn from(model: entity::support_messages::Model) -> Self {
        Self {
            id: model.id,
            conversation_id: model.conversation_id,
            sender_id: model.sender_id,
            sender_role: model.sender_role,
            content: model.content,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<entity::hometown_posts::Model> for HometownPost {
    fn from(model: entity::hometown_posts::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            slug: model.slug,
            summary: model.summary,
            content: model.content,
            cover_image: model.cover_image,
            author_id: model.author_id,
            is_published: model.is_published,
            views: model.views,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}
