use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginResponse, TokenResponse},
        cart::{CartLine, CartView},
        orders::{OrderItemInput, OrderList, OrderWithItems, ShippingInfo},
        products::{CategoryCount, ProductList},
        revenue::{DailyRevenue, StatusCount, TopProduct},
        support::{ConversationView, NewMessageEvent, ReadEvent, TypingEvent},
    },
    integrations::otp_store::OtpPurpose,
    models::{
        Address, CartItem, Favorite, HometownPost, Notification, Order, OrderItem, OrderStatus,
        PaymentMethod, PaymentStatus, Product, Rating, Role, SupportConversation, SupportMessage,
        User, Voucher, VoucherKind,
    },
    response::{ApiResponse, Meta},
    routes::{
        auth, cart, chatbot, favorites, health, hometown, media, notifications, orders, params,
        payments, products, ratings, revenue, support, users, vouchers,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Phú Yên Store API", description = "Specialty food shop: catalogue, orders, payments and support chat"),
    paths(
        health::health_check,
        auth::send_otp,
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::reset_password,
        auth::me,
        users::profile,
        users::update_profile,
        users::change_password,
        users::list_addresses,
        users::add_address,
        users::update_address,
        users::set_default_address,
        users::delete_address,
        users::list_customers,
        users::update_user_status,
        products::list_products,
        products::list_categories,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product,
        ratings::list_ratings,
        ratings::rate_product,
        ratings::delete_rating,
        favorites::add_favorite,
        favorites::remove_favorite,
        favorites::list_favorites,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        cart::clear_cart,
        vouchers::list_available,
        vouchers::apply_voucher,
        vouchers::list_all,
        vouchers::create_voucher,
        vouchers::update_voucher,
        vouchers::delete_voucher,
        orders::create_order,
        orders::list_order,
        orders::list_all_orders,
        orders::get_order,
        orders::cancel_order,
        orders::update_order_status,
        payments::create_vnpay_payment,
        payments::vnpay_return,
        payments::vnpay_ipn,
        payments::create_zalopay_payment,
        payments::zalopay_callback,
        notifications::list_notifications,
        notifications::mark_read,
        notifications::mark_all_read,
        revenue::summary,
        revenue::daily,
        revenue::top_products,
        support::open_conversation,
        support::list_conversations,
        support::list_messages,
        support::send_message,
        support::mark_read,
        support::close_conversation,
        chatbot::chat,
        media::upload_image,
        hometown::list_posts,
        hometown::list_manage,
        hometown::get_post,
        hometown::create_post,
        hometown::update_post,
        hometown::delete_post
    ),
    components(
        schemas(
            Role,
            OrderStatus,
            PaymentStatus,
            PaymentMethod,
            VoucherKind,
            OtpPurpose,
            User,
            Address,
            Product,
            Favorite,
            CartItem,
            Order,
            OrderItem,
            Voucher,
            Rating,
            Notification,
            SupportConversation,
            SupportMessage,
            HometownPost,
            LoginResponse,
            TokenResponse,
            CartLine,
            CartView,
            OrderItemInput,
            ShippingInfo,
            OrderList,
            OrderWithItems,
            CategoryCount,
            ProductList,
            StatusCount,
            DailyRevenue,
            TopProduct,
            ConversationView,
            NewMessageEvent,
            TypingEvent,
            ReadEvent,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::SearchQuery,
            params::SortOrder,
            params::ProductSortBy,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "OTP, registration, login and token rotation"),
        (name = "Users", description = "Profile, saved addresses and customer management"),
        (name = "Products", description = "Product catalogue"),
        (name = "Ratings", description = "Product ratings from buyers"),
        (name = "Favorites", description = "Favorite endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Vouchers", description = "Discount vouchers"),
        (name = "Orders", description = "Order placement and fulfilment"),
        (name = "Payments", description = "VNPay and ZaloPay checkout and callbacks"),
        (name = "Notifications", description = "In-app notifications"),
        (name = "Revenue", description = "Seller revenue reports"),
        (name = "Support", description = "Customer support chat"),
        (name = "Chatbot", description = "Shopping assistant"),
        (name = "Media", description = "Image upload"),
        (name = "Hometown", description = "Articles about Phú Yên"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_module_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/auth/otp",
            "/api/orders/{id}/status",
            "/api/payments/vnpay/ipn",
            "/api/support/conversations/{id}/messages",
            "/api/media/upload",
            "/api/hometown/{slug}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemes = doc.components.map(|c| c.security_schemes).unwrap_or_default();
        assert!(schemes.contains_key("bearer_auth"));
    }
}
