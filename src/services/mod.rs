pub mod auth_service;
pub mod cart_service;
pub mod chatbot_service;
pub mod favorite_service;
pub mod hometown_service;
pub mod media_service;
pub mod notification_service;
pub mod order_service;
pub mod payment_service;
pub mod product_service;
pub mod rating_service;
pub mod revenue_service;
pub mod support_service;
pub mod token_service;
pub mod user_service;
pub mod voucher_service;
