//! Clients for the services the shop talks to: Redis, SMTP, payment
//! gateways, the chat model and the image host.

pub mod cloudinary;
pub mod groq;
pub mod mailer;
pub mod otp_store;
pub mod vnpay;
pub mod zalopay;
