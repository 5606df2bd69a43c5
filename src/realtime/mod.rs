pub mod gateway;
pub mod hub;
