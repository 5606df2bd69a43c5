use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{dto::not_blank, integrations::groq::ChatMessage, models::Product};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChatbotRequest {
    #[validate(length(max = 1000, message = "message must be at most 1000 characters"))]
    #[validate(custom(function = "not_blank", message = "message is required"))]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatbotReply {
    pub reply: String,
    pub products: Vec<Product>,
    /// False when the answer was built from the catalog alone.
    pub ai: bool,
}
