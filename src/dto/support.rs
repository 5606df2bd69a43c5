use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::not_blank,
    models::{SupportConversation, SupportMessage},
};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SendMessageRequest {
    #[validate(length(max = 2000, message = "Message must be at most 2000 characters"))]
    #[validate(custom(function = "not_blank", message = "Message cannot be empty"))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: SupportConversation,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationList {
    pub items: Vec<ConversationView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageList {
    pub items: Vec<SupportMessage>,
}

/// Payload of the `support_new_message` realtime event.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NewMessageEvent {
    pub conversation_id: Uuid,
    pub message: SupportMessage,
    pub conversation: SupportConversation,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TypingEvent {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub typing: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReadEvent {
    pub conversation_id: Uuid,
    pub reader_id: Uuid,
    pub role: String,
}
