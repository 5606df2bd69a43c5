//! Customer support threads. Persistence is the source of truth; realtime
//! relays are best-effort on top of it and shared by the REST and
//! WebSocket entry points.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    dto::support::{ConversationList, ConversationView, MessageList, NewMessageEvent, ReadEvent, TypingEvent},
    entity::{
        support_conversations::{ActiveModel as ConversationActive, Column as ConvCol, Entity as Conversations, Model as ConversationModel},
        support_messages::{ActiveModel as MessageActive, Column as MsgCol, Entity as Messages},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_customer, ensure_seller},
    models::{Role, SupportConversation, SupportMessage},
    realtime::hub::{ConnectionId, SELLERS_ROOM, ServerEvent, conversation_room, user_room},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub const NEW_MESSAGE_EVENT: &str = "support_new_message";
pub const TYPING_EVENT: &str = "support_typing";
pub const READ_EVENT: &str = "support_read";

const PREVIEW_LEN: usize = 120;

pub const STATUS_OPEN: &str = "open";
pub const STATUS_CLOSED: &str = "closed";

/// The counter bumped when `sender` posts: the other side's.
fn unread_column_for_recipient(sender: Role) -> ConvCol {
    match sender {
        Role::Customer => ConvCol::SellerUnread,
        Role::Seller => ConvCol::CustomerUnread,
    }
}

pub fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_LEN {
        return content.to_string();
    }
    let cut: String = content.chars().take(PREVIEW_LEN).collect();
    format!("{cut}…")
}

/// Customers reach their own threads, sellers reach every thread.
pub async fn load_for(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ConversationModel> {
    let conversation = Conversations::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if !user.is_seller() && conversation.customer_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    Ok(conversation)
}

/// Returns the customer's open conversation, creating one if needed.
pub async fn open_conversation(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<SupportConversation>> {
    ensure_customer(user)?;

    let existing = Conversations::find()
        .filter(ConvCol::CustomerId.eq(user.user_id))
        .filter(ConvCol::Status.eq(STATUS_OPEN))
        .order_by_desc(ConvCol::LastMessageAt)
        .one(&state.orm)
        .await?;

    let conversation = match existing {
        Some(conversation) => conversation,
        None => {
            let now = Utc::now();
            ConversationActive {
                id: Set(Uuid::new_v4()),
                customer_id: Set(user.user_id),
                status: Set(STATUS_OPEN.to_string()),
                last_message: Set(None),
                last_message_at: Set(now.into()),
                customer_unread: Set(0),
                seller_unread: Set(0),
                created_at: Set(now.into()),
            }
            .insert(&state.orm)
            .await?
        }
    };

    Ok(ApiResponse::success(
        "Conversation",
        SupportConversation::from(conversation),
        None,
    ))
}

pub async fn list_conversations(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<ConversationList>> {
    let (page, limit, offset) = pagination.normalize();

    let mut finder = Conversations::find().order_by_desc(ConvCol::LastMessageAt);
    if !user.is_seller() {
        finder = finder.filter(ConvCol::CustomerId.eq(user.user_id));
    }
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .find_also_related(Users)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|(conversation, customer)| ConversationView {
            conversation: SupportConversation::from(conversation),
            customer_name: customer.as_ref().map(|c| c.name.clone()),
            customer_email: customer.map(|c| c.email),
        })
        .collect();

    Ok(ApiResponse::success(
        "Conversations",
        ConversationList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

/// Latest page first by offset, each page in chronological order.
pub async fn list_messages(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<MessageList>> {
    let conversation = load_for(state, user, id).await?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Messages::find()
        .filter(MsgCol::ConversationId.eq(conversation.id))
        .order_by_desc(MsgCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let mut items: Vec<SupportMessage> = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(SupportMessage::from)
        .collect();
    items.reverse();

    Ok(ApiResponse::success(
        "Messages",
        MessageList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

/// Persists a message, bumps the other side's unread counter and relays
/// it. `origin` is the sending WebSocket connection, which does not get
/// its own message echoed.
pub async fn send_message(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    content: &str,
    origin: Option<ConnectionId>,
) -> AppResult<SupportMessage> {
    let content = content.trim().to_string();
    let conversation = load_for(state, user, id).await?;
    if conversation.status == STATUS_CLOSED {
        return Err(AppError::BadRequest("Conversation is closed".into()));
    }

    let now = Utc::now();
    let txn = state.orm.begin().await?;

    let message = MessageActive {
        id: Set(Uuid::new_v4()),
        conversation_id: Set(conversation.id),
        sender_id: Set(user.user_id),
        sender_role: Set(user.role.as_str().to_string()),
        content: Set(content.clone()),
        created_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let customer_id = conversation.customer_id;
    let unread = unread_column_for_recipient(user.role);
    Conversations::update_many()
        .col_expr(unread, Expr::col(unread).add(1))
        .col_expr(ConvCol::LastMessage, Expr::value(Some(preview(&content))))
        .col_expr(ConvCol::LastMessageAt, Expr::value(now))
        .filter(ConvCol::Id.eq(conversation.id))
        .exec(&txn)
        .await?;
    let conversation = Conversations::find_by_id(conversation.id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    txn.commit().await?;

    let message = SupportMessage::from(message);
    let event = ServerEvent::new(
        NEW_MESSAGE_EVENT,
        NewMessageEvent {
            conversation_id: conversation.id,
            message: message.clone(),
            conversation: SupportConversation::from(conversation.clone()),
        },
    );

    let room = conversation_room(conversation.id);
    let inbox = match user.role {
        Role::Customer => SELLERS_ROOM.to_string(),
        Role::Seller => user_room(customer_id),
    };
    let delivered = state.hub.emit_rooms(&[&room, &inbox], event, origin).await;
    tracing::debug!(conversation_id = %conversation.id, delivered, "support message relayed");

    Ok(message)
}

pub async fn post_message(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    content: &str,
) -> AppResult<ApiResponse<SupportMessage>> {
    let message = send_message(state, user, id, content, None).await?;
    Ok(ApiResponse::success("Message sent", message, None))
}

/// Clears the caller's unread counter and tells the other side.
pub async fn mark_read(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    origin: Option<ConnectionId>,
) -> AppResult<SupportConversation> {
    let conversation = load_for(state, user, id).await?;

    let mut active: ConversationActive = conversation.into();
    if user.is_seller() {
        active.seller_unread = Set(0);
    } else {
        active.customer_unread = Set(0);
    }
    let conversation = active.update(&state.orm).await?;

    state
        .hub
        .emit_except(
            &conversation_room(conversation.id),
            ServerEvent::new(
                READ_EVENT,
                ReadEvent {
                    conversation_id: conversation.id,
                    reader_id: user.user_id,
                    role: user.role.as_str().to_string(),
                },
            ),
            origin,
        )
        .await;

    Ok(SupportConversation::from(conversation))
}

pub async fn read_conversation(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<SupportConversation>> {
    let conversation = mark_read(state, user, id, None).await?;
    Ok(ApiResponse::success("Marked as read", conversation, None))
}

pub async fn close_conversation(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<SupportConversation>> {
    ensure_seller(user)?;
    let conversation = load_for(state, user, id).await?;

    let mut active: ConversationActive = conversation.into();
    active.status = Set(STATUS_CLOSED.to_string());
    let conversation = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Conversation closed",
        SupportConversation::from(conversation),
        None,
    ))
}

/// Typing indicators are not stored.
pub async fn typing(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    is_typing: bool,
    origin: ConnectionId,
) -> AppResult<()> {
    let conversation = load_for(state, user, id).await?;
    state
        .hub
        .emit_except(
            &conversation_room(conversation.id),
            ServerEvent::new(
                TYPING_EVENT,
                TypingEvent {
                    conversation_id: conversation.id,
                    user_id: user.user_id,
                    role: user.role.as_str().to_string(),
                    typing: is_typing,
                },
            ),
            Some(origin),
        )
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_messages_are_rejected() {
        use validator::Validate;

        use crate::dto::support::SendMessageRequest;

        let blank = SendMessageRequest { content: "   ".into() };
        assert!(blank.validate().is_err());
        let long = SendMessageRequest { content: "a".repeat(2001) };
        assert!(long.validate().is_err());
        let ok = SendMessageRequest { content: "  chào shop ".into() };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn messages_bump_the_other_side() {
        assert!(matches!(unread_column_for_recipient(Role::Customer), ConvCol::SellerUnread));
        assert!(matches!(unread_column_for_recipient(Role::Seller), ConvCol::CustomerUnread));
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let long = "ồ".repeat(200);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_LEN + 1);
        assert!(p.ends_with('…'));
        assert_eq!(preview("ngắn"), "ngắn");
    }
}
