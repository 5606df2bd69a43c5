use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    dto::notifications::{MarkedRead, NotificationList},
    entity::notifications::{ActiveModel, Column, Entity as Notifications},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Notification,
    realtime::hub::{ServerEvent, user_room},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub const NOTIFICATION_EVENT: &str = "notification";
/// Seller inbox events.
pub const NEW_ORDER_EVENT: &str = "new_order";
pub const ORDER_CANCELLED_EVENT: &str = "order_cancelled";
pub const ORDER_PAID_EVENT: &str = "order_paid";

pub struct NewNotification<'a> {
    pub kind: &'a str,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

/// Persist a notification and push it to the user's live connections.
/// Runs after the triggering change has committed, so failures are logged
/// and swallowed.
pub async fn notify(state: &AppState, user_id: Uuid, new: NewNotification<'_>) {
    match insert(state, user_id, new).await {
        Ok(notification) => {
            let delivered = state
                .hub
                .emit(&user_room(user_id), ServerEvent::new(NOTIFICATION_EVENT, &notification))
                .await;
            tracing::debug!(%user_id, delivered, kind = %notification.kind, "notification pushed");
        }
        Err(err) => tracing::warn!(error = %err, %user_id, "failed to store notification"),
    }
}

async fn insert(state: &AppState, user_id: Uuid, new: NewNotification<'_>) -> AppResult<Notification> {
    let model = ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        kind: Set(new.kind.to_string()),
        title: Set(new.title),
        body: Set(new.body),
        link: Set(new.link),
        is_read: Set(false),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(Notification::from(model))
}

pub async fn list_notifications(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<NotificationList>> {
    let (page, limit, offset) = pagination.normalize();

    let finder = Notifications::find()
        .filter(Column::UserId.eq(user.user_id))
        .order_by_desc(Column::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let unread = Notifications::find()
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::IsRead.eq(false))
        .count(&state.orm)
        .await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Notification::from)
        .collect();

    Ok(ApiResponse::success(
        "Notifications",
        NotificationList { items, unread },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn mark_read(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Notification>> {
    let existing = Notifications::find_by_id(id)
        .filter(Column::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let model = if existing.is_read {
        existing
    } else {
        let mut active: ActiveModel = existing.into();
        active.is_read = Set(true);
        active.update(&state.orm).await?
    };

    Ok(ApiResponse::success("Marked as read", Notification::from(model), None))
}

pub async fn mark_all_read(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<MarkedRead>> {
    let result = Notifications::update_many()
        .col_expr(Column::IsRead, Expr::value(true))
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::IsRead.eq(false))
        .exec(&state.orm)
        .await?;

    Ok(ApiResponse::success(
        "All notifications marked as read",
        MarkedRead {
            updated: result.rows_affected,
        },
        None,
    ))
}
