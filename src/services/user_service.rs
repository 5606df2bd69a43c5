use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit::audit,
    dto::users::{
        AddressList, AddressRequest, ChangePasswordRequest, UpdateProfileRequest,
        UpdateUserStatusRequest, UserList,
    },
    entity::{
        addresses::{ActiveModel as AddressActive, Column as AddressCol, Entity as Addresses},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_seller},
    models::{Address, Role, User},
    response::{ApiResponse, Meta, empty_data},
    routes::params::SearchQuery,
    services::auth_service::{hash_password, revoke_all_sessions, verify_password},
    state::AppState,
};

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    let existing = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(Some(phone.trim().to_string()));
    }
    if let Some(avatar_url) = payload.avatar_url {
        active.avatar_url = Set(Some(avatar_url).filter(|u| !u.is_empty()));
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    Ok(ApiResponse::success("Profile updated", User::from(updated), None))
}

pub async fn change_password(
    state: &AppState,
    user: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if !verify_password(&payload.current_password, &existing.password_hash)? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    let mut active: UserActive = existing.into();
    active.password_hash = Set(hash_password(&payload.new_password)?);
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    audit(state, user.user_id, "password_change", "users", serde_json::json!({})).await;
    Ok(ApiResponse::success("Password changed", empty_data(), None))
}

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AddressList>> {
    let items = Addresses::find()
        .filter(AddressCol::UserId.eq(user.user_id))
        .order_by_desc(AddressCol::IsDefault)
        .order_by_desc(AddressCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Address::from)
        .collect();
    Ok(ApiResponse::success("OK", AddressList { items }, None))
}

pub async fn add_address(
    state: &AppState,
    user: &AuthUser,
    payload: AddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let txn = state.orm.begin().await?;

    let count = Addresses::find()
        .filter(AddressCol::UserId.eq(user.user_id))
        .count(&txn)
        .await?;
    let is_default = payload.is_default || count == 0;
    if is_default {
        clear_default(&txn, user.user_id).await?;
    }

    let now = Utc::now();
    let address = AddressActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        recipient_name: Set(payload.recipient_name.trim().to_string()),
        phone: Set(payload.phone.trim().to_string()),
        address_line: Set(payload.address_line.trim().to_string()),
        ward: Set(payload.ward),
        district: Set(payload.district),
        province: Set(payload.province.unwrap_or_else(|| "Phú Yên".to_string())),
        is_default: Set(is_default),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    Ok(ApiResponse::success("Address added", Address::from(address), None))
}

pub async fn update_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let txn = state.orm.begin().await?;
    let existing = find_own_address(&txn, user.user_id, id).await?;
    let was_default = existing.is_default;

    if payload.is_default && !was_default {
        clear_default(&txn, user.user_id).await?;
    }

    let mut active: AddressActive = existing.into();
    active.recipient_name = Set(payload.recipient_name.trim().to_string());
    active.phone = Set(payload.phone.trim().to_string());
    active.address_line = Set(payload.address_line.trim().to_string());
    active.ward = Set(payload.ward);
    active.district = Set(payload.district);
    if let Some(province) = payload.province {
        active.province = Set(province);
    }
    // The default flag can only be moved, never dropped, through an update.
    active.is_default = Set(was_default || payload.is_default);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;

    txn.commit().await?;
    Ok(ApiResponse::success("Address updated", Address::from(updated), None))
}

pub async fn set_default_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Address>> {
    let txn = state.orm.begin().await?;
    let existing = find_own_address(&txn, user.user_id, id).await?;
    clear_default(&txn, user.user_id).await?;

    let mut active: AddressActive = existing.into();
    active.is_default = Set(true);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;

    txn.commit().await?;
    Ok(ApiResponse::success("Default address updated", Address::from(updated), None))
}

pub async fn delete_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;
    let existing = find_own_address(&txn, user.user_id, id).await?;
    let was_default = existing.is_default;
    Addresses::delete_by_id(existing.id).exec(&txn).await?;

    if was_default {
        let next = Addresses::find()
            .filter(AddressCol::UserId.eq(user.user_id))
            .order_by_desc(AddressCol::CreatedAt)
            .one(&txn)
            .await?;
        if let Some(next) = next {
            let mut active: AddressActive = next.into();
            active.is_default = Set(true);
            active.update(&txn).await?;
        }
    }

    txn.commit().await?;
    Ok(ApiResponse::success("Address deleted", empty_data(), None))
}

pub async fn list_customers(
    state: &AppState,
    user: &AuthUser,
    query: SearchQuery,
) -> AppResult<ApiResponse<UserList>> {
    ensure_seller(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all().add(UserCol::Role.eq(Role::Customer.as_str()));
    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        condition = condition.add(
            Condition::any()
                .add(Expr::col(UserCol::Name).ilike(pattern.clone()))
                .add(Expr::col(UserCol::Email).ilike(pattern)),
        );
    }

    let finder = Users::find()
        .filter(condition)
        .order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    Ok(ApiResponse::success(
        "Customers",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn update_user_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserStatusRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_seller(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest("You cannot change your own status".into()));
    }

    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = existing.into();
    active.is_active = Set(payload.is_active);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    if !payload.is_active {
        revoke_all_sessions(state, id).await?;
    }

    audit(
        state,
        user.user_id,
        if payload.is_active { "user_unblock" } else { "user_block" },
        "users",
        serde_json::json!({ "user_id": id }),
    )
    .await;

    Ok(ApiResponse::success("User updated", User::from(updated), None))
}

async fn find_own_address<C: sea_orm::ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    id: Uuid,
) -> AppResult<crate::entity::addresses::Model> {
    Addresses::find()
        .filter(
            Condition::all()
                .add(AddressCol::Id.eq(id))
                .add(AddressCol::UserId.eq(user_id)),
        )
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

async fn clear_default<C: sea_orm::ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<()> {
    Addresses::update_many()
        .col_expr(AddressCol::IsDefault, Expr::value(false))
        .filter(AddressCol::UserId.eq(user_id))
        .exec(conn)
        .await?;
    Ok(())
}
