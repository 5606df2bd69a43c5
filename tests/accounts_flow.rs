mod common;

use phuyen_store::{
    dto::{
        auth::{LoginRequest, RefreshRequest},
        users::AddressRequest,
    },
    entity::{RefreshTokens, refresh_tokens},
    error::AppError,
    middleware::auth::AuthUser,
    models::Role,
    services::{
        auth_service::{self, MAX_SESSIONS_PER_USER},
        user_service,
    },
    state::AppState,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

// Integration flow: session cap on login, refresh rotation, replay of a
// rotated token revoking every session, then default address promotion.
#[tokio::test]
async fn sessions_rotate_and_addresses_keep_one_default() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = common::setup_state(&database_url).await?;

    let email = "khach@example.com";
    let user_id = common::create_user(&state, Role::Customer, email).await?;

    let mut refresh_tokens = Vec::new();
    for _ in 0..MAX_SESSIONS_PER_USER + 1 {
        let login = auth_service::login_user(&state, login(email))
            .await?
            .data
            .expect("login");
        refresh_tokens.push(login.tokens.refresh_token);
    }
    assert_eq!(sessions(&state, user_id).await?, MAX_SESSIONS_PER_USER as u64);

    let latest = refresh_tokens.last().cloned().expect("token");
    let rotated = auth_service::refresh_session(&state, refresh(&latest))
        .await?
        .data
        .expect("tokens");
    assert_ne!(rotated.refresh_token, latest);
    assert_eq!(sessions(&state, user_id).await?, MAX_SESSIONS_PER_USER as u64);

    // Presenting the consumed token again is a replay.
    let replay = auth_service::refresh_session(&state, refresh(&latest)).await;
    assert!(matches!(replay, Err(AppError::Unauthorized(_))));
    assert_eq!(sessions(&state, user_id).await?, 0, "replay revokes every session");

    let after_revoke = auth_service::refresh_session(&state, refresh(&rotated.refresh_token)).await;
    assert!(matches!(after_revoke, Err(AppError::Unauthorized(_))));

    // Logging in again starts a fresh session that logout removes.
    let fresh = auth_service::login_user(&state, login(email))
        .await?
        .data
        .expect("login");
    assert_eq!(sessions(&state, user_id).await?, 1);
    auth_service::logout(&state, refresh(&fresh.tokens.refresh_token)).await?;
    assert_eq!(sessions(&state, user_id).await?, 0);

    // Addresses: the first is default, a new default moves the flag, and
    // deleting the default promotes the newest remaining one.
    let customer = AuthUser {
        user_id,
        role: Role::Customer,
    };
    let home = user_service::add_address(&state, &customer, address("Nhà", false))
        .await?
        .data
        .expect("address");
    assert!(home.is_default, "first address becomes default");

    let shop = user_service::add_address(&state, &customer, address("Cửa hàng", false))
        .await?
        .data
        .expect("address");
    assert!(!shop.is_default);

    let office = user_service::add_address(&state, &customer, address("Văn phòng", true))
        .await?
        .data
        .expect("address");
    assert!(office.is_default);
    assert_eq!(default_ids(&state, &customer).await?, vec![office.id]);

    user_service::delete_address(&state, &customer, office.id).await?;
    assert_eq!(default_ids(&state, &customer).await?, vec![shop.id]);

    user_service::delete_address(&state, &customer, shop.id).await?;
    assert_eq!(default_ids(&state, &customer).await?, vec![home.id]);

    // Another customer cannot touch these addresses.
    let stranger = AuthUser {
        user_id: common::create_user(&state, Role::Customer, "la@example.com").await?,
        role: Role::Customer,
    };
    let foreign = user_service::delete_address(&state, &stranger, home.id).await;
    assert!(matches!(foreign, Err(AppError::NotFound)));

    Ok(())
}

fn login(email: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: common::PASSWORD.to_string(),
    }
}

fn refresh(token: &str) -> RefreshRequest {
    RefreshRequest {
        refresh_token: token.to_string(),
    }
}

fn address(recipient: &str, is_default: bool) -> AddressRequest {
    AddressRequest {
        recipient_name: recipient.to_string(),
        phone: "0905123456".into(),
        address_line: "12 Trần Hưng Đạo".into(),
        ward: None,
        district: Some("Tuy Hòa".into()),
        province: None,
        is_default,
    }
}

async fn sessions(state: &AppState, user_id: Uuid) -> anyhow::Result<u64> {
    Ok(RefreshTokens::find()
        .filter(refresh_tokens::Column::UserId.eq(user_id))
        .count(&state.orm)
        .await?)
}

async fn default_ids(state: &AppState, user: &AuthUser) -> anyhow::Result<Vec<Uuid>> {
    let list = user_service::list_addresses(state, user)
        .await?
        .data
        .expect("addresses");
    Ok(list
        .items
        .into_iter()
        .filter(|a| a.is_default)
        .map(|a| a.id)
        .collect())
}
