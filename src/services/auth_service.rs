use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::Utc;
use password_hash::rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::audit,
    dto::auth::{
        LoginRequest, LoginResponse, RefreshRequest, RegisterRequest, ResetPasswordRequest,
        SendOtpRequest, TokenResponse,
    },
    entity::{
        refresh_tokens::{self, ActiveModel as RefreshActive, Column as RefreshCol, Entity as RefreshTokens},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    integrations::otp_store::OtpPurpose,
    middleware::auth::AuthUser,
    models::{Role, User},
    response::{ApiResponse, Meta, empty_data},
    services::token_service::{TokenKind, decode_token, hash_token, issue_token},
    state::AppState,
};

pub const MAX_SESSIONS_PER_USER: usize = 5;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub async fn send_otp(
    state: &AppState,
    payload: SendOtpRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let email = normalize_email(&payload.email);

    let existing = find_user_by_email(state, &email).await?;
    match payload.purpose {
        OtpPurpose::Register if existing.is_some() => {
            return Err(AppError::Conflict("Email is already registered".into()));
        }
        // Do not reveal which emails have accounts.
        OtpPurpose::ResetPassword if existing.is_none() => {
            return Ok(ApiResponse::success("OTP sent", empty_data(), None));
        }
        _ => {}
    }

    let code = state.otp.issue(payload.purpose, &email).await?;
    state.mailer.send_otp(&email, payload.purpose, &code).await?;

    Ok(ApiResponse::success("OTP sent", empty_data(), None))
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let RegisterRequest {
        name,
        email,
        password,
        otp,
    } = payload;
    let email = normalize_email(&email);
    let name = name.trim().to_string();

    if find_user_by_email(state, &email).await?.is_some() {
        return Err(AppError::Conflict("Email is already taken".to_string()));
    }

    state.otp.verify(OtpPurpose::Register, &email, &otp).await?;

    let now = Utc::now();
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        email: Set(email),
        password_hash: Set(hash_password(&password)?),
        phone: Set(None),
        avatar_url: Set(None),
        role: Set(Role::Customer.as_str().to_string()),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    audit(state, user.id, "user_register", "users", serde_json::json!({ "user_id": user.id })).await;

    Ok(ApiResponse::success("User created", User::from(user), None))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let email = normalize_email(&email);

    let user = match find_user_by_email(state, &email).await? {
        Some(u) => u,
        None => return Err(AppError::Unauthorized("Invalid email or password".into())),
    };

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    if !user.is_active {
        return Err(AppError::Forbidden);
    }

    let tokens = start_session(state, &user).await?;

    audit(state, user.id, "user_login", "users", serde_json::json!({ "user_id": user.id })).await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            user: User::from(user),
            tokens,
        },
        Some(Meta::empty()),
    ))
}

/// Rotate a refresh token. A token that verifies but is no longer stored has
/// already been used once, so every session of its owner is revoked.
pub async fn refresh_session(
    state: &AppState,
    payload: RefreshRequest,
) -> AppResult<ApiResponse<TokenResponse>> {
    let claims = decode_token(&state.config.jwt, &payload.refresh_token, TokenKind::Refresh)?;
    let user_id = claims.user_id()?;
    let token_hash = hash_token(&payload.refresh_token);

    // The row lock serializes concurrent refreshes of one token: the loser
    // finds it gone and is treated as a replay.
    let txn = state.orm.begin().await?;
    let stored = RefreshTokens::find()
        .filter(RefreshCol::TokenHash.eq(token_hash.clone()))
        .lock_exclusive()
        .one(&txn)
        .await?;
    let consumed = match &stored {
        Some(stored) => RefreshTokens::delete_by_id(stored.id).exec(&txn).await?.rows_affected == 1,
        None => false,
    };

    let Some(stored) = stored.filter(|_| consumed) else {
        RefreshTokens::delete_many()
            .filter(RefreshCol::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        tracing::warn!(%user_id, "refresh token reuse detected, sessions revoked");
        return Err(AppError::Unauthorized("Refresh token has been revoked".into()));
    };
    txn.commit().await?;

    if stored.expires_at.with_timezone(&Utc) < Utc::now() {
        return Err(AppError::Unauthorized("Refresh token has expired".into()));
    }

    let user = Users::find_by_id(user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".into()))?;
    if !user.is_active {
        return Err(AppError::Forbidden);
    }

    let tokens = start_session(state, &user).await?;
    Ok(ApiResponse::success("Token refreshed", tokens, None))
}

pub async fn logout(
    state: &AppState,
    payload: RefreshRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    RefreshTokens::delete_many()
        .filter(RefreshCol::TokenHash.eq(hash_token(&payload.refresh_token)))
        .exec(&state.orm)
        .await?;
    Ok(ApiResponse::success("Logged out", empty_data(), None))
}

pub async fn reset_password(
    state: &AppState,
    payload: ResetPasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let email = normalize_email(&payload.email);

    state
        .otp
        .verify(OtpPurpose::ResetPassword, &email, &payload.otp)
        .await?;

    let user = find_user_by_email(state, &email)
        .await?
        .ok_or(AppError::NotFound)?;
    let user_id = user.id;

    let mut active: UserActive = user.into();
    active.password_hash = Set(hash_password(&payload.new_password)?);
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    revoke_all_sessions(state, user_id).await?;
    audit(state, user_id, "password_reset", "users", serde_json::json!({ "user_id": user_id })).await;

    Ok(ApiResponse::success("Password has been reset", empty_data(), None))
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("OK", User::from(model), None))
}

pub async fn revoke_all_sessions(state: &AppState, user_id: Uuid) -> AppResult<()> {
    RefreshTokens::delete_many()
        .filter(RefreshCol::UserId.eq(user_id))
        .exec(&state.orm)
        .await?;
    Ok(())
}

async fn find_user_by_email(state: &AppState, email: &str) -> AppResult<Option<UserModel>> {
    Ok(Users::find()
        .filter(UserCol::Email.eq(email))
        .one(&state.orm)
        .await?)
}

/// Issue an access/refresh pair and record the refresh token, keeping at most
/// `MAX_SESSIONS_PER_USER` live sessions.
async fn start_session(state: &AppState, user: &UserModel) -> AppResult<TokenResponse> {
    let role: Role = user
        .role
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
    let jwt = &state.config.jwt;
    let access = issue_token(jwt, user.id, role, TokenKind::Access)?;
    let refresh = issue_token(jwt, user.id, role, TokenKind::Refresh)?;

    RefreshActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        token_hash: Set(hash_token(&refresh.token)),
        expires_at: Set(refresh.expires_at.into()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    let stale: Vec<Uuid> = RefreshTokens::find()
        .select_only()
        .column(refresh_tokens::Column::Id)
        .filter(RefreshCol::UserId.eq(user.id))
        .order_by_desc(RefreshCol::CreatedAt)
        .offset(MAX_SESSIONS_PER_USER as u64)
        .into_tuple()
        .all(&state.orm)
        .await?;
    if !stale.is_empty() {
        RefreshTokens::delete_many()
            .filter(RefreshCol::Id.is_in(stale))
            .exec(&state.orm)
            .await?;
    }

    Ok(TokenResponse {
        access_token: access.token,
        refresh_token: refresh.token,
        token_type: "Bearer".to_string(),
        expires_in: (access.expires_at - Utc::now()).num_seconds(),
    })
}
