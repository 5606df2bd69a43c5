use chrono::Utc;
use phuyen_store::{
    config::{AppConfig, JwtConfig, ShopConfig},
    db::{create_pool, run_migrations},
    entity::users::ActiveModel as UserActive,
    models::Role,
    services::auth_service::hash_password,
    state::AppState,
};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

pub const PASSWORD: &str = "matkhau123";

/// Database for flow tests, or `None` to skip when none is configured.
pub fn database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            None
        }
    }
}

pub async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;

    let state = AppState::new(pool, test_config(database_url))?;

    // Clean tables between runs
    let backend = state.orm.get_database_backend();
    state
        .orm
        .execute(Statement::from_string(
            backend,
            "TRUNCATE TABLE support_messages, support_conversations, notifications, ratings, \
             order_items, orders, cart_items, favorites, vouchers, hometown_posts, addresses, \
             refresh_tokens, audit_logs, products, users RESTART IDENTITY CASCADE",
        ))
        .await?;

    Ok(state)
}

pub fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        redis_url: "redis://127.0.0.1:6379".into(),
        cors_origin: None,
        jwt: JwtConfig {
            access_secret: "test-access-secret".into(),
            refresh_secret: "test-refresh-secret".into(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 7,
        },
        shop: ShopConfig {
            shipping_fee: 30_000,
            free_shipping_threshold: 500_000,
        },
        smtp: None,
        vnpay: None,
        zalopay: None,
        groq: None,
        cloudinary: None,
    }
}

/// Inserts an active user whose password is [`PASSWORD`].
pub async fn create_user(state: &AppState, role: Role, email: &str) -> anyhow::Result<Uuid> {
    let now = Utc::now();
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(email.split('@').next().unwrap_or("user").to_string()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(PASSWORD)?),
        phone: Set(None),
        avatar_url: Set(None),
        role: Set(role.as_str().into()),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}
