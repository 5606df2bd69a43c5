use chrono::{Duration, Utc};
use phuyen_store::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    models::Role,
    services::{auth_service::hash_password, hometown_service::slugify},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let seller_id = ensure_user(&pool, "Cửa hàng Phú Yên", "seller@phuyen.local", "seller123", Role::Seller).await?;
    let customer_id = ensure_user(&pool, "Khách hàng", "customer@phuyen.local", "customer123", Role::Customer).await?;
    seed_products(&pool).await?;
    seed_vouchers(&pool).await?;
    seed_post(&pool, seller_id).await?;

    println!("Seed completed. Seller ID: {seller_id}, Customer ID: {customer_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={})", role.as_str());
    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = [
        ("Cá ngừ đại dương một nắng", "Cá ngừ Phú Yên phơi một nắng, đóng gói hút chân không", "hai-san", 185_000, Some(210_000), 40),
        ("Bánh tráng phơi sương Hòa Đa", "Bánh tráng dẻo, cuốn cá ngừ hoặc thịt luộc", "banh-trai", 45_000, None, 120),
        ("Mắm ruốc Sông Cầu", "Mắm ruốc truyền thống, hũ 500g", "dac-san", 60_000, None, 80),
        ("Sò huyết Ô Loan sấy", "Sò huyết đầm Ô Loan sấy khô, túi 250g", "hai-san", 220_000, Some(250_000), 25),
        ("Bò một nắng Sơn Hòa", "Bò một nắng kèm muối kiến vàng", "dac-san", 320_000, None, 30),
        ("Rượu Quán Đế", "Rượu nếp truyền thống An Ninh, chai 500ml", "do-uong", 90_000, None, 60),
    ];

    for (name, desc, category, price, original_price, stock) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, category, price, original_price, stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(category)
        .bind(price as i64)
        .bind(original_price.map(|p: i32| p as i64))
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}

async fn seed_vouchers(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let now = Utc::now();
    let vouchers = [
        ("CHAOPHUYEN", "Giảm 10% cho đơn đầu tiên", "percentage", 10_i64, Some(50_000_i64), 100_000_i64),
        ("GIAM30K", "Giảm 30.000đ cho đơn từ 300.000đ", "fixed", 30_000, None, 300_000),
        ("FREESHIP", "Miễn phí vận chuyển", "freeship", 0, None, 150_000),
    ];

    for (code, description, kind, value, max_discount, min_order_value) in vouchers {
        sqlx::query(
            r#"
            INSERT INTO vouchers (id, code, description, kind, value, max_discount, min_order_value, usage_limit, starts_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(description)
        .bind(kind)
        .bind(value)
        .bind(max_discount)
        .bind(min_order_value)
        .bind(Some(500_i32))
        .bind(now)
        .bind(now + Duration::days(90))
        .execute(pool)
        .await?;
    }

    println!("Seeded vouchers");
    Ok(())
}

async fn seed_post(pool: &sqlx::PgPool, author_id: Uuid) -> anyhow::Result<()> {
    let title = "Gành Đá Đĩa, kỳ quan bazan của Phú Yên";
    sqlx::query(
        r#"
        INSERT INTO hometown_posts (id, title, slug, summary, content, author_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (slug) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(title)
    .bind(slugify(title))
    .bind("Những cột đá lục giác xếp san sát bên bờ biển An Ninh Đông.")
    .bind("Gành Đá Đĩa nằm ở xã An Ninh Đông, huyện Tuy An. Các khối đá bazan hình lăng trụ hình thành từ dung nham núi lửa nguội nhanh trong nước biển.")
    .bind(author_id)
    .execute(pool)
    .await?;

    println!("Seeded hometown post");
    Ok(())
}
