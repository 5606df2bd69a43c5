//! Seller dashboard figures. Revenue only counts orders that are paid and
//! not refunded; days are bucketed in Vietnam time.

use crate::{
    dto::revenue::{
        DailyRevenue, DailyRevenueList, DailyRevenueQuery, RevenueRangeQuery, RevenueSummary,
        StatusCount, TopProductList, TopProductsQuery, TopProduct,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_seller},
    response::ApiResponse,
    state::AppState,
};

pub const SHOP_TIMEZONE: &str = "Asia/Ho_Chi_Minh";
pub const MAX_DAYS: i64 = 366;

pub fn average_order_value(revenue: i64, paid_orders: i64) -> i64 {
    if paid_orders <= 0 { 0 } else { revenue / paid_orders }
}

pub async fn summary(
    state: &AppState,
    user: &AuthUser,
    query: RevenueRangeQuery,
) -> AppResult<ApiResponse<RevenueSummary>> {
    ensure_seller(user)?;
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::BadRequest("from must be before to".into()));
        }
    }

    let (revenue, paid_orders, total_orders): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(total_amount) FILTER (WHERE payment_status = 'paid'), 0)::BIGINT,
            COUNT(*) FILTER (WHERE payment_status = 'paid'),
            COUNT(*)
        FROM orders
        WHERE ($1::timestamptz IS NULL OR created_at >= $1)
          AND ($2::timestamptz IS NULL OR created_at <= $2)
        "#,
    )
    .bind(query.from)
    .bind(query.to)
    .fetch_one(&state.pool)
    .await?;

    let by_status = sqlx::query_as::<_, StatusCount>(
        r#"
        SELECT status, COUNT(*) AS count
        FROM orders
        WHERE ($1::timestamptz IS NULL OR created_at >= $1)
          AND ($2::timestamptz IS NULL OR created_at <= $2)
        GROUP BY status
        ORDER BY status
        "#,
    )
    .bind(query.from)
    .bind(query.to)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Revenue summary",
        RevenueSummary {
            from: query.from,
            to: query.to,
            revenue,
            total_orders,
            paid_orders,
            average_order_value: average_order_value(revenue, paid_orders),
            by_status,
        },
        None,
    ))
}

/// One row per day for the last `days` days, zero-filled.
pub async fn daily(
    state: &AppState,
    user: &AuthUser,
    query: DailyRevenueQuery,
) -> AppResult<ApiResponse<DailyRevenueList>> {
    ensure_seller(user)?;
    let days = query.days.unwrap_or(30).clamp(1, MAX_DAYS);

    let items = sqlx::query_as::<_, DailyRevenue>(
        r#"
        WITH days AS (
            SELECT generate_series(
                (now() AT TIME ZONE $1)::date - ($2::int - 1),
                (now() AT TIME ZONE $1)::date,
                interval '1 day'
            )::date AS day
        )
        SELECT d.day,
               COALESCE(SUM(o.total_amount), 0)::BIGINT AS revenue,
               COUNT(o.id) AS orders
        FROM days d
        LEFT JOIN orders o
            ON (o.created_at AT TIME ZONE $1)::date = d.day
           AND o.payment_status = 'paid'
        GROUP BY d.day
        ORDER BY d.day
        "#,
    )
    .bind(SHOP_TIMEZONE)
    .bind(days as i32)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success("Daily revenue", DailyRevenueList { items }, None))
}

pub async fn top_products(
    state: &AppState,
    user: &AuthUser,
    query: TopProductsQuery,
) -> AppResult<ApiResponse<TopProductList>> {
    ensure_seller(user)?;
    let limit = query.limit.unwrap_or(5).clamp(1, 50);

    let items = sqlx::query_as::<_, TopProduct>(
        r#"
        SELECT oi.product_id,
               MAX(oi.product_name) AS product_name,
               SUM(oi.quantity)::BIGINT AS quantity,
               SUM(oi.price * oi.quantity)::BIGINT AS revenue
        FROM order_items oi
        JOIN orders o ON o.id = oi.order_id
        WHERE o.payment_status = 'paid'
        GROUP BY oi.product_id
        ORDER BY quantity DESC, revenue DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success("Top products", TopProductList { items }, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_handles_no_orders() {
        assert_eq!(average_order_value(0, 0), 0);
        assert_eq!(average_order_value(900_000, 4), 225_000);
    }
}
