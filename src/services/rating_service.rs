use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Alias, Expr},
};
use uuid::Uuid;

use crate::{
    dto::ratings::{RateProductRequest, RatingList, RatingView},
    entity::{
        products::{ActiveModel as ProductActive, Entity as Products},
        ratings::{ActiveModel, Column, Entity as Ratings},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{OrderStatus, Rating},
    response::{ApiResponse, Meta, empty_data},
    routes::params::Pagination,
    state::AppState,
};

/// Mean rounded to one decimal; zero when there are no ratings.
pub fn average(sum: i64, count: i64) -> f64 {
    if count <= 0 {
        return 0.0;
    }
    (sum as f64 / count as f64 * 10.0).round() / 10.0
}

pub async fn list_ratings(
    state: &AppState,
    product_id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<RatingList>> {
    let (page, limit, offset) = pagination.normalize();
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let finder = Ratings::find()
        .filter(Column::ProductId.eq(product_id))
        .order_by_desc(Column::UpdatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .find_also_related(Users)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|(rating, user)| {
            let rating = Rating::from(rating);
            RatingView {
                id: rating.id,
                product_id: rating.product_id,
                user_id: rating.user_id,
                user_name: user.map(|u| u.name),
                stars: rating.stars,
                comment: rating.comment,
                created_at: rating.created_at,
                updated_at: rating.updated_at,
            }
        })
        .collect();

    Ok(ApiResponse::success(
        "Ratings",
        RatingList {
            items,
            average: product.rating_avg,
            count: product.rating_count,
        },
        Some(Meta::new(page, limit, total)),
    ))
}

/// One rating per user and product; posting again replaces it. Only buyers
/// with a delivered order containing the product may rate.
pub async fn rate_product(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: RateProductRequest,
) -> AppResult<ApiResponse<Rating>> {
    let (purchased,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM orders o
            JOIN order_items oi ON oi.order_id = o.id
            WHERE o.user_id = $1 AND oi.product_id = $2 AND o.status = $3
        )
        "#,
    )
    .bind(user.user_id)
    .bind(product_id)
    .bind(OrderStatus::Delivered.as_str())
    .fetch_one(&state.pool)
    .await?;

    if !purchased {
        return Err(AppError::BadRequest(
            "You can only rate products from delivered orders".into(),
        ));
    }

    let comment = payload.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    let now = Utc::now();

    let txn = state.orm.begin().await?;
    let existing = Ratings::find()
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::ProductId.eq(product_id))
        .one(&txn)
        .await?;

    let rating = match existing {
        Some(rating) => {
            let mut active: ActiveModel = rating.into();
            active.stars = Set(payload.stars);
            active.comment = Set(comment);
            active.updated_at = Set(now.into());
            active.update(&txn).await?
        }
        None => {
            ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(product_id),
                stars: Set(payload.stars),
                comment: Set(comment),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            }
            .insert(&txn)
            .await?
        }
    };

    refresh_product_rating(&txn, product_id).await?;
    txn.commit().await?;

    Ok(ApiResponse::success("Rating saved", Rating::from(rating), None))
}

pub async fn delete_rating(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;
    let rating = Ratings::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if rating.user_id != user.user_id && !user.is_seller() {
        return Err(AppError::Forbidden);
    }

    Ratings::delete_by_id(rating.id).exec(&txn).await?;
    refresh_product_rating(&txn, rating.product_id).await?;
    txn.commit().await?;

    Ok(ApiResponse::success("Deleted", empty_data(), None))
}

async fn refresh_product_rating<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> AppResult<()> {
    let (sum, count): (Option<i64>, i64) = Ratings::find()
        .select_only()
        .column_as(Expr::col(Column::Stars).sum().cast_as(Alias::new("bigint")), "sum")
        .column_as(Expr::col(Column::Id).count(), "count")
        .filter(Column::ProductId.eq(product_id))
        .into_tuple()
        .one(conn)
        .await?
        .unwrap_or((None, 0));

    let Some(product) = Products::find_by_id(product_id).one(conn).await? else {
        return Ok(());
    };
    let mut active: ProductActive = product.into();
    active.rating_avg = Set(average(sum.unwrap_or(0), count));
    active.rating_count = Set(count as i32);
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_rounds_to_one_decimal() {
        assert_eq!(average(0, 0), 0.0);
        assert_eq!(average(14, 3), 4.7);
        assert_eq!(average(10, 2), 5.0);
    }

    #[test]
    fn stars_out_of_range_are_rejected() {
        use validator::Validate;

        for stars in [0, 6] {
            let bad = RateProductRequest { stars, comment: None };
            assert!(bad.validate().is_err());
        }
        let long = RateProductRequest {
            stars: 5,
            comment: Some("ngon ".repeat(300)),
        };
        assert!(long.validate().is_err());
        let good = RateProductRequest {
            stars: 4,
            comment: Some("Chả cá ngon".into()),
        };
        assert!(good.validate().is_ok());
    }
}
