use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    dto::favorites::{AddFavoriteRequest, FavoriteList},
    entity::{
        favorites::{ActiveModel, Column, Entity as Favorites},
        products::{Column as ProductCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Favorite, Product},
    response::{ApiResponse, Meta, empty_data},
    routes::params::Pagination,
    state::AppState,
};

pub async fn list_favorites(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<FavoriteList>> {
    let (page, limit, offset) = pagination.normalize();

    let finder = Favorites::find()
        .filter(Column::UserId.eq(user.user_id))
        .order_by_desc(Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .find_also_related(Products)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .filter_map(|(_, product)| product.map(Product::from))
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("OK", FavoriteList { items }, Some(meta)))
}

/// Idempotent: favoriting twice keeps one row and one count.
pub async fn add_favorite(
    state: &AppState,
    user: &AuthUser,
    payload: AddFavoriteRequest,
) -> AppResult<ApiResponse<Favorite>> {
    let product_id = payload.product_id;
    Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::BadRequest("product not found".into()))?;

    let txn = state.orm.begin().await?;

    let existing = Favorites::find()
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::ProductId.eq(product_id))
        .one(&txn)
        .await?;

    let favorite = match existing {
        Some(favorite) => favorite,
        None => {
            let favorite = ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(product_id),
                created_at: Set(Utc::now().into()),
            }
            .insert(&txn)
            .await?;
            bump_favorite_count(&txn, product_id, 1).await?;
            favorite
        }
    };

    txn.commit().await?;

    Ok(ApiResponse::success(
        "Added to favorites",
        Favorite::from(favorite),
        Some(Meta::empty()),
    ))
}

pub async fn remove_favorite(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;

    let result = Favorites::delete_many()
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::ProductId.eq(product_id))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    bump_favorite_count(&txn, product_id, -1).await?;
    txn.commit().await?;

    Ok(ApiResponse::success("Removed from favorites", empty_data(), Some(Meta::empty())))
}

async fn bump_favorite_count<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    delta: i32,
) -> AppResult<()> {
    let mut update = Products::update_many()
        .col_expr(
            ProductCol::FavoriteCount,
            Expr::col(ProductCol::FavoriteCount).add(delta),
        )
        .filter(ProductCol::Id.eq(product_id));
    if delta < 0 {
        update = update.filter(ProductCol::FavoriteCount.gte(-delta));
    }
    update.exec(conn).await?;
    Ok(())
}
