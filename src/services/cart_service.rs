use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest},
    entity::{
        cart_items::{ActiveModel, Column, Entity as CartItems},
        products::{Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::CartItem,
    response::{ApiResponse, Meta, empty_data},
    state::AppState,
};

#[derive(FromRow)]
struct CartWithProductRow {
    cart_id: Uuid,
    quantity: i32,
    product_id: Uuid,
    name: String,
    images: serde_json::Value,
    price: i64,
    stock: i32,
    is_active: bool,
}

impl From<CartWithProductRow> for CartLine {
    fn from(row: CartWithProductRow) -> Self {
        let image = serde_json::from_value::<Vec<String>>(row.images)
            .ok()
            .and_then(|images| images.into_iter().next());
        Self {
            id: row.cart_id,
            product_id: row.product_id,
            name: row.name,
            image,
            price: row.price,
            stock: row.stock,
            is_active: row.is_active,
            quantity: row.quantity,
            line_total: row.price.saturating_mul(i64::from(row.quantity)),
        }
    }
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let rows = sqlx::query_as::<_, CartWithProductRow>(
        r#"
        SELECT ci.id AS cart_id, ci.quantity,
               p.id AS product_id, p.name, p.images, p.price, p.stock, p.is_active
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.user_id = $1
        ORDER BY ci.created_at DESC
        "#,
    )
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<CartLine> = rows.into_iter().map(CartLine::from).collect();
    let view = summarize(items);
    let total = view.items.len() as i64;

    Ok(ApiResponse::success("OK", view, Some(Meta::new(1, total, total))))
}

fn summarize(items: Vec<CartLine>) -> CartView {
    let total_quantity = items.iter().map(|i| i64::from(i.quantity)).sum();
    let subtotal = items.iter().fold(0i64, |acc, i| acc.saturating_add(i.line_total));
    CartView {
        items,
        total_quantity,
        subtotal,
    }
}

/// Adds to the quantity already in the cart; the result may not exceed stock.
pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    let product = find_purchasable(state, payload.product_id).await?;

    let existing = CartItems::find()
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::ProductId.eq(payload.product_id))
        .one(&state.orm)
        .await?;

    let now = Utc::now();
    let item = match existing {
        Some(item) => {
            let quantity = combined_quantity(&product, item.quantity, payload.quantity)?;
            let mut active: ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(now.into());
            active.update(&state.orm).await?
        }
        None => {
            ensure_in_stock(&product, payload.quantity)?;
            ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(payload.product_id),
                quantity: Set(payload.quantity),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            }
            .insert(&state.orm)
            .await?
        }
    };

    Ok(ApiResponse::success(
        "Added to cart",
        CartItem::from(item),
        Some(Meta::empty()),
    ))
}

/// Sets the quantity of a cart line; zero removes it.
pub async fn update_quantity(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<Option<CartItem>>> {
    let item = CartItems::find()
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::ProductId.eq(product_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if payload.quantity == 0 {
        CartItems::delete_by_id(item.id).exec(&state.orm).await?;
        return Ok(ApiResponse::success("Removed from cart", None, None));
    }

    let product = find_purchasable(state, product_id).await?;
    ensure_in_stock(&product, payload.quantity)?;

    let mut active: ActiveModel = item.into();
    active.quantity = Set(payload.quantity);
    active.updated_at = Set(Utc::now().into());
    let item = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Updated",
        Some(CartItem::from(item)),
        None,
    ))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    Ok(ApiResponse::success("Removed from cart", empty_data(), Some(Meta::empty())))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<serde_json::Value>> {
    CartItems::delete_many()
        .filter(Column::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;
    Ok(ApiResponse::success("Cart cleared", empty_data(), None))
}

async fn find_purchasable(state: &AppState, product_id: Uuid) -> AppResult<ProductModel> {
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("product not found".to_string()))?;
    if !product.is_active {
        return Err(AppError::BadRequest("product is no longer available".into()));
    }
    Ok(product)
}

fn ensure_in_stock(product: &ProductModel, quantity: i32) -> AppResult<()> {
    if quantity > product.stock {
        return Err(AppError::BadRequest(format!(
            "only {} of \"{}\" left in stock",
            product.stock, product.name
        )));
    }
    Ok(())
}

/// Quantity after adding `added` to a line that already holds `current`.
fn combined_quantity(product: &ProductModel, current: i32, added: i32) -> AppResult<i32> {
    ensure_in_stock(product, added)?;
    let quantity = current
        .checked_add(added)
        .ok_or_else(|| AppError::BadRequest("quantity is too large".into()))?;
    ensure_in_stock(product, quantity)?;
    Ok(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: i32) -> ProductModel {
        let now = Utc::now().into();
        ProductModel {
            id: Uuid::new_v4(),
            name: "Cá ngừ đại dương".into(),
            description: None,
            category: "Hải sản".into(),
            price: 250_000,
            original_price: None,
            stock,
            sold: 0,
            images: serde_json::json!([]),
            view_count: 0,
            favorite_count: 0,
            rating_avg: 0.0,
            rating_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn adding_respects_stock() {
        let p = product(5);
        assert_eq!(combined_quantity(&p, 2, 3).unwrap(), 5);
        assert!(matches!(combined_quantity(&p, 2, 4), Err(AppError::BadRequest(_))));
        assert!(matches!(combined_quantity(&p, 0, 6), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn adding_never_overflows() {
        let p = product(i32::MAX);
        assert!(matches!(
            combined_quantity(&p, i32::MAX, 1),
            Err(AppError::BadRequest(_))
        ));
    }

    fn line(price: i64, quantity: i32) -> CartLine {
        CartLine {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            name: "Bánh tráng".into(),
            image: None,
            price,
            stock: 10,
            is_active: true,
            quantity,
            line_total: price * i64::from(quantity),
        }
    }

    #[test]
    fn summary_adds_line_totals() {
        let view = summarize(vec![line(45_000, 2), line(120_000, 1)]);
        assert_eq!(view.subtotal, 210_000);
        assert_eq!(view.total_quantity, 3);
    }

    #[test]
    fn empty_cart_is_zero() {
        let view = summarize(Vec::new());
        assert_eq!(view.subtotal, 0);
        assert!(view.items.is_empty());
    }
}
