mod common;

use phuyen_store::{
    dto::{
        orders::{CreateOrderRequest, OrderItemInput, ShippingInfo},
        products::CreateProductRequest,
    },
    entity::Products,
    error::AppError,
    middleware::auth::AuthUser,
    models::{PaymentMethod, Role},
    services::{order_service, product_service},
};
use sea_orm::EntityTrait;

// Integration flow: product names are unique, and deleting a product hides it
// once an order references it but removes it outright otherwise.
#[tokio::test]
async fn product_names_are_unique_and_deletes_respect_orders() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = common::setup_state(&database_url).await?;

    let seller = AuthUser {
        user_id: common::create_user(&state, Role::Seller, "seller@example.com").await?,
        role: Role::Seller,
    };
    let customer = AuthUser {
        user_id: common::create_user(&state, Role::Customer, "customer@example.com").await?,
        role: Role::Customer,
    };

    let ordered = product_service::create_product(&state, &seller, product("Bánh hỏi lòng heo"))
        .await?
        .data
        .expect("product");

    let duplicate =
        product_service::create_product(&state, &seller, product("Bánh hỏi lòng heo")).await;
    assert!(
        matches!(duplicate, Err(AppError::Conflict(_))),
        "unique violation maps to 409, got {duplicate:?}"
    );

    let unsold = product_service::create_product(&state, &seller, product("Mắm ruốc Sông Cầu"))
        .await?
        .data
        .expect("product");

    order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            items: vec![OrderItemInput {
                product_id: ordered.id,
                quantity: 1,
            }],
            shipping: Some(ShippingInfo {
                name: "Trần Thị B".into(),
                phone: "0912345678".into(),
                address: "45 Lê Lợi, Sông Cầu".into(),
            }),
            address_id: None,
            payment_method: PaymentMethod::Cod,
            voucher_code: None,
            note: None,
        },
    )
    .await?;

    // Referenced by an order: hidden, not deleted.
    let hidden = product_service::delete_product(&state, &seller, ordered.id).await?;
    assert_eq!(hidden.message, "Product hidden");
    let stored = Products::find_by_id(ordered.id).one(&state.orm).await?.expect("product");
    assert!(!stored.is_active);
    let public = product_service::get_product(&state, Some(&customer), ordered.id).await;
    assert!(matches!(public, Err(AppError::NotFound)));
    let for_seller = product_service::get_product(&state, Some(&seller), ordered.id).await?;
    assert!(for_seller.data.is_some(), "sellers still see hidden products");

    // Never ordered: removed.
    let removed = product_service::delete_product(&state, &seller, unsold.id).await?;
    assert_eq!(removed.message, "Deleted");
    assert!(Products::find_by_id(unsold.id).one(&state.orm).await?.is_none());

    // Customers cannot manage the catalog.
    let denied = product_service::delete_product(&state, &customer, ordered.id).await;
    assert!(matches!(denied, Err(AppError::Forbidden)));

    Ok(())
}

fn product(name: &str) -> CreateProductRequest {
    CreateProductRequest {
        name: name.to_string(),
        description: Some("Đặc sản Phú Yên".into()),
        category: Some("dac-san".into()),
        price: 65_000,
        original_price: None,
        stock: 20,
        images: vec![],
    }
}
