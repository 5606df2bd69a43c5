mod common;

use chrono::Utc;
use phuyen_store::{
    dto::orders::{CreateOrderRequest, OrderItemInput, ShippingInfo},
    entity::{Orders, orders::ActiveModel as OrderActive, products::ActiveModel as ProductActive},
    middleware::auth::AuthUser,
    models::{PaymentMethod, Role},
    services::{
        order_service,
        payment_service::{self, Confirmation, Settlement},
    },
    state::AppState,
};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

// Integration flow: a gateway confirmation settles an order once, repeats
// report AlreadyPaid, wrong amounts are refused and a cancelled order is
// never marked paid.
#[tokio::test]
async fn gateway_confirmations_settle_once() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = common::setup_state(&database_url).await?;

    let customer = AuthUser {
        user_id: common::create_user(&state, Role::Customer, "customer@example.com").await?,
        role: Role::Customer,
    };
    let product_id = create_product(&state).await?;

    let (order_id, total) = place_order(&state, &customer, product_id, "PY-REF-1").await?;

    let wrong = payment_service::settle(&state, confirmation("PY-REF-1", total - 1)).await?;
    assert!(matches!(wrong, Settlement::AmountMismatch));

    let first = payment_service::settle(&state, confirmation("PY-REF-1", total)).await?;
    let Settlement::Paid(paid) = first else {
        panic!("expected Paid, got {first:?}");
    };
    assert_eq!(paid.id, order_id);
    assert_eq!(paid.payment_status, "paid");
    assert!(paid.paid_at.is_some());

    let again = payment_service::settle(&state, confirmation("PY-REF-1", total)).await?;
    assert!(matches!(again, Settlement::AlreadyPaid(ref o) if o.id == order_id));

    let unknown = payment_service::settle(&state, confirmation("PY-NOPE", total)).await?;
    assert!(matches!(unknown, Settlement::NotFound));

    // The customer cancels before the gateway reports the capture.
    let (cancelled_id, total) = place_order(&state, &customer, product_id, "PY-REF-2").await?;
    order_service::cancel_order(&state, &customer, cancelled_id).await?;

    let late = payment_service::settle(&state, confirmation("PY-REF-2", total)).await?;
    assert!(matches!(late, Settlement::OrderCancelled(_)));
    let stored = Orders::find_by_id(cancelled_id).one(&state.orm).await?.expect("order");
    assert_eq!(stored.status, "cancelled");
    assert_eq!(stored.payment_status, "unpaid");
    assert!(stored.paid_at.is_none());

    Ok(())
}

fn confirmation(reference: &str, amount: i64) -> Confirmation<'_> {
    Confirmation {
        reference,
        amount,
        gateway: "vnpay",
        gateway_txn: Some("14123456".into()),
    }
}

async fn create_product(state: &AppState) -> anyhow::Result<Uuid> {
    let now = Utc::now();
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set("Sò huyết Ô Loan".into()),
        description: Set(None),
        category: Set("hai-san".into()),
        price: Set(150_000),
        original_price: Set(None),
        stock: Set(50),
        sold: Set(0),
        images: Set(serde_json::json!([])),
        view_count: Set(0),
        favorite_count: Set(0),
        rating_avg: Set(0.0),
        rating_count: Set(0),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}

/// Places an online-payment order and records `reference` as its gateway
/// reference, as creating the payment URL would.
async fn place_order(
    state: &AppState,
    customer: &AuthUser,
    product_id: Uuid,
    reference: &str,
) -> anyhow::Result<(Uuid, i64)> {
    let order = order_service::create_order(
        state,
        customer,
        CreateOrderRequest {
            items: vec![OrderItemInput {
                product_id,
                quantity: 2,
            }],
            shipping: Some(ShippingInfo {
                name: "Lê Văn C".into(),
                phone: "0987654321".into(),
                address: "8 Nguyễn Huệ, Tuy Hòa".into(),
            }),
            address_id: None,
            payment_method: PaymentMethod::Vnpay,
            voucher_code: None,
            note: None,
        },
    )
    .await?
    .data
    .expect("order")
    .order;

    let model = Orders::find_by_id(order.id).one(&state.orm).await?.expect("order");
    let mut active: OrderActive = model.into();
    active.payment_ref = Set(Some(reference.to_string()));
    active.update(&state.orm).await?;

    Ok((order.id, order.total_amount))
}
