mod common;

use phuyen_store::{
    error::AppError,
    middleware::auth::AuthUser,
    models::Role,
    services::support_service,
};

// Integration flow: each message bumps only the other side's unread counter,
// concurrent sends are all counted, reading resets one side and a closed
// conversation refuses new messages.
#[tokio::test]
async fn unread_counters_track_each_side() -> anyhow::Result<()> {
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

    let conversation = support_service::open_conversation(&state, &customer)
        .await?
        .data
        .expect("conversation");
    let again = support_service::open_conversation(&state, &customer)
        .await?
        .data
        .expect("conversation");
    assert_eq!(again.id, conversation.id, "one open thread per customer");

    support_service::post_message(&state, &customer, conversation.id, "Còn chả cá không shop?").await?;
    let stored = support_service::load_for(&state, &seller, conversation.id).await?;
    assert_eq!((stored.customer_unread, stored.seller_unread), (0, 1));
    assert_eq!(stored.last_message.as_deref(), Some("Còn chả cá không shop?"));

    let (a, b, c, d) = tokio::join!(
        support_service::post_message(&state, &customer, conversation.id, "1"),
        support_service::post_message(&state, &customer, conversation.id, "2"),
        support_service::post_message(&state, &customer, conversation.id, "3"),
        support_service::post_message(&state, &seller, conversation.id, "Dạ còn ạ"),
    );
    for sent in [a, b, c, d] {
        sent?;
    }
    let stored = support_service::load_for(&state, &seller, conversation.id).await?;
    assert_eq!((stored.customer_unread, stored.seller_unread), (1, 4));

    let read = support_service::read_conversation(&state, &seller, conversation.id)
        .await?
        .data
        .expect("conversation");
    assert_eq!((read.customer_unread, read.seller_unread), (1, 0));

    // Customers only see their own threads.
    let stranger = AuthUser {
        user_id: common::create_user(&state, Role::Customer, "la@example.com").await?,
        role: Role::Customer,
    };
    let foreign = support_service::load_for(&state, &stranger, conversation.id).await;
    assert!(matches!(foreign, Err(AppError::Forbidden)));

    support_service::close_conversation(&state, &seller, conversation.id).await?;
    let closed = support_service::post_message(&state, &customer, conversation.id, "Alo?").await;
    assert!(matches!(closed, Err(AppError::BadRequest(_))));
    let stored = support_service::load_for(&state, &seller, conversation.id).await?;
    assert_eq!(stored.status, support_service::STATUS_CLOSED);
    assert_eq!(stored.seller_unread, 0, "refused messages are not counted");

    Ok(())
}
