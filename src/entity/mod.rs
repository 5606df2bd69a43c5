pub mod addresses;
pub mod cart_items;
pub mod favorites;
pub mod hometown_posts;
pub mod notifications;
pub mod order_items;
pub mod orders;
pub mod products;
pub mod ratings;
pub mod refresh_tokens;
pub mod support_conversations;
pub mod support_messages;
pub mod users;
pub mod vouchers;

pub use addresses::Entity as Addresses;
pub use cart_items::Entity as CartItems;
pub use favorites::Entity as Favorites;
pub use hometown_posts::Entity as HometownPosts;
pub use notifications::Entity as Notifications;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use ratings::Entity as Ratings;
pub use refresh_tokens::Entity as RefreshTokens;
pub use support_conversations::Entity as SupportConversations;
pub use support_messages::Entity as SupportMessages;
pub use users::Entity as Users;
pub use vouchers::Entity as Vouchers;
