use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{dto::not_blank, models::Product};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateProductRequest {
    #[validate(length(max = 200), custom(function = "not_blank"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(range(min = 1, max = 1_000_000_000, message = "price must be greater than 0"))]
    pub price: i64,
    #[validate(range(min = 0, max = 1_000_000_000))]
    pub original_price: Option<i64>,
    #[validate(range(min = 0, max = 1_000_000, message = "stock cannot be negative"))]
    pub stock: i32,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub images: Vec<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(max = 200), custom(function = "not_blank"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(range(min = 1, max = 1_000_000_000, message = "price must be greater than 0"))]
    pub price: Option<i64>,
    #[validate(range(min = 0, max = 1_000_000_000))]
    pub original_price: Option<i64>,
    #[validate(range(min = 0, max = 1_000_000, message = "stock cannot be negative"))]
    pub stock: Option<i32>,
    #[validate(length(max = 10))]
    pub images: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema, sea_orm::FromQueryResult)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Serialize, ToSchema)]
pub struct CategoryList {
    pub items: Vec<CategoryCount>,
}
