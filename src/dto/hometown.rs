use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{dto::not_blank, models::HometownPost};

fn default_published() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreatePostRequest {
    #[validate(length(max = 200), custom(function = "not_blank"))]
    pub title: String,
    #[validate(length(max = 500))]
    pub summary: Option<String>,
    #[validate(custom(function = "not_blank"))]
    pub content: String,
    pub cover_image: Option<String>,
    #[serde(default = "default_published")]
    pub is_published: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(max = 200), custom(function = "not_blank"))]
    pub title: Option<String>,
    #[validate(length(max = 500))]
    pub summary: Option<String>,
    #[validate(custom(function = "not_blank"))]
    pub content: Option<String>,
    pub cover_image: Option<String>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostList {
    pub items: Vec<HometownPost>,
}
