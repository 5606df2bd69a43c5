use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};
use uuid::Uuid;

use crate::{
    audit::audit,
    dto::hometown::{CreatePostRequest, PostList, UpdatePostRequest},
    entity::hometown_posts::{ActiveModel, Column, Entity as Posts},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_seller},
    models::HometownPost,
    response::{ApiResponse, Meta, empty_data},
    routes::params::SearchQuery,
    state::AppState,
};

const FALLBACK_SLUG: &str = "bai-viet";
const MAX_SLUG_LEN: usize = 80;

/// Lowercase ASCII base letters of `text`: canonically decomposed, combining
/// marks dropped, `đ` folded to `d`. Precomposed and decomposed input
/// fold the same way.
fn fold_vietnamese(text: &str) -> impl Iterator<Item = char> + '_ {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c == 'đ' { 'd' } else { c })
}

/// URL slug from a title: diacritics folded, ASCII alphanumerics kept,
/// everything else collapsed into single dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in fold_vietnamese(title) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

async fn unique_slug(state: &AppState, title: &str) -> AppResult<String> {
    let base = slugify(title);
    let mut candidate = base.clone();
    let mut n = 2;
    while Posts::find()
        .filter(Column::Slug.eq(candidate.clone()))
        .count(&state.orm)
        .await?
        > 0
    {
        candidate = format!("{base}-{n}");
        n += 1;
    }
    Ok(candidate)
}

async fn list(
    state: &AppState,
    query: SearchQuery,
    published_only: bool,
) -> AppResult<ApiResponse<PostList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();
    if published_only {
        condition = condition.add(Column::IsPublished.eq(true));
    }
    if let Some(q) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{q}%");
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Title).ilike(pattern.clone()))
                .add(Expr::col(Column::Summary).ilike(pattern)),
        );
    }

    let finder = Posts::find()
        .filter(condition)
        .order_by_desc(Column::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(HometownPost::from)
        .collect();

    Ok(ApiResponse::success(
        "Posts",
        PostList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn list_published(state: &AppState, query: SearchQuery) -> AppResult<ApiResponse<PostList>> {
    list(state, query, true).await
}

pub async fn list_manage(
    state: &AppState,
    user: &AuthUser,
    query: SearchQuery,
) -> AppResult<ApiResponse<PostList>> {
    ensure_seller(user)?;
    list(state, query, false).await
}

pub async fn get_by_slug(
    state: &AppState,
    viewer: Option<&AuthUser>,
    slug: &str,
) -> AppResult<ApiResponse<HometownPost>> {
    let post = Posts::find()
        .filter(Column::Slug.eq(slug))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let is_seller = viewer.is_some_and(AuthUser::is_seller);
    if !post.is_published && !is_seller {
        return Err(AppError::NotFound);
    }

    Posts::update_many()
        .col_expr(Column::Views, Expr::col(Column::Views).add(1))
        .filter(Column::Id.eq(post.id))
        .exec(&state.orm)
        .await?;

    let mut post = HometownPost::from(post);
    post.views += 1;
    Ok(ApiResponse::success("Post", post, None))
}

pub async fn create_post(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePostRequest,
) -> AppResult<ApiResponse<HometownPost>> {
    ensure_seller(user)?;
    let title = payload.title.trim().to_string();

    let now = Utc::now();
    let post = ActiveModel {
        id: Set(Uuid::new_v4()),
        slug: Set(unique_slug(state, &title).await?),
        title: Set(title),
        summary: Set(payload.summary),
        content: Set(payload.content),
        cover_image: Set(payload.cover_image),
        author_id: Set(user.user_id),
        is_published: Set(payload.is_published),
        views: Set(0),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    audit(state, user.user_id, "post_create", "hometown_posts", serde_json::json!({ "post_id": post.id })).await;

    Ok(ApiResponse::success("Post created", HometownPost::from(post), None))
}

/// The slug is fixed at creation so shared links keep working after a
/// title edit.
pub async fn update_post(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdatePostRequest,
) -> AppResult<ApiResponse<HometownPost>> {
    ensure_seller(user)?;
    let existing = Posts::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    if let Some(title) = payload.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
        active.title = Set(title);
    }
    if let Some(summary) = payload.summary {
        active.summary = Set(Some(summary));
    }
    if let Some(content) = payload.content.filter(|c| !c.trim().is_empty()) {
        active.content = Set(content);
    }
    if let Some(cover_image) = payload.cover_image {
        active.cover_image = Set(Some(cover_image));
    }
    if let Some(is_published) = payload.is_published {
        active.is_published = Set(is_published);
    }
    active.updated_at = Set(Utc::now().into());

    let post = active.update(&state.orm).await?;
    Ok(ApiResponse::success("Updated", HometownPost::from(post), None))
}

pub async fn delete_post(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_seller(user)?;
    let result = Posts::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    audit(state, user.user_id, "post_delete", "hometown_posts", serde_json::json!({ "post_id": id })).await;
    Ok(ApiResponse::success("Deleted", empty_data(), None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_folds_vietnamese_marks() {
        assert_eq!(slugify("Gành Đá Đĩa – kỳ quan Phú Yên"), "ganh-da-dia-ky-quan-phu-yen");
        assert_eq!(slugify("Bánh xèo mực Sông Cầu"), "banh-xeo-muc-song-cau");
        assert_eq!(slugify("  Cá ngừ đại dương!!  "), "ca-ngu-dai-duong");
    }

    #[test]
    fn decomposed_titles_fold_like_precomposed() {
        let decomposed = "Phu\u{0301} Y\u{0065}\u{0302}n";
        assert_eq!(slugify(decomposed), "phu-yen");
        let nfd: String = "Đầm Ô Loan".nfd().collect();
        assert_eq!(slugify(&nfd), slugify("Đầm Ô Loan"));
        assert_eq!(slugify(&nfd), "dam-o-loan");
    }

    #[test]
    fn empty_titles_get_a_fallback() {
        assert_eq!(slugify("!!!"), FALLBACK_SLUG);
    }

    #[test]
    fn slugs_are_bounded() {
        let slug = slugify(&"tháp nhạn ".repeat(30));
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }
}
