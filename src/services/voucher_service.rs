use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    audit::audit,
    config::ShopConfig,
    dto::vouchers::{
        ApplyVoucherRequest, CreateVoucherRequest, UpdateVoucherRequest, VoucherList, VoucherQuote,
    },
    entity::vouchers::{ActiveModel, Column, Entity as Vouchers, Model as VoucherModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_seller},
    models::{Voucher, VoucherKind},
    response::{ApiResponse, Meta, empty_data},
    routes::params::Pagination,
    state::AppState,
};

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Flat fee, waived once the subtotal reaches the free-shipping threshold.
pub fn shipping_fee_for(shop: &ShopConfig, subtotal: i64) -> i64 {
    if subtotal >= shop.free_shipping_threshold {
        0
    } else {
        shop.shipping_fee
    }
}

/// Discount a voucher grants on an order. Never exceeds the amount it
/// applies to: the subtotal for percentage/fixed, the fee for freeship.
pub fn compute_discount(voucher: &Voucher, subtotal: i64, shipping_fee: i64) -> i64 {
    let subtotal = subtotal.max(0);
    let discount = match voucher.kind {
        VoucherKind::Percentage => {
            let pct = i128::from(voucher.value.clamp(0, 100));
            let raw = i64::try_from(i128::from(subtotal) * pct / 100).unwrap_or(subtotal);
            match voucher.max_discount {
                Some(cap) if cap > 0 => raw.min(cap),
                _ => raw,
            }
        }
        VoucherKind::Fixed => voucher.value.min(subtotal),
        VoucherKind::Freeship => {
            if voucher.value <= 0 {
                shipping_fee
            } else {
                voucher.value.min(shipping_fee)
            }
        }
    };
    discount.max(0)
}

/// Rejects vouchers that cannot be used right now for this subtotal.
pub fn check_usable(voucher: &Voucher, subtotal: i64, now: DateTime<Utc>) -> AppResult<()> {
    if !voucher.is_active {
        return Err(AppError::BadRequest("Voucher is not active".into()));
    }
    if now < voucher.starts_at {
        return Err(AppError::BadRequest("Voucher is not yet valid".into()));
    }
    if now > voucher.expires_at {
        return Err(AppError::BadRequest("Voucher has expired".into()));
    }
    if voucher.usage_limit.is_some_and(|limit| voucher.used_count >= limit) {
        return Err(AppError::BadRequest("Voucher usage limit reached".into()));
    }
    if subtotal < voucher.min_order_value {
        return Err(AppError::BadRequest(format!(
            "Order must be at least {} VND to use this voucher",
            voucher.min_order_value
        )));
    }
    Ok(())
}

pub fn quote(voucher: &Voucher, shop: &ShopConfig, subtotal: i64) -> VoucherQuote {
    let shipping_fee = shipping_fee_for(shop, subtotal);
    let discount = compute_discount(voucher, subtotal, shipping_fee);
    VoucherQuote {
        code: voucher.code.clone(),
        subtotal,
        shipping_fee,
        discount,
        total: subtotal.saturating_add(shipping_fee).saturating_sub(discount).max(0),
    }
}

/// Looks a voucher up by code on any connection; `lock` takes a row lock
/// for use inside an order transaction.
pub async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    lock: bool,
) -> AppResult<Option<VoucherModel>> {
    let mut finder = Vouchers::find().filter(Column::Code.eq(normalize_code(code)));
    if lock {
        finder = finder.lock_exclusive();
    }
    Ok(finder.one(conn).await?)
}

pub async fn list_available(state: &AppState) -> AppResult<ApiResponse<VoucherList>> {
    let now = Utc::now();
    let items: Vec<Voucher> = Vouchers::find()
        .filter(Column::IsActive.eq(true))
        .filter(Column::StartsAt.lte(now))
        .filter(Column::ExpiresAt.gte(now))
        .filter(
            Condition::any()
                .add(Column::UsageLimit.is_null())
                .add(Expr::col(Column::UsedCount).lt(Expr::col(Column::UsageLimit))),
        )
        .order_by_asc(Column::ExpiresAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Voucher::from)
        .collect();

    Ok(ApiResponse::success("Vouchers", VoucherList { items }, None))
}

pub async fn apply_voucher(
    state: &AppState,
    payload: ApplyVoucherRequest,
) -> AppResult<ApiResponse<VoucherQuote>> {
    let voucher = find_by_code(&state.orm, &payload.code, false)
        .await?
        .map(Voucher::from)
        .ok_or_else(|| AppError::BadRequest("Voucher not found".into()))?;

    check_usable(&voucher, payload.subtotal, Utc::now())?;
    let quote = quote(&voucher, &state.config.shop, payload.subtotal);

    Ok(ApiResponse::success("Voucher applied", quote, None))
}

pub async fn list_all(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<VoucherList>> {
    ensure_seller(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Vouchers::find().order_by_desc(Column::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Voucher::from)
        .collect();

    Ok(ApiResponse::success(
        "Vouchers",
        VoucherList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn create_voucher(
    state: &AppState,
    user: &AuthUser,
    payload: CreateVoucherRequest,
) -> AppResult<ApiResponse<Voucher>> {
    ensure_seller(user)?;
    let code = normalize_code(&payload.code);
    let starts_at = payload.starts_at.unwrap_or_else(Utc::now);
    validate_terms(payload.kind, payload.value, starts_at, payload.expires_at)?;

    if find_by_code(&state.orm, &code, false).await?.is_some() {
        return Err(AppError::Conflict("Voucher code already exists".into()));
    }

    let now = Utc::now();
    let voucher = ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code),
        description: Set(payload.description),
        kind: Set(payload.kind.as_str().to_string()),
        value: Set(payload.value),
        max_discount: Set(payload.max_discount),
        min_order_value: Set(payload.min_order_value.max(0)),
        usage_limit: Set(payload.usage_limit),
        used_count: Set(0),
        starts_at: Set(starts_at.into()),
        expires_at: Set(payload.expires_at.into()),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    audit(state, user.user_id, "voucher_create", "vouchers", serde_json::json!({ "code": voucher.code })).await;

    Ok(ApiResponse::success("Voucher created", Voucher::from(voucher), None))
}

pub async fn update_voucher(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateVoucherRequest,
) -> AppResult<ApiResponse<Voucher>> {
    ensure_seller(user)?;
    let existing = Vouchers::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let current = Voucher::from(existing.clone());

    validate_terms(
        current.kind,
        payload.value.unwrap_or(current.value),
        payload.starts_at.unwrap_or(current.starts_at),
        payload.expires_at.unwrap_or(current.expires_at),
    )?;

    let mut active: ActiveModel = existing.into();
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(value) = payload.value {
        active.value = Set(value);
    }
    if let Some(max_discount) = payload.max_discount {
        active.max_discount = Set(Some(max_discount).filter(|v| *v > 0));
    }
    if let Some(min_order_value) = payload.min_order_value {
        active.min_order_value = Set(min_order_value.max(0));
    }
    if let Some(usage_limit) = payload.usage_limit {
        active.usage_limit = Set(Some(usage_limit).filter(|v| *v > 0));
    }
    if let Some(starts_at) = payload.starts_at {
        active.starts_at = Set(starts_at.into());
    }
    if let Some(expires_at) = payload.expires_at {
        active.expires_at = Set(expires_at.into());
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());

    let voucher = active.update(&state.orm).await?;
    Ok(ApiResponse::success("Updated", Voucher::from(voucher), None))
}

pub async fn delete_voucher(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_seller(user)?;
    let result = Vouchers::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    audit(state, user.user_id, "voucher_delete", "vouchers", serde_json::json!({ "voucher_id": id })).await;
    Ok(ApiResponse::success("Deleted", empty_data(), None))
}

fn validate_terms(
    kind: VoucherKind,
    value: i64,
    starts_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> AppResult<()> {
    match kind {
        VoucherKind::Percentage if !(1..=100).contains(&value) => {
            return Err(AppError::BadRequest("percentage must be between 1 and 100".into()));
        }
        VoucherKind::Fixed if value <= 0 => {
            return Err(AppError::BadRequest("value must be greater than 0".into()));
        }
        VoucherKind::Freeship if value < 0 => {
            return Err(AppError::BadRequest("value cannot be negative".into()));
        }
        _ => {}
    }
    if expires_at <= starts_at {
        return Err(AppError::BadRequest("expires_at must be after starts_at".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn shop() -> ShopConfig {
        ShopConfig {
            shipping_fee: 30_000,
            free_shipping_threshold: 500_000,
        }
    }

    fn voucher(kind: VoucherKind, value: i64) -> Voucher {
        let now = Utc::now();
        Voucher {
            id: Uuid::new_v4(),
            code: "PHUYEN10".into(),
            description: None,
            kind,
            value,
            max_discount: None,
            min_order_value: 0,
            usage_limit: None,
            used_count: 0,
            starts_at: now - Duration::days(1),
            expires_at: now + Duration::days(1),
            is_active: true,
        }
    }

    #[test]
    fn percentage_is_capped_by_max_discount() {
        let mut v = voucher(VoucherKind::Percentage, 10);
        assert_eq!(compute_discount(&v, 300_000, 30_000), 30_000);
        v.max_discount = Some(20_000);
        assert_eq!(compute_discount(&v, 300_000, 30_000), 20_000);
    }

    #[test]
    fn fixed_never_exceeds_subtotal() {
        let v = voucher(VoucherKind::Fixed, 50_000);
        assert_eq!(compute_discount(&v, 200_000, 30_000), 50_000);
        assert_eq!(compute_discount(&v, 40_000, 30_000), 40_000);
    }

    #[test]
    fn freeship_covers_at_most_the_fee() {
        assert_eq!(compute_discount(&voucher(VoucherKind::Freeship, 0), 100_000, 30_000), 30_000);
        assert_eq!(compute_discount(&voucher(VoucherKind::Freeship, 15_000), 100_000, 30_000), 15_000);
        assert_eq!(compute_discount(&voucher(VoucherKind::Freeship, 50_000), 100_000, 30_000), 30_000);
        assert_eq!(compute_discount(&voucher(VoucherKind::Freeship, 0), 600_000, 0), 0);
    }

    #[test]
    fn shipping_is_free_from_threshold() {
        assert_eq!(shipping_fee_for(&shop(), 499_999), 30_000);
        assert_eq!(shipping_fee_for(&shop(), 500_000), 0);
    }

    #[test]
    fn quote_totals_subtotal_plus_fee_minus_discount() {
        let q = quote(&voucher(VoucherKind::Fixed, 20_000), &shop(), 150_000);
        assert_eq!(q.shipping_fee, 30_000);
        assert_eq!(q.discount, 20_000);
        assert_eq!(q.total, 160_000);
    }

    #[test]
    fn usability_checks() {
        let now = Utc::now();
        let mut v = voucher(VoucherKind::Fixed, 10_000);
        assert!(check_usable(&v, 100_000, now).is_ok());

        v.min_order_value = 200_000;
        assert!(check_usable(&v, 100_000, now).is_err());
        v.min_order_value = 0;

        v.usage_limit = Some(3);
        v.used_count = 3;
        assert!(check_usable(&v, 100_000, now).is_err());
        v.usage_limit = None;

        v.expires_at = now - Duration::minutes(1);
        assert!(check_usable(&v, 100_000, now).is_err());

        let mut inactive = voucher(VoucherKind::Fixed, 10_000);
        inactive.is_active = false;
        assert!(check_usable(&inactive, 100_000, now).is_err());
    }

    #[test]
    fn huge_subtotals_do_not_overflow() {
        let v = voucher(VoucherKind::Percentage, 50);
        assert_eq!(compute_discount(&v, i64::MAX, 0), i64::MAX / 2);
        let q = quote(&voucher(VoucherKind::Fixed, 1), &shop(), i64::MAX - 1);
        assert_eq!(q.total, i64::MAX - 2);
    }

    #[test]
    fn quote_subtotal_is_bounded() {
        use validator::Validate;

        use crate::dto::vouchers::ApplyVoucherRequest;

        let too_big = ApplyVoucherRequest {
            code: "PHUYEN10".into(),
            subtotal: 10_000_000_001,
        };
        assert!(too_big.validate().is_err());
        let zero = ApplyVoucherRequest {
            code: "PHUYEN10".into(),
            subtotal: 0,
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn codes_are_upper_cased() {
        assert_eq!(normalize_code("  phuyen10 "), "PHUYEN10");
    }

    #[test]
    fn percentage_terms_are_bounded() {
        let now = Utc::now();
        let later = now + Duration::days(3);
        assert!(validate_terms(VoucherKind::Percentage, 0, now, later).is_err());
        assert!(validate_terms(VoucherKind::Percentage, 101, now, later).is_err());
        assert!(validate_terms(VoucherKind::Percentage, 15, now, later).is_ok());
        assert!(validate_terms(VoucherKind::Fixed, 10_000, later, now).is_err());
    }
}
