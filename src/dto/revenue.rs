use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RevenueRangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DailyRevenueQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopProductsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema, FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevenueSummary {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub revenue: i64,
    pub total_orders: i64,
    pub paid_orders: i64,
    pub average_order_value: i64,
    pub by_status: Vec<StatusCount>,
}

#[derive(Debug, Serialize, ToSchema, FromRow)]
pub struct DailyRevenue {
    pub day: NaiveDate,
    pub revenue: i64,
    pub orders: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DailyRevenueList {
    pub items: Vec<DailyRevenue>,
}

#[derive(Debug, Serialize, ToSchema, FromRow)]
pub struct TopProduct {
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i64,
    pub revenue: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopProductList {
    pub items: Vec<TopProduct>,
}
