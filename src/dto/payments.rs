use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VnpayPayment {
    pub payment_url: String,
    pub txn_ref: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ZalopayPayment {
    pub order_url: String,
    pub app_trans_id: String,
}

/// What the browser lands on after the VNPay redirect.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResult {
    pub paid: bool,
    pub response_code: String,
    pub order_id: Option<Uuid>,
    pub invoice_number: Option<String>,
}
