//! VNPay redirect payments (API version 2.1.0).
//!
//! Requests and callbacks are signed with HMAC-SHA512 over the
//! key-sorted, form-urlencoded parameter list.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, FixedOffset, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha512;
use url::form_urlencoded;

use crate::config::VnpayConfig;

type HmacSha512 = Hmac<Sha512>;

pub const VERSION: &str = "2.1.0";
pub const SECURE_HASH: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
pub const SUCCESS_CODE: &str = "00";
pub const PAYMENT_WINDOW_MINUTES: i64 = 15;
const VN_UTC_OFFSET_SECS: i32 = 7 * 3600;

/// Vietnam time, which is what VNPay expects in every date field.
pub fn vn_time(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    match FixedOffset::east_opt(VN_UTC_OFFSET_SECS) {
        Some(offset) => at.with_timezone(&offset),
        None => at.fixed_offset(),
    }
}

pub fn format_date(at: DateTime<Utc>) -> String {
    vn_time(at).format("%Y%m%d%H%M%S").to_string()
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// `k1=v1&k2=v2` with keys sorted and values form-encoded (space as `+`).
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn sign(secret: &str, data: &str) -> String {
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub struct PaymentRequest<'a> {
    pub txn_ref: &'a str,
    /// Amount in VND; VNPay wants it multiplied by 100.
    pub amount: i64,
    pub order_info: &'a str,
    pub ip_addr: &'a str,
    pub created_at: DateTime<Utc>,
}

pub fn build_payment_url(config: &VnpayConfig, req: &PaymentRequest<'_>) -> String {
    let mut params = BTreeMap::new();
    params.insert("vnp_Version".to_string(), VERSION.to_string());
    params.insert("vnp_Command".to_string(), "pay".to_string());
    params.insert("vnp_TmnCode".to_string(), config.tmn_code.clone());
    params.insert("vnp_Amount".to_string(), (req.amount * 100).to_string());
    params.insert("vnp_CurrCode".to_string(), "VND".to_string());
    params.insert("vnp_TxnRef".to_string(), req.txn_ref.to_string());
    params.insert("vnp_OrderInfo".to_string(), req.order_info.to_string());
    params.insert("vnp_OrderType".to_string(), "other".to_string());
    params.insert("vnp_Locale".to_string(), "vn".to_string());
    params.insert("vnp_ReturnUrl".to_string(), config.return_url.clone());
    params.insert("vnp_IpAddr".to_string(), req.ip_addr.to_string());
    params.insert("vnp_CreateDate".to_string(), format_date(req.created_at));
    params.insert(
        "vnp_ExpireDate".to_string(),
        format_date(req.created_at + Duration::minutes(PAYMENT_WINDOW_MINUTES)),
    );

    let query = canonical_query(&params);
    let signature = sign(&config.hash_secret, &query);
    format!("{}?{}&{}={}", config.pay_url, query, SECURE_HASH, signature)
}

/// Checks `vnp_SecureHash` against the remaining `vnp_*` parameters.
pub fn verify(config: &VnpayConfig, params: &HashMap<String, String>) -> bool {
    let Some(provided) = params.get(SECURE_HASH) else {
        return false;
    };
    let signed: BTreeMap<String, String> = params
        .iter()
        .filter(|(k, _)| k.starts_with("vnp_") && *k != SECURE_HASH && *k != SECURE_HASH_TYPE)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let expected = sign(&config.hash_secret, &canonical_query(&signed));
    !expected.is_empty() && expected.eq_ignore_ascii_case(provided)
}

/// Fields of a return/IPN call that the shop acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Callback {
    pub txn_ref: String,
    /// `vnp_Amount` as sent: VND multiplied by 100.
    pub raw_amount: i64,
    pub response_code: String,
    pub transaction_status: Option<String>,
    pub transaction_no: Option<String>,
}

impl Callback {
    pub fn from_params(params: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            txn_ref: params.get("vnp_TxnRef")?.clone(),
            raw_amount: params.get("vnp_Amount")?.parse::<i64>().ok()?,
            response_code: params.get("vnp_ResponseCode")?.clone(),
            transaction_status: params.get("vnp_TransactionStatus").cloned(),
            transaction_no: params.get("vnp_TransactionNo").cloned(),
        })
    }

    /// Amount in VND, or `None` when `vnp_Amount` is not a whole number
    /// of dong.
    pub fn amount_vnd(&self) -> Option<i64> {
        (self.raw_amount >= 0 && self.raw_amount % 100 == 0).then_some(self.raw_amount / 100)
    }

    pub fn is_success(&self) -> bool {
        self.response_code == SUCCESS_CODE
            && self.transaction_status.as_deref().is_none_or(|s| s == SUCCESS_CODE)
    }
}

/// Body VNPay expects from the IPN endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, utoipa::ToSchema)]
pub struct IpnResponse {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl IpnResponse {
    fn new(code: &str, message: &str) -> Self {
        Self {
            rsp_code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn confirmed() -> Self {
        Self::new("00", "Confirm Success")
    }

    pub fn order_not_found() -> Self {
        Self::new("01", "Order not found")
    }

    pub fn already_confirmed() -> Self {
        Self::new("02", "Order already confirmed")
    }

    pub fn invalid_amount() -> Self {
        Self::new("04", "Invalid amount")
    }

    pub fn invalid_signature() -> Self {
        Self::new("97", "Invalid signature")
    }

    pub fn unknown_error() -> Self {
        Self::new("99", "Unknown error")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn config() -> VnpayConfig {
        VnpayConfig {
            tmn_code: "PHUYEN01".into(),
            hash_secret: "SECRETKEY".into(),
            pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
            return_url: "http://localhost:3000/api/payments/vnpay/return".into(),
        }
    }

    fn query_params(url: &str) -> HashMap<String, String> {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
        form_urlencoded::parse(query.as_bytes()).into_owned().collect()
    }

    #[test]
    fn canonical_query_sorts_and_encodes() {
        let mut params = BTreeMap::new();
        params.insert("vnp_OrderInfo".to_string(), "Thanh toan don PY 1".to_string());
        params.insert("vnp_Amount".to_string(), "10000".to_string());
        params.insert("vnp_Empty".to_string(), String::new());
        assert_eq!(
            canonical_query(&params),
            "vnp_Amount=10000&vnp_OrderInfo=Thanh+toan+don+PY+1"
        );
    }

    #[test]
    fn dates_are_in_vietnam_time() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 20, 30, 0).unwrap();
        assert_eq!(format_date(at), "20250602033000");
    }

    #[test]
    fn payment_url_is_signed_and_verifiable() {
        let cfg = config();
        let url = build_payment_url(
            &cfg,
            &PaymentRequest {
                txn_ref: "PY20250601ABCD1234",
                amount: 245_000,
                order_info: "Thanh toan don hang PY-20250601-ABCD1234",
                ip_addr: "127.0.0.1",
                created_at: Utc::now(),
            },
        );
        assert!(url.starts_with(&cfg.pay_url));

        let params = query_params(&url);
        assert_eq!(params.get("vnp_Amount").map(String::as_str), Some("24500000"));
        assert_eq!(params.get(SECURE_HASH).map(String::len), Some(128));
        assert!(verify(&cfg, &params));

        let mut tampered = params.clone();
        tampered.insert("vnp_Amount".into(), "100".into());
        assert!(!verify(&cfg, &tampered));
    }

    #[test]
    fn callback_amount_is_divided_back() {
        let mut params = HashMap::new();
        params.insert("vnp_TxnRef".to_string(), "REF1".to_string());
        params.insert("vnp_Amount".to_string(), "24500000".to_string());
        params.insert("vnp_ResponseCode".to_string(), "00".to_string());
        params.insert("vnp_TransactionStatus".to_string(), "00".to_string());
        let cb = Callback::from_params(&params).unwrap();
        assert_eq!(cb.amount_vnd(), Some(245_000));
        assert!(cb.is_success());

        params.insert("vnp_ResponseCode".to_string(), "24".to_string());
        assert!(!Callback::from_params(&params).unwrap().is_success());
    }

    #[test]
    fn fractional_amounts_are_not_rounded() {
        let mut params = HashMap::new();
        params.insert("vnp_TxnRef".to_string(), "REF1".to_string());
        params.insert("vnp_Amount".to_string(), "24500099".to_string());
        params.insert("vnp_ResponseCode".to_string(), "00".to_string());
        params.insert("vnp_TransactionNo".to_string(), "14123456".to_string());
        let cb = Callback::from_params(&params).unwrap();
        assert_eq!(cb.amount_vnd(), None);
        assert_eq!(cb.transaction_no.as_deref(), Some("14123456"));
    }
}
