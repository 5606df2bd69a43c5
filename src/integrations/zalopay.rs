//! ZaloPay gateway (v2 `create` API and server callback).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
    config::ZalopayConfig,
    error::{AppError, AppResult},
    integrations::vnpay::vn_time,
};

type HmacSha256 = Hmac<Sha256>;

pub const RETURN_CODE_SUCCESS: i32 = 1;

pub fn hmac_hex(key: &str, data: &str) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return String::new();
    };
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// `yymmdd_<reference>`, dated in Vietnam time as ZaloPay requires.
pub fn app_trans_id(reference: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", vn_time(at).format("%y%m%d"), reference)
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderForm {
    pub app_id: String,
    pub app_user: String,
    pub app_trans_id: String,
    pub app_time: i64,
    pub amount: i64,
    pub item: String,
    pub embed_data: String,
    pub description: String,
    pub bank_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub mac: String,
}

impl CreateOrderForm {
    pub fn new(
        config: &ZalopayConfig,
        app_user: &str,
        app_trans_id: String,
        amount: i64,
        item: serde_json::Value,
        description: String,
        at: DateTime<Utc>,
    ) -> Self {
        let embed_data = serde_json::json!({ "redirecturl": config.redirect_url }).to_string();
        let item = item.to_string();
        let app_time = at.timestamp_millis();
        let mac_input = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            config.app_id, app_trans_id, app_user, amount, app_time, embed_data, item
        );
        Self {
            app_id: config.app_id.clone(),
            app_user: app_user.to_string(),
            app_trans_id,
            app_time,
            amount,
            item,
            embed_data,
            description,
            bank_code: String::new(),
            callback_url: config.callback_url.clone(),
            mac: hmac_hex(&config.key1, &mac_input),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderResponse {
    pub return_code: i32,
    pub return_message: String,
    #[serde(default)]
    pub sub_return_message: Option<String>,
    #[serde(default)]
    pub order_url: Option<String>,
    #[serde(default)]
    pub zp_trans_token: Option<String>,
}

pub async fn create_order(
    http: &reqwest::Client,
    config: &ZalopayConfig,
    form: &CreateOrderForm,
) -> AppResult<CreateOrderResponse> {
    let response: CreateOrderResponse = http
        .post(&config.endpoint)
        .form(form)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    if response.return_code != RETURN_CODE_SUCCESS {
        tracing::warn!(
            code = response.return_code,
            message = %response.return_message,
            detail = ?response.sub_return_message,
            "zalopay rejected order"
        );
        return Err(AppError::BadRequest(format!(
            "ZaloPay: {}",
            response.sub_return_message.as_deref().unwrap_or(&response.return_message)
        )));
    }
    Ok(response)
}

/// Callback body. `data` is itself a JSON document, signed with key2.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CallbackRequest {
    pub data: String,
    pub mac: String,
    #[serde(rename = "type", default)]
    pub kind: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackData {
    pub app_trans_id: String,
    pub amount: i64,
    #[serde(default)]
    pub zp_trans_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, utoipa::ToSchema)]
pub struct CallbackResponse {
    pub return_code: i32,
    pub return_message: String,
}

impl CallbackResponse {
    pub fn success() -> Self {
        Self {
            return_code: 1,
            return_message: "success".into(),
        }
    }

    pub fn invalid_mac() -> Self {
        Self {
            return_code: -1,
            return_message: "mac not equal".into(),
        }
    }

    /// ZaloPay retries callbacks answered with 0.
    pub fn retry(message: impl Into<String>) -> Self {
        Self {
            return_code: 0,
            return_message: message.into(),
        }
    }
}

pub fn verify_callback(config: &ZalopayConfig, req: &CallbackRequest) -> bool {
    let expected = hmac_hex(&config.key2, &req.data);
    !expected.is_empty() && expected.eq_ignore_ascii_case(&req.mac)
}

pub fn parse_callback_data(data: &str) -> AppResult<CallbackData> {
    serde_json::from_str(data)
        .map_err(|e| AppError::BadRequest(format!("invalid callback data: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn config() -> ZalopayConfig {
        ZalopayConfig {
            app_id: "2553".into(),
            key1: "sandbox-key1".into(),
            key2: "sandbox-key2".into(),
            endpoint: "https://sb-openapi.zalopay.vn/v2/create".into(),
            redirect_url: "http://localhost:5173/payment/result".into(),
            callback_url: None,
        }
    }

    #[test]
    fn trans_id_uses_vietnam_date() {
        let at = Utc.with_ymd_and_hms(2025, 12, 31, 18, 0, 0).unwrap();
        assert_eq!(app_trans_id("PY1A2B", at), "260101_PY1A2B");
    }

    #[test]
    fn order_mac_covers_the_documented_fields() {
        let cfg = config();
        let at = Utc::now();
        let form = CreateOrderForm::new(
            &cfg,
            "user-1",
            "250601_REF".into(),
            150_000,
            serde_json::json!([]),
            "Thanh toán đơn hàng".into(),
            at,
        );
        let input = format!(
            "2553|250601_REF|user-1|150000|{}|{}|[]",
            at.timestamp_millis(),
            form.embed_data
        );
        assert_eq!(form.mac, hmac_hex(&cfg.key1, &input));
        assert_eq!(form.mac.len(), 64);
    }

    #[test]
    fn callback_mac_is_checked_with_key2() {
        let cfg = config();
        let data = r#"{"app_trans_id":"250601_REF","amount":150000,"zp_trans_id":1}"#.to_string();
        let good = CallbackRequest {
            mac: hmac_hex(&cfg.key2, &data),
            data: data.clone(),
            kind: Some(1),
        };
        assert!(verify_callback(&cfg, &good));

        let signed_with_key1 = CallbackRequest {
            mac: hmac_hex(&cfg.key1, &data),
            data,
            kind: Some(1),
        };
        assert!(!verify_callback(&cfg, &signed_with_key1));

        let parsed = parse_callback_data(&good.data).unwrap();
        assert_eq!(parsed.amount, 150_000);
    }
}
