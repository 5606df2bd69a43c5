//! Signed uploads to Cloudinary.

use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::{
    config::CloudinaryConfig,
    error::{AppError, AppResult},
};

pub const UPLOAD_FOLDER: &str = "phuyen-store";

/// SHA-256 over the sorted `key=value` pairs joined with `&`, followed by
/// the API secret.
pub fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub secure_url: String,
    pub public_id: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

pub async fn upload_image(
    http: &reqwest::Client,
    config: &CloudinaryConfig,
    file_name: String,
    content_type: &str,
    bytes: Vec<u8>,
) -> AppResult<UploadResponse> {
    let timestamp = Utc::now().timestamp().to_string();
    let signature = sign(
        &[("folder", UPLOAD_FOLDER.to_string()), ("timestamp", timestamp.clone())],
        &config.api_secret,
    );

    let part = Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(content_type)
        .map_err(|e| AppError::BadRequest(format!("invalid content type: {e}")))?;
    let form = Form::new()
        .part("file", part)
        .text("api_key", config.api_key.clone())
        .text("timestamp", timestamp)
        .text("folder", UPLOAD_FOLDER)
        .text("signature_algorithm", "sha256")
        .text("signature", signature);

    let url = format!(
        "https://api.cloudinary.com/v1_1/{}/image/upload",
        config.cloud_name
    );
    let response = http.post(url).multipart(form).send().await?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|b| b.error.message)
            .unwrap_or_else(|_| status.to_string());
        tracing::warn!(%status, %message, "cloudinary upload failed");
        return Err(AppError::BadRequest(format!("Upload failed: {message}")));
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_sorts_parameters() {
        let a = sign(
            &[("timestamp", "1700000000".into()), ("folder", UPLOAD_FOLDER.into())],
            "secret",
        );
        let b = sign(
            &[("folder", UPLOAD_FOLDER.into()), ("timestamp", "1700000000".into())],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut hasher = Sha256::new();
        hasher.update(b"folder=phuyen-store&timestamp=1700000000secret");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }
}
