use crate::{
    audit::audit,
    dto::media::UploadedMedia,
    error::{AppError, AppResult},
    integrations::cloudinary,
    middleware::auth::{AuthUser, ensure_seller},
    response::ApiResponse,
    state::AppState,
};

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub fn validate_upload(upload: &Upload) -> AppResult<()> {
    if upload.bytes.is_empty() {
        return Err(AppError::BadRequest("file is empty".into()));
    }
    if upload.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::BadRequest("file must be at most 5MB".into()));
    }
    if !ALLOWED_TYPES.contains(&upload.content_type.as_str()) {
        return Err(AppError::BadRequest(format!(
            "unsupported file type {}",
            upload.content_type
        )));
    }
    Ok(())
}

pub async fn upload_image(
    state: &AppState,
    user: &AuthUser,
    upload: Upload,
) -> AppResult<ApiResponse<UploadedMedia>> {
    ensure_seller(user)?;
    let config = state
        .config
        .cloudinary
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("Image upload is not configured".into()))?;
    validate_upload(&upload)?;

    let size = upload.bytes.len();
    let uploaded = cloudinary::upload_image(
        &state.http,
        config,
        upload.file_name,
        &upload.content_type,
        upload.bytes,
    )
    .await?;

    tracing::info!(public_id = %uploaded.public_id, size, "image uploaded");
    audit(
        state,
        user.user_id,
        "media_upload",
        "media",
        serde_json::json!({ "public_id": uploaded.public_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Uploaded",
        UploadedMedia {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
            width: uploaded.width,
            height: uploaded.height,
            bytes: uploaded.bytes,
            format: uploaded.format,
        },
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(content_type: &str, len: usize) -> Upload {
        Upload {
            file_name: "banh-xeo.jpg".into(),
            content_type: content_type.into(),
            bytes: vec![0; len],
        }
    }

    #[test]
    fn rejects_non_images_and_oversized_files() {
        assert!(validate_upload(&upload("image/jpeg", 1024)).is_ok());
        assert!(validate_upload(&upload("application/pdf", 1024)).is_err());
        assert!(validate_upload(&upload("image/png", MAX_UPLOAD_BYTES + 1)).is_err());
        assert!(validate_upload(&upload("image/png", 0)).is_err());
    }
}
