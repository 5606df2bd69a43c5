use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{dto::not_blank, integrations::otp_store::OtpPurpose, models::User};

#[derive(Deserialize, Debug, ToSchema, Validate)]
pub struct SendOtpRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub purpose: OtpPurpose,
}

#[derive(Deserialize, Debug, ToSchema, Validate)]
pub struct RegisterRequest {
    #[validate(length(max = 100, message = "Name is too long"))]
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, max = 128, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(equal = 6, message = "OTP must have 6 digits"))]
    pub otp: String,
}

#[derive(Deserialize, Debug, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Deserialize, Debug, ToSchema, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Deserialize, Debug, ToSchema, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(equal = 6, message = "OTP must have 6 digits"))]
    pub otp: String,
    #[validate(length(min = 6, max = 128, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub typ: String,
    pub jti: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_payload_rules() {
        let ok = RegisterRequest {
            name: "Lan".into(),
            email: "lan@phuyen.vn".into(),
            password: "bien123".into(),
            otp: "012345".into(),
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            name: "   ".into(),
            email: "lan.phuyen.vn".into(),
            password: "123".into(),
            otp: "12".into(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        for field in ["name", "email", "password", "otp"] {
            assert!(fields.contains_key(field), "{field} should be rejected");
        }
    }
}
