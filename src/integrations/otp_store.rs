//! One-time passwords for registration and password reset, kept in Redis
//! with a TTL so expiry needs no cleanup job.

use std::sync::Arc;

use rand::Rng;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

pub const OTP_TTL_SECONDS: u64 = 300;
pub const RESEND_COOLDOWN_SECONDS: u64 = 60;
pub const MAX_ATTEMPTS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Register,
    ResetPassword,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Register => "register",
            OtpPurpose::ResetPassword => "reset_password",
        }
    }
}

#[derive(Clone)]
pub struct OtpStore {
    client: Client,
    manager: Arc<OnceCell<ConnectionManager>>,
}

impl OtpStore {
    /// Opening the client does not connect. The shared connection manager
    /// is built on first use and reconnects on its own afterwards.
    pub fn new(redis_url: &str) -> AppResult<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            client,
            manager: Arc::new(OnceCell::new()),
        })
    }

    async fn conn(&self) -> AppResult<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }

    /// Generate and store a fresh code. Fails with 429 while the resend
    /// cooldown for this email/purpose is active.
    pub async fn issue(&self, purpose: OtpPurpose, email: &str) -> AppResult<String> {
        let mut conn = self.conn().await?;

        let cooldown = cooldown_key(purpose, email);
        let acquired: bool = redis::cmd("SET")
            .arg(&cooldown)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(RESEND_COOLDOWN_SECONDS)
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !acquired {
            return Err(AppError::TooManyRequests(format!(
                "Please wait {RESEND_COOLDOWN_SECONDS} seconds before requesting another code"
            )));
        }

        let code = generate_code();
        let _: () = conn
            .set_ex(otp_key(purpose, email), &code, OTP_TTL_SECONDS)
            .await?;
        let _: () = conn.del(attempts_key(purpose, email)).await?;
        Ok(code)
    }

    /// Check a submitted code. A match consumes the code; after
    /// `MAX_ATTEMPTS` misses the code is burned.
    pub async fn verify(&self, purpose: OtpPurpose, email: &str, code: &str) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let key = otp_key(purpose, email);
        let stored: Option<String> = conn.get(&key).await?;

        let Some(stored) = stored else {
            return Err(AppError::BadRequest("OTP has expired or was not requested".into()));
        };

        if stored == code.trim() {
            let _: () = conn.del(vec![key, attempts_key(purpose, email)]).await?;
            return Ok(());
        }

        let attempts_key = attempts_key(purpose, email);
        let attempts: i64 = conn.incr(&attempts_key, 1).await?;
        let _: () = conn.expire(&attempts_key, OTP_TTL_SECONDS as i64).await?;
        if attempts >= MAX_ATTEMPTS {
            let _: () = conn.del(vec![key, attempts_key]).await?;
            return Err(AppError::BadRequest(
                "Too many wrong attempts, please request a new OTP".into(),
            ));
        }
        Err(AppError::BadRequest("Invalid OTP".into()))
    }
}

pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{n:06}")
}

fn otp_key(purpose: OtpPurpose, email: &str) -> String {
    format!("otp:{}:{}", purpose.as_str(), email.to_lowercase())
}

fn cooldown_key(purpose: OtpPurpose, email: &str) -> String {
    format!("otp:cooldown:{}:{}", purpose.as_str(), email.to_lowercase())
}

fn attempts_key(purpose: OtpPurpose, email: &str) -> String {
    format!("otp:attempts:{}:{}", purpose.as_str(), email.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn clones_share_one_connection_manager() {
        let store = OtpStore::new("redis://127.0.0.1:1").unwrap();
        let other = store.clone();
        assert!(Arc::ptr_eq(&store.manager, &other.manager));
        assert!(!store.manager.initialized());
    }

    #[test]
    fn keys_are_case_insensitive_on_email() {
        assert_eq!(
            otp_key(OtpPurpose::Register, "An@Example.com"),
            "otp:register:an@example.com"
        );
    }
}
