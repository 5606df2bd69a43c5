//! SMTP delivery for OTP emails.
//!
//! Without SMTP settings the code is written to the log instead, which keeps
//! local development usable.

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};

use crate::{
    config::SmtpConfig,
    error::{AppError, AppResult},
    integrations::otp_store::{OTP_TTL_SECONDS, OtpPurpose},
};

#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
}

impl Mailer {
    pub fn new(config: Option<&SmtpConfig>) -> anyhow::Result<Self> {
        let Some(config) = config else {
            return Ok(Self::disabled());
        };

        let credentials = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport: Some(transport),
            from: config.from.clone(),
        })
    }

    pub fn disabled() -> Self {
        Self {
            transport: None,
            from: "no-reply@localhost".to_string(),
        }
    }

    pub async fn send_otp(&self, to: &str, purpose: OtpPurpose, code: &str) -> AppResult<()> {
        let Some(transport) = &self.transport else {
            tracing::info!(to, purpose = purpose.as_str(), code, "SMTP not configured, OTP logged");
            return Ok(());
        };

        let (subject, action) = match purpose {
            OtpPurpose::Register => ("Mã xác thực đăng ký tài khoản", "đăng ký tài khoản"),
            OtpPurpose::ResetPassword => ("Mã xác thực đặt lại mật khẩu", "đặt lại mật khẩu"),
        };
        let body = format!(
            "Xin chào,\n\nMã OTP để {action} tại Đặc sản Phú Yên là: {code}\n\
             Mã có hiệu lực trong {} phút. Vui lòng không chia sẻ mã này cho bất kỳ ai.\n",
            OTP_TTL_SECONDS / 60
        );

        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|_| AppError::Internal(anyhow::anyhow!("invalid SMTP_FROM address")))?,
            )
            .to(to
                .parse()
                .map_err(|_| AppError::BadRequest("Invalid email address".into()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

        transport
            .send(message)
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("Could not send email: {e}")))?;
        Ok(())
    }
}
