use std::{sync::Arc, time::Duration};

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, create_orm_conn},
    integrations::{mailer::Mailer, otp_store::OtpStore},
    realtime::hub::ChatHub,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub otp: OtpStore,
    pub mailer: Mailer,
    pub hub: ChatHub,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(pool: DbPool, config: AppConfig) -> anyhow::Result<Self> {
        let orm = create_orm_conn(&pool);
        let otp = OtpStore::new(&config.redis_url)?;
        let mailer = Mailer::new(config.smtp.as_ref())?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            pool,
            orm,
            config: Arc::new(config),
            otp,
            mailer,
            hub: ChatHub::new(),
            http,
        })
    }
}
