use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub redis_url: String,
    pub cors_origin: Option<String>,
    pub jwt: JwtConfig,
    pub shop: ShopConfig,
    pub smtp: Option<SmtpConfig>,
    pub vnpay: Option<VnpayConfig>,
    pub zalopay: Option<ZalopayConfig>,
    pub groq: Option<GroqConfig>,
    pub cloudinary: Option<CloudinaryConfig>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct ShopConfig {
    pub shipping_fee: i64,
    pub free_shipping_threshold: i64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct VnpayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    pub pay_url: String,
    pub return_url: String,
}

#[derive(Debug, Clone)]
pub struct ZalopayConfig {
    pub app_id: String,
    pub key1: String,
    pub key2: String,
    pub endpoint: String,
    pub redirect_url: String,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GroqConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let access_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let refresh_secret = optional("JWT_REFRESH_SECRET")
            .unwrap_or_else(|| format!("{access_secret}:refresh"));

        let jwt = JwtConfig {
            access_secret,
            refresh_secret,
            access_ttl_minutes: parsed("ACCESS_TOKEN_TTL_MINUTES", 15),
            refresh_ttl_days: parsed("REFRESH_TOKEN_TTL_DAYS", 7),
        };

        let shop = ShopConfig {
            shipping_fee: parsed("SHIPPING_FEE", 30_000),
            free_shipping_threshold: parsed("FREE_SHIPPING_THRESHOLD", 500_000),
        };

        Ok(Self {
            database_url,
            host,
            port,
            redis_url,
            cors_origin: optional("CORS_ORIGIN"),
            jwt,
            shop,
            smtp: SmtpConfig::from_env(),
            vnpay: VnpayConfig::from_env(),
            zalopay: ZalopayConfig::from_env(),
            groq: GroqConfig::from_env(),
            cloudinary: CloudinaryConfig::from_env(),
        })
    }
}

impl SmtpConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            host: optional("SMTP_HOST")?,
            port: parsed("SMTP_PORT", 587),
            username: optional("SMTP_USERNAME")?,
            password: optional("SMTP_PASSWORD")?,
            from: optional("SMTP_FROM")?,
        })
    }
}

impl VnpayConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            tmn_code: optional("VNPAY_TMN_CODE")?,
            hash_secret: optional("VNPAY_HASH_SECRET")?,
            pay_url: optional("VNPAY_URL").unwrap_or_else(|| {
                "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string()
            }),
            return_url: optional("VNPAY_RETURN_URL")?,
        })
    }
}

impl ZalopayConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            app_id: optional("ZALOPAY_APP_ID")?,
            key1: optional("ZALOPAY_KEY1")?,
            key2: optional("ZALOPAY_KEY2")?,
            endpoint: optional("ZALOPAY_ENDPOINT")
                .unwrap_or_else(|| "https://sb-openapi.zalopay.vn/v2/create".to_string()),
            redirect_url: optional("ZALOPAY_REDIRECT_URL")?,
            callback_url: optional("ZALOPAY_CALLBACK_URL"),
        })
    }
}

impl GroqConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            api_key: optional("GROQ_API_KEY")?,
            model: optional("GROQ_MODEL").unwrap_or_else(|| "llama-3.1-8b-instant".to_string()),
        })
    }
}

impl CloudinaryConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            cloud_name: optional("CLOUDINARY_CLOUD_NAME")?,
            api_key: optional("CLOUDINARY_API_KEY")?,
            api_secret: optional("CLOUDINARY_API_SECRET")?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
