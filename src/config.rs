use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub limit_bytes: i64,
}

/// Which payment processor backs invoices and checkout.
#[derive(Debug, Clone, Deserialize)]
pub enum ProcessorConfig {
    Stripe { secret_key: String },
    Dummy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub processor: ProcessorConfig,
    pub webhook_secret: String,
    pub service_fee_basis_points: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub enum EmailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        use_tls: bool,
    },
    File {
        path: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub transport: EmailTransportConfig,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusinessConfig {
    pub name: String,
    pub address_lines: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub admin_email: String,
    pub public_base_url: String,
    pub jwt: JwtConfig,
    pub s3: S3Config,
    pub payment: PaymentConfig,
    pub email: EmailConfig,
    pub business: BusinessConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let admin_email = std::env::var("ADMIN_EMAIL")
            .context("ADMIN_EMAIL must be set")?
            .trim()
            .to_lowercase();

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: env_or("JWT_ISSUER", "sitedesk"),
            audience: env_or("JWT_AUDIENCE", "sitedesk-admin"),
            ttl_minutes: env_parse("SESSION_TTL_MINUTES", 60 * 24),
            cookie_secure: env_parse("COOKIE_SECURE", true),
        };

        let s3 = S3Config {
            endpoint: env_or("S3_ENDPOINT", "http://localhost:9000"),
            bucket: env_or("S3_BUCKET", "sitedesk"),
            access_key: env_or("S3_ACCESS_KEY", "minioadmin"),
            secret_key: env_or("S3_SECRET_KEY", "minioadmin"),
            region: env_or("S3_REGION", "us-east-1"),
            limit_bytes: env_parse("STORAGE_LIMIT_BYTES", 1024 * 1024 * 1024),
        };

        let processor = match env_or("PAYMENT_PROVIDER", "stripe").as_str() {
            "dummy" => ProcessorConfig::Dummy,
            "stripe" => ProcessorConfig::Stripe {
                secret_key: std::env::var("STRIPE_SECRET_KEY")
                    .context("STRIPE_SECRET_KEY must be set for the stripe provider")?,
            },
            other => anyhow::bail!("unknown PAYMENT_PROVIDER {other:?}"),
        };
        let payment = PaymentConfig {
            processor,
            webhook_secret: env_or("STRIPE_WEBHOOK_SECRET", ""),
            service_fee_basis_points: env_parse("SERVICE_FEE_BASIS_POINTS", 350),
        };

        let transport = match env_or("EMAIL_TRANSPORT", "smtp").as_str() {
            "file" => EmailTransportConfig::File {
                path: env_or("EMAIL_FILE_DIR", "./emails"),
            },
            "smtp" => EmailTransportConfig::Smtp {
                host: env_or("SMTP_HOST", "smtp.gmail.com"),
                port: env_parse("SMTP_PORT", 587),
                username: env_or("SMTP_USER", ""),
                password: env_or("SMTP_PASSWORD", ""),
                use_tls: env_parse("SMTP_TLS", true),
            },
            other => anyhow::bail!("unknown EMAIL_TRANSPORT {other:?}"),
        };
        let email = EmailConfig {
            transport,
            from_email: std::env::var("EMAIL_FROM").unwrap_or_else(|_| admin_email.clone()),
            from_name: env_or("EMAIL_FROM_NAME", "Site Desk"),
        };

        let business = BusinessConfig {
            name: env_or("BUSINESS_NAME", "Custom Construction LLC"),
            address_lines: env_or("BUSINESS_ADDRESS", "")
                .split('|')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        };

        Ok(Self {
            database_url,
            admin_email,
            public_base_url: env_or("PUBLIC_BASE_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            jwt,
            s3,
            payment,
            email,
            business,
        })
    }
}
