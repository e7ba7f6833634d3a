use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub billing: BillingConfig,
    pub handoff: HandoffConfig,
    pub sync: SyncConfig,
    pub smtp: SmtpConfig,
    pub admin: AdminConfig,
    pub service_name: String,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub run_migrations: bool,
}

#[derive(Clone)]
pub struct BillingConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Signing key for activation handoff tokens.
#[derive(Clone)]
pub struct HandoffConfig {
    pub secret: Secret<String>,
    /// Base URL the activation link points at.
    pub activation_url: String,
}

#[derive(Clone)]
pub struct SyncConfig {
    pub base_url: String,
    pub shared_secret: Secret<String>,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

/// Guards the debug endpoints used to replay webhook outcomes locally.
#[derive(Clone)]
pub struct AdminConfig {
    pub enabled: bool,
    pub secret: Secret<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("TERRITORY_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("TERRITORY_SERVICE_PORT")
            .unwrap_or_else(|_| "3010".to_string())
            .parse()?;

        let db_url = env::var("TERRITORY_DATABASE_URL").expect("TERRITORY_DATABASE_URL must be set");
        let run_migrations = env::var("TERRITORY_RUN_MIGRATIONS")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let billing_secret_key = env::var("BILLING_SECRET_KEY").unwrap_or_default();
        let billing_webhook_secret = env::var("BILLING_WEBHOOK_SECRET").unwrap_or_default();
        let billing_api_base_url = env::var("BILLING_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string());
        let success_url = env::var("BILLING_SUCCESS_URL")
            .unwrap_or_else(|_| "http://localhost:3010/checkout/success".to_string());
        let cancel_url = env::var("BILLING_CANCEL_URL")
            .unwrap_or_else(|_| "http://localhost:3010/checkout/cancel".to_string());

        let handoff_secret =
            env::var("HANDOFF_TOKEN_SECRET").unwrap_or_else(|_| "dev-handoff-secret".to_string());
        let activation_url = env::var("MAIN_APP_ACTIVATION_URL")
            .unwrap_or_else(|_| "http://localhost:3000/activate".to_string());

        let sync_base_url = env::var("MAIN_APP_SYNC_URL").unwrap_or_default();
        let sync_secret = env::var("MAIN_APP_SYNC_SECRET").unwrap_or_default();

        let smtp_enabled = env::var("SMTP_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let smtp_host = env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string());
        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .unwrap_or(587);
        let smtp_user = env::var("SMTP_USER").unwrap_or_default();
        let smtp_password = env::var("SMTP_PASSWORD").unwrap_or_default();
        let from_email =
            env::var("SMTP_FROM_EMAIL").unwrap_or_else(|_| "no-reply@localhost".to_string());
        let from_name =
            env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Territory Service".to_string());

        let admin_secret = env::var("ADMIN_DEBUG_SECRET").unwrap_or_default();
        let admin_enabled = !admin_secret.is_empty();

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                run_migrations,
            },
            billing: BillingConfig {
                secret_key: Secret::new(billing_secret_key),
                webhook_secret: Secret::new(billing_webhook_secret),
                api_base_url: billing_api_base_url,
                success_url,
                cancel_url,
            },
            handoff: HandoffConfig {
                secret: Secret::new(handoff_secret),
                activation_url,
            },
            sync: SyncConfig {
                base_url: sync_base_url,
                shared_secret: Secret::new(sync_secret),
            },
            smtp: SmtpConfig {
                enabled: smtp_enabled,
                host: smtp_host,
                port: smtp_port,
                user: smtp_user,
                password: smtp_password,
                from_email,
                from_name,
            },
            admin: AdminConfig {
                enabled: admin_enabled,
                secret: Secret::new(admin_secret),
            },
            service_name: "territory-service".to_string(),
        })
    }
}
