pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use config::Config;
use services::{metrics::init_metrics, BillingClient, Database, Mailer, MainAppSync};
use territory_core::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub billing: BillingClient,
    pub mailer: Mailer,
    pub sync: MainAppSync,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(config.database.url.expose_secret(), 10, 2).await?;

        if config.database.run_migrations {
            db.run_migrations().await?;
        }

        let billing = BillingClient::new(config.billing.clone());
        if billing.is_configured() {
            tracing::info!("Billing provider client initialized");
        } else {
            tracing::warn!("Billing credentials not configured, checkout endpoints will fail");
        }

        let mailer = Mailer::new(config.smtp.clone())
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Mailer setup failed: {}", e)))?;
        let sync = MainAppSync::new(config.sync.clone());

        let state = AppState {
            db,
            config: config.clone(),
            billing,
            mailer,
            sync,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics))
            .route("/states", get(handlers::counties::list_states))
            .route("/counties", get(handlers::counties::list_counties))
            .route("/counties/:id", get(handlers::counties::get_county))
            .route("/offers", get(handlers::offers::list_offers))
            .route(
                "/checkout/subscription",
                post(handlers::checkout::subscription_checkout),
            )
            .route("/checkout/claim", post(handlers::checkout::claim_checkout))
            .route("/claims/quote", post(handlers::claims::quote))
            .route("/claims/free", post(handlers::claims::free_claim))
            .route("/trials", post(handlers::trials::create_trial))
            .route("/portal", post(handlers::portal::create_portal_session))
            .route("/webhooks/billing", post(handlers::webhooks::billing_webhook))
            .route("/debug/claim-success", post(handlers::debug::claim_success))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid bind address: {}", e)))?;

        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "HTTP server bound");

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        tracing::info!(port = self.port, "Listening");
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
