//! Database service for territory-service.

use crate::models::{
    Auction, ClaimedAuction, County, CountyStatus, CreateAuction, CreateSubscription,
    CreditReason, CreditTransaction, Offer, State, Subscription, SubscriptionStatus,
    TrialRegistration, TrialStatus, User, UserType,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, Utc};
use territory_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "territory-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // County Operations
    // =========================================================================

    /// List counties, optionally scoped to a state.
    #[instrument(skip(self))]
    pub async fn list_counties(&self, state_id: Option<Uuid>) -> Result<Vec<County>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_counties"])
            .start_timer();

        let counties = sqlx::query_as::<_, County>(
            r#"
            SELECT county_id, state_id, name, population, status, created_utc, updated_utc
            FROM counties
            WHERE ($1::uuid IS NULL OR state_id = $1)
            ORDER BY name
            "#,
        )
        .bind(state_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list counties: {}", e)))?;

        timer.observe_duration();

        Ok(counties)
    }

    /// Get a county by ID.
    #[instrument(skip(self), fields(county_id = %county_id))]
    pub async fn get_county(&self, county_id: Uuid) -> Result<Option<County>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_county"])
            .start_timer();

        let county = sqlx::query_as::<_, County>(
            r#"
            SELECT county_id, state_id, name, population, status, created_utc, updated_utc
            FROM counties
            WHERE county_id = $1
            "#,
        )
        .bind(county_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get county: {}", e)))?;

        timer.observe_duration();

        Ok(county)
    }

    /// List all states, ordered by name.
    #[instrument(skip(self))]
    pub async fn list_states(&self) -> Result<Vec<State>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_states"])
            .start_timer();

        let states = sqlx::query_as::<_, State>(
            r#"
            SELECT state_id, name, code
            FROM states
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list states: {}", e)))?;

        timer.observe_duration();

        Ok(states)
    }

    /// Get a state by ID.
    #[instrument(skip(self), fields(state_id = %state_id))]
    pub async fn get_state(&self, state_id: Uuid) -> Result<Option<State>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_state"])
            .start_timer();

        let state = sqlx::query_as::<_, State>(
            r#"
            SELECT state_id, name, code
            FROM states
            WHERE state_id = $1
            "#,
        )
        .bind(state_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get state: {}", e)))?;

        timer.observe_duration();

        Ok(state)
    }

    /// Write the cached county status column.
    ///
    /// Callers must not use this directly; `lifecycle::recompute_county_status`
    /// is the single writer.
    #[instrument(skip(self), fields(county_id = %county_id))]
    pub(crate) async fn write_county_status(
        &self,
        county_id: Uuid,
        status: CountyStatus,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["write_county_status"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE counties
            SET status = $2, updated_utc = now()
            WHERE county_id = $1
            "#,
        )
        .bind(county_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to write county status: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }

    /// Tier levels of all active subscriptions for a county.
    #[instrument(skip(self), fields(county_id = %county_id))]
    pub async fn active_subscription_tiers(&self, county_id: Uuid) -> Result<Vec<i16>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["active_subscription_tiers"])
            .start_timer();

        let tiers: Vec<i16> = sqlx::query_scalar(
            r#"
            SELECT o.tier_level
            FROM subscriptions s
            JOIN offers o ON s.offer_id = o.offer_id
            WHERE s.county_id = $1 AND s.status = 'active'
            "#,
        )
        .bind(county_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to query active tiers: {}", e))
        })?;

        timer.observe_duration();

        Ok(tiers)
    }

    // =========================================================================
    // Offer Operations
    // =========================================================================

    /// List active offers.
    #[instrument(skip(self))]
    pub async fn list_offers(&self) -> Result<Vec<Offer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_offers"])
            .start_timer();

        let offers = sqlx::query_as::<_, Offer>(
            r#"
            SELECT offer_id, name, tier_level, monthly_price, provider_product_id, provider_price_id, is_active, created_utc
            FROM offers
            WHERE is_active = TRUE
            ORDER BY tier_level
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list offers: {}", e)))?;

        timer.observe_duration();

        Ok(offers)
    }

    /// Get an offer by ID.
    #[instrument(skip(self), fields(offer_id = %offer_id))]
    pub async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_offer"])
            .start_timer();

        let offer = sqlx::query_as::<_, Offer>(
            r#"
            SELECT offer_id, name, tier_level, monthly_price, provider_product_id, provider_price_id, is_active, created_utc
            FROM offers
            WHERE offer_id = $1
            "#,
        )
        .bind(offer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get offer: {}", e)))?;

        timer.observe_duration();

        Ok(offer)
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    /// Get a user by ID.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, name, phone, credits, user_type, provider_customer_id, created_utc, updated_utc
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get user: {}", e)))?;

        timer.observe_duration();

        Ok(user)
    }

    /// Get a user by email.
    #[instrument(skip(self))]
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user_by_email"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, name, phone, credits, user_type, provider_customer_id, created_utc, updated_utc
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get user by email: {}", e)))?;

        timer.observe_duration();

        Ok(user)
    }

    /// Get a user by phone number.
    #[instrument(skip(self))]
    pub async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user_by_phone"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, name, phone, credits, user_type, provider_customer_id, created_utc, updated_utc
            FROM users
            WHERE phone = $1
            "#,
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get user by phone: {}", e)))?;

        timer.observe_duration();

        Ok(user)
    }

    /// Create a user account.
    #[instrument(skip(self))]
    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<User, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_user"])
            .start_timer();

        let user_id = Uuid::new_v4();
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, email, name, phone, user_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_id, email, name, phone, credits, user_type, provider_customer_id, created_utc, updated_utc
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(name)
        .bind(phone)
        .bind(UserType::Customer.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("A user with this email already exists"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create user: {}", e)),
        })?;

        timer.observe_duration();
        info!(user_id = %user.user_id, "User created");

        Ok(user)
    }

    /// Store the billing provider's customer id for a user.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn set_provider_customer_id(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_provider_customer_id"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE users
            SET provider_customer_id = $2, updated_utc = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to set provider customer id: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Create a new subscription (checkout completed).
    #[instrument(skip(self, input), fields(county_id = %input.county_id))]
    pub async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_subscription"])
            .start_timer();

        let subscription_id = Uuid::new_v4();
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (subscription_id, user_id, county_id, offer_id, status, start_date, provider_subscription_id, current_period_end)
            VALUES ($1, $2, $3, $4, $5, CURRENT_DATE, $6, $7)
            RETURNING subscription_id, user_id, county_id, offer_id, status, start_date, end_date, provider_subscription_id, current_period_end, created_utc, updated_utc
            "#,
        )
        .bind(subscription_id)
        .bind(input.user_id)
        .bind(input.county_id)
        .bind(input.offer_id)
        .bind(SubscriptionStatus::Active.as_str())
        .bind(&input.provider_subscription_id)
        .bind(input.current_period_end)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create subscription: {}", e)))?;

        timer.observe_duration();
        info!(subscription_id = %subscription.subscription_id, "Subscription created");

        Ok(subscription)
    }

    /// Get a subscription by the billing provider's subscription id.
    #[instrument(skip(self))]
    pub async fn get_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription_by_provider_id"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT subscription_id, user_id, county_id, offer_id, status, start_date, end_date, provider_subscription_id, current_period_end, created_utc, updated_utc
            FROM subscriptions
            WHERE provider_subscription_id = $1
            "#,
        )
        .bind(provider_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to get subscription by provider id: {}",
                e
            ))
        })?;

        timer.observe_duration();

        Ok(subscription)
    }

    /// Find an active subscription held by a user for a county.
    #[instrument(skip(self), fields(user_id = %user_id, county_id = %county_id))]
    pub async fn get_active_subscription_for_user_county(
        &self,
        user_id: Uuid,
        county_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_active_subscription_for_user_county"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT subscription_id, user_id, county_id, offer_id, status, start_date, end_date, provider_subscription_id, current_period_end, created_utc, updated_utc
            FROM subscriptions
            WHERE user_id = $1 AND county_id = $2 AND status = 'active'
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(county_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to query active subscription: {}", e))
        })?;

        timer.observe_duration();

        Ok(subscription)
    }

    /// Update subscription status.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn update_subscription_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_subscription_status"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET status = $2, end_date = CASE WHEN $2 = 'cancelled' THEN CURRENT_DATE ELSE end_date END, updated_utc = now()
            WHERE subscription_id = $1
            RETURNING subscription_id, user_id, county_id, offer_id, status, start_date, end_date, provider_subscription_id, current_period_end, created_utc, updated_utc
            "#,
        )
        .bind(subscription_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update subscription status: {}", e))
        })?;

        timer.observe_duration();

        Ok(subscription)
    }

    /// Extend a subscription's period after a paid invoice and mark it active.
    #[instrument(skip(self))]
    pub async fn renew_subscription(
        &self,
        provider_subscription_id: &str,
        period_end: DateTime<Utc>,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["renew_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET status = 'active', current_period_end = $2, end_date = NULL, updated_utc = now()
            WHERE provider_subscription_id = $1
            RETURNING subscription_id, user_id, county_id, offer_id, status, start_date, end_date, provider_subscription_id, current_period_end, created_utc, updated_utc
            "#,
        )
        .bind(provider_subscription_id)
        .bind(period_end)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to renew subscription: {}", e))
        })?;

        timer.observe_duration();

        Ok(subscription)
    }

    // =========================================================================
    // Trial Operations
    // =========================================================================

    /// Register a trial for a county. Fails with Conflict if one exists.
    #[instrument(skip(self), fields(county_id = %county_id))]
    pub async fn create_trial_registration(
        &self,
        county_id: Uuid,
        contact_name: &str,
        contact_email: &str,
        contact_phone: Option<&str>,
    ) -> Result<TrialRegistration, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_trial_registration"])
            .start_timer();

        let trial_id = Uuid::new_v4();
        let trial = sqlx::query_as::<_, TrialRegistration>(
            r#"
            INSERT INTO trial_registrations (trial_id, county_id, contact_name, contact_email, contact_phone, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING trial_id, county_id, contact_name, contact_email, contact_phone, status, created_utc
            "#,
        )
        .bind(trial_id)
        .bind(county_id)
        .bind(contact_name)
        .bind(contact_email)
        .bind(contact_phone)
        .bind(TrialStatus::Active.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "A trial has already been claimed for this county"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to register trial: {}", e)),
        })?;

        timer.observe_duration();
        info!(trial_id = %trial.trial_id, "Trial registered");

        Ok(trial)
    }

    /// Whether the county has an active trial on file.
    #[instrument(skip(self), fields(county_id = %county_id))]
    pub async fn has_active_trial(&self, county_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["has_active_trial"])
            .start_timer();

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM trial_registrations
                WHERE county_id = $1 AND status = 'active'
            )
            "#,
        )
        .bind(county_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to query trial: {}", e)))?;

        timer.observe_duration();

        Ok(exists)
    }

    // =========================================================================
    // Auction Operations
    // =========================================================================

    /// Fetch or create an auction row keyed by external id.
    /// First-write-wins: a concurrent insert loses silently and the existing
    /// row is returned.
    #[instrument(skip(self, input))]
    pub async fn find_or_create_auction(&self, input: &CreateAuction) -> Result<Auction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_or_create_auction"])
            .start_timer();

        let auction_id = Uuid::new_v4();
        let inserted = sqlx::query_as::<_, Auction>(
            r#"
            INSERT INTO auctions (auction_id, external_id, url, title, item_count, zip_code, is_free_claim)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (external_id) DO NOTHING
            RETURNING auction_id, external_id, url, title, item_count, zip_code, is_free_claim, created_utc
            "#,
        )
        .bind(auction_id)
        .bind(&input.external_id)
        .bind(&input.url)
        .bind(&input.title)
        .bind(input.item_count)
        .bind(&input.zip_code)
        .bind(input.is_free_claim)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create auction: {}", e)))?;

        let auction = match inserted {
            Some(a) => a,
            None => sqlx::query_as::<_, Auction>(
                r#"
                SELECT auction_id, external_id, url, title, item_count, zip_code, is_free_claim, created_utc
                FROM auctions
                WHERE external_id = $1
                "#,
            )
            .bind(&input.external_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch auction: {}", e)))?,
        };

        timer.observe_duration();

        Ok(auction)
    }

    /// Get an auction by ID.
    #[instrument(skip(self), fields(auction_id = %auction_id))]
    pub async fn get_auction(&self, auction_id: Uuid) -> Result<Option<Auction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_auction"])
            .start_timer();

        let auction = sqlx::query_as::<_, Auction>(
            r#"
            SELECT auction_id, external_id, url, title, item_count, zip_code, is_free_claim, created_utc
            FROM auctions
            WHERE auction_id = $1
            "#,
        )
        .bind(auction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get auction: {}", e)))?;

        timer.observe_duration();

        Ok(auction)
    }

    /// Claim exclusivity over an auction.
    ///
    /// The unique constraint on `claimed_auctions.auction_id` is the sole
    /// source of truth for "lost the race"; a violation maps to Conflict.
    #[instrument(skip(self), fields(auction_id = %auction_id, user_id = %user_id))]
    pub async fn create_claimed_auction(
        &self,
        auction_id: Uuid,
        user_id: Uuid,
    ) -> Result<ClaimedAuction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_claimed_auction"])
            .start_timer();

        let claim_id = Uuid::new_v4();
        let claim = sqlx::query_as::<_, ClaimedAuction>(
            r#"
            INSERT INTO claimed_auctions (claim_id, auction_id, user_id)
            VALUES ($1, $2, $3)
            RETURNING claim_id, auction_id, user_id, created_utc
            "#,
        )
        .bind(claim_id)
        .bind(auction_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("This auction has already been claimed"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to claim auction: {}", e)),
        })?;

        timer.observe_duration();
        info!(claim_id = %claim.claim_id, "Auction claimed");

        Ok(claim)
    }

    /// Get the claim for an auction, if any.
    #[instrument(skip(self), fields(auction_id = %auction_id))]
    pub async fn get_claim_for_auction(
        &self,
        auction_id: Uuid,
    ) -> Result<Option<ClaimedAuction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_claim_for_auction"])
            .start_timer();

        let claim = sqlx::query_as::<_, ClaimedAuction>(
            r#"
            SELECT claim_id, auction_id, user_id, created_utc
            FROM claimed_auctions
            WHERE auction_id = $1
            "#,
        )
        .bind(auction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get claim: {}", e)))?;

        timer.observe_duration();

        Ok(claim)
    }

    // =========================================================================
    // Credit Operations
    // =========================================================================

    /// Append a credit grant and bump the user's balance in one transaction.
    ///
    /// When `provider_event_id` is set, the insert is idempotent on that key:
    /// a redelivered webhook inserts nothing and the balance is untouched.
    /// Returns the ledger row, or None if the grant was a duplicate.
    #[instrument(skip(self), fields(user_id = %user_id, reason = reason.as_str()))]
    pub async fn grant_credits(
        &self,
        user_id: Uuid,
        amount: i64,
        reason: CreditReason,
        auction_id: Option<Uuid>,
        provider_event_id: Option<&str>,
    ) -> Result<Option<CreditTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["grant_credits"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let transaction_id = Uuid::new_v4();
        let row = sqlx::query_as::<_, CreditTransaction>(
            r#"
            INSERT INTO credit_transactions (transaction_id, user_id, amount, reason, auction_id, provider_event_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider_event_id) DO NOTHING
            RETURNING transaction_id, user_id, amount, reason, auction_id, provider_event_id, created_utc
            "#,
        )
        .bind(transaction_id)
        .bind(user_id)
        .bind(amount)
        .bind(reason.as_str())
        .bind(auction_id)
        .bind(provider_event_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to append credit: {}", e)))?;

        if row.is_some() {
            sqlx::query(
                r#"
                UPDATE users
                SET credits = credits + $2, updated_utc = now()
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .bind(amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update balance: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit credit grant: {}", e))
        })?;

        timer.observe_duration();

        if let Some(ref t) = row {
            info!(transaction_id = %t.transaction_id, amount = amount, "Credits granted");
        }

        Ok(row)
    }

    /// Current credit balance for a user.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_credit_balance(&self, user_id: Uuid) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_credit_balance"])
            .start_timer();

        let balance: i64 = sqlx::query_scalar(
            r#"
            SELECT credits FROM users WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get balance: {}", e)))?;

        timer.observe_duration();

        Ok(balance)
    }
}
