pub mod billing;
pub mod database;
pub mod email;
pub mod lifecycle;
pub mod listings;
pub mod metrics;
pub mod pricing;
pub mod sync;

pub use billing::BillingClient;
pub use database::Database;
pub use email::Mailer;
pub use sync::MainAppSync;
