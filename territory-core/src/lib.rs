//! territory-core: shared infrastructure for the territory licensing services.
pub mod error;
pub mod observability;
pub mod token;

pub use axum;
pub use serde;
pub use serde_json;
pub use tracing;
pub use validator;
