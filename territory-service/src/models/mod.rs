//! Domain models for territory-service.

mod auction;
mod county;
mod credit;
mod offer;
mod subscription;
mod trial;
mod user;

pub use auction::{Auction, ClaimedAuction, CreateAuction};
pub use county::{County, CountyStatus, State};
pub use credit::{CreditReason, CreditTransaction};
pub use offer::{Offer, TIER_BASIC, TIER_PLUS, TIER_PRO};
pub use subscription::{CreateSubscription, Subscription, SubscriptionStatus};
pub use trial::{TrialRegistration, TrialStatus};
pub use user::{User, UserType};
