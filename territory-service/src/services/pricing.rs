//! Price quoting: auction claim pricing and county population tiers.

use crate::models::{TIER_BASIC, TIER_PLUS, TIER_PRO};
use rust_decimal::Decimal;

/// Base price for a paid auction claim, covering up to 100 items.
const CLAIM_BASE_CENTS: i64 = 2995;
/// Per-item surcharge beyond the first 100 items.
const CLAIM_PER_ITEM_CENTS: i64 = 10;
/// Items included in the base price.
const CLAIM_INCLUDED_ITEMS: i32 = 100;

/// Counties below this population quote at the Basic (Rural) tier.
const SUBURBAN_POPULATION_FLOOR: i64 = 50_000;
/// Counties at or above this population quote at the Pro (Urban) tier.
const URBAN_POPULATION_FLOOR: i64 = 200_000;

/// Quote for claiming an auction: $29.95 base for up to 100 items, plus
/// $0.10 per item beyond 100, to 2 decimal places.
///
/// This is the single pricing function; the quote endpoint and the checkout
/// amount both go through it. A missing or zero item count floors at the
/// base price.
pub fn claim_quote(item_count: Option<i32>) -> Decimal {
    Decimal::new(claim_quote_cents(item_count), 2)
}

/// Same quote expressed in the smallest currency unit, as the billing
/// provider expects for one-time payments.
pub fn claim_quote_cents(item_count: Option<i32>) -> i64 {
    let extra_items = item_count
        .unwrap_or(0)
        .saturating_sub(CLAIM_INCLUDED_ITEMS)
        .max(0) as i64;
    CLAIM_BASE_CENTS + extra_items * CLAIM_PER_ITEM_CENTS
}

/// Map a county's population onto the offer tier it quotes at.
pub fn population_tier(population: i64) -> i16 {
    if population >= URBAN_POPULATION_FLOOR {
        TIER_PRO
    } else if population >= SUBURBAN_POPULATION_FLOOR {
        TIER_PLUS
    } else {
        TIER_BASIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn base_price_covers_one_hundred_items() {
        assert_eq!(claim_quote(Some(100)), Decimal::from_str("29.95").unwrap());
    }

    #[test]
    fn surcharge_applies_beyond_one_hundred() {
        // 29.95 + 50 * 0.10
        assert_eq!(claim_quote(Some(150)), Decimal::from_str("34.95").unwrap());
    }

    #[test]
    fn zero_and_missing_floor_at_base() {
        assert_eq!(claim_quote(Some(0)), Decimal::from_str("29.95").unwrap());
        assert_eq!(claim_quote(None), Decimal::from_str("29.95").unwrap());
    }

    #[test]
    fn quote_cents_matches_quote() {
        assert_eq!(claim_quote_cents(Some(100)), 2995);
        assert_eq!(claim_quote_cents(Some(150)), 3495);
        assert_eq!(claim_quote_cents(None), 2995);
    }

    #[test]
    fn population_tiers() {
        assert_eq!(population_tier(10_000), TIER_BASIC);
        assert_eq!(population_tier(50_000), TIER_PLUS);
        assert_eq!(population_tier(199_999), TIER_PLUS);
        assert_eq!(population_tier(1_000_000), TIER_PRO);
    }
}
