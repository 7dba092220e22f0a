//! Tiered bundle pricing.
//!
//! The total depends only on how many not-yet-owned products are in the
//! selection; individual catalog prices do not take part.

use std::collections::HashSet;
use thiserror::Error;

use crate::gateway::MIN_TRANSACTABLE_AMOUNT;

pub const UNIT_PRICE: i64 = 2900;
pub const MID_TIER_BASE: i64 = 6900;
pub const MID_TIER_STEP: i64 = 2200;
pub const BULK_TIER_BASE: i64 = 9900;
pub const BULK_TIER_STEP: i64 = 1900;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("no products selected")]
    EmptySelection,
    #[error("all selected products were already purchased")]
    AllItemsAlreadyPurchased,
    #[error("amount {0} is below the minimum transactable amount")]
    InvalidAmount(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedItem {
    pub product_id: String,
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub items: Vec<PricedItem>,
    pub total: i64,
}

impl Quote {
    pub fn product_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.product_id.clone()).collect()
    }
}

/// Bundle total for `n` products.
///
/// | n      | total                    |
/// |--------|--------------------------|
/// | 1..=2  | n × 2900                 |
/// | 3..=4  | 6900 + (n − 3) × 2200    |
/// | 5..    | 9900 + (n − 5) × 1900    |
pub fn tier_total(n: usize) -> i64 {
    let n = n as i64;
    match n {
        0..=2 => n * UNIT_PRICE,
        3..=4 => MID_TIER_BASE + (n - 3) * MID_TIER_STEP,
        _ => BULK_TIER_BASE + (n - 5) * BULK_TIER_STEP,
    }
}

/// Splits `total` across `n` line items: each gets `floor(total / n)` and the
/// first `total % n` items get one extra unit, so the parts sum to `total`.
pub fn allocate(total: i64, n: usize) -> Vec<i64> {
    if n == 0 {
        return Vec::new();
    }
    let count = n as i64;
    let base = total / count;
    let remainder = (total % count) as usize;
    (0..n)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Prices the candidates the customer does not own yet. Duplicates are
/// ignored and the first-seen order is kept.
pub fn quote(candidates: &[String], purchased: &HashSet<String>) -> Result<Quote, PricingError> {
    if candidates.is_empty() {
        return Err(PricingError::EmptySelection);
    }

    let mut seen = HashSet::new();
    let remaining: Vec<&String> = candidates
        .iter()
        .filter(|id| !purchased.contains(*id))
        .filter(|id| seen.insert(id.as_str()))
        .collect();

    if remaining.is_empty() {
        return Err(PricingError::AllItemsAlreadyPurchased);
    }

    let count = remaining.len();
    let total = tier_total(count);
    if total < MIN_TRANSACTABLE_AMOUNT {
        return Err(PricingError::InvalidAmount(total));
    }

    let items = remaining
        .into_iter()
        .zip(allocate(total, count))
        .map(|(id, price)| PricedItem {
            product_id: id.clone(),
            price,
        })
        .collect();

    Ok(Quote { items, total })
}
