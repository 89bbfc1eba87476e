//! The funnel domain type.
//!
//! A funnel is a merchant-configured rule: when a buyer's completed purchase
//! contains the trigger product, the offer product is proposed post-purchase
//! at the configured discount. The funnel store enforces at most one active
//! funnel per (shop, trigger product) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::product_ref::ProductGid;

/// Upper bound on the configurable discount percentage.
pub const MAX_DISCOUNT_PCT: i32 = 90;

/// A merchant-configured upsell rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Funnel {
    pub id: Uuid,
    /// Owning shop domain; all mutations are scoped to it.
    pub shop_domain: String,
    pub name: String,
    /// Discount applied to the offer, 0-90. Zero when the merchant set none.
    pub discount_pct: i32,
    pub active: bool,
    pub trigger_product: ProductGid,
    pub offer_product: ProductGid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a funnel being created or fully replaced by a merchant edit.
#[derive(Debug, Clone)]
pub struct FunnelDraft {
    pub shop_domain: String,
    pub name: String,
    pub discount_pct: i32,
    pub active: bool,
    pub trigger_product: ProductGid,
    pub offer_product: ProductGid,
}

/// Discount percentage outside the 0-90 range.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("discount must be between 0 and {MAX_DISCOUNT_PCT} (got {0})")]
pub struct InvalidDiscount(pub i32);

impl FunnelDraft {
    /// Validate the draft's discount bounds.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDiscount`] when the percentage is negative or above
    /// [`MAX_DISCOUNT_PCT`].
    pub fn validate(&self) -> Result<(), InvalidDiscount> {
        if (0..=MAX_DISCOUNT_PCT).contains(&self.discount_pct) {
            Ok(())
        } else {
            Err(InvalidDiscount(self.discount_pct))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(discount_pct: i32) -> FunnelDraft {
        FunnelDraft {
            shop_domain: "demo.myshopify.com".to_string(),
            name: "Accessory upsell".to_string(),
            discount_pct,
            active: true,
            trigger_product: ProductGid::from_numeric(1),
            offer_product: ProductGid::from_numeric(2),
        }
    }

    #[test]
    fn test_discount_bounds() {
        assert!(draft(0).validate().is_ok());
        assert!(draft(20).validate().is_ok());
        assert!(draft(90).validate().is_ok());
        assert_eq!(draft(-1).validate(), Err(InvalidDiscount(-1)));
        assert_eq!(draft(91).validate(), Err(InvalidDiscount(91)));
    }
}
