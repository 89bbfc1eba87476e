//! Shared domain types.

pub mod funnel;
pub mod price;
pub mod product_ref;

pub use funnel::{Funnel, FunnelDraft, InvalidDiscount, MAX_DISCOUNT_PCT};
pub use price::format_price;
pub use product_ref::{ProductGid, numeric_ids, parse_trailing_id};
