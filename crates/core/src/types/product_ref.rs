//! Canonical product identifiers.
//!
//! Buyer-side line items reference products inconsistently: full global ids
//! (`gid://shopify/Product/123`), bare integers, or strings with an embedded
//! integer. [`ProductGid`] normalizes all of them into the global-id form so
//! the rest of the pipeline can compare ids by plain equality.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of a canonical product global id.
pub const PRODUCT_GID_PREFIX: &str = "gid://shopify/Product/";

/// A normalized, namespace-qualified product reference.
///
/// Always of the form `gid://<namespace>/Product/<integer>`. Equality is by
/// the normalized string. Derived on demand from arbitrary input; never
/// stored independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductGid(String);

impl ProductGid {
    /// Normalize an arbitrary product reference.
    ///
    /// An already-canonical `gid://` string is passed through unchanged. Any
    /// other string is searched for its first digit run, which is wrapped
    /// into canonical form. Returns `None` when no integer can be extracted;
    /// never panics.
    #[must_use]
    pub fn normalize(value: &str) -> Option<Self> {
        let s = value.trim();
        if s.is_empty() {
            return None;
        }
        if s.starts_with("gid://") {
            return Some(Self(s.to_owned()));
        }
        first_digit_run(s).map(|digits| Self(format!("{PRODUCT_GID_PREFIX}{digits}")))
    }

    /// Normalize a JSON value (string or number) as sent by extension
    /// clients that are not consistent about id shapes.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::normalize(s),
            serde_json::Value::Number(n) => n.as_u64().map(Self::from_numeric),
            _ => None,
        }
    }

    /// Canonical id for a bare numeric product id.
    #[must_use]
    pub fn from_numeric(id: u64) -> Self {
        Self(format!("{PRODUCT_GID_PREFIX}{id}"))
    }

    /// Trailing integer of the id, if any.
    ///
    /// Legacy listing endpoints take bare integer ids; ids without a trailing
    /// integer simply have none to give.
    #[must_use]
    pub fn numeric_id(&self) -> Option<u64> {
        parse_trailing_id(&self.0)
    }

    /// The canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalize a sequence of references, dropping unparseable entries and
    /// deduplicating while preserving first-seen order.
    pub fn normalize_all<I, S>(values: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for value in values {
            if let Some(gid) = Self::normalize(value.as_ref()) {
                if seen.insert(gid.clone()) {
                    out.push(gid);
                }
            }
        }
        out
    }
}

impl fmt::Display for ProductGid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ProductGid> for String {
    fn from(gid: ProductGid) -> Self {
        gid.0
    }
}

/// Bare numeric ids for the ids that carry one; the rest are dropped.
#[must_use]
pub fn numeric_ids(gids: &[ProductGid]) -> Vec<u64> {
    gids.iter().filter_map(ProductGid::numeric_id).collect()
}

/// Parse the trailing digit run of a string as an integer.
///
/// Used for variant references as well as product ids:
/// `gid://shopify/ProductVariant/555` parses to `555`.
#[must_use]
pub fn parse_trailing_id(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    let tail: String = trimmed
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if tail.is_empty() {
        return None;
    }
    tail.parse().ok()
}

fn first_digit_run(s: &str) -> Option<&str> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}
