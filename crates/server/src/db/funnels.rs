//! Funnel repository for database operations.
//!
//! The read side is behind the [`FunnelStore`] trait so the offer resolver
//! can run against an injected fake in tests. The write side (merchant CRUD,
//! owned by the admin surface) lives as inherent methods on
//! [`PgFunnelStore`]; every mutation is scoped to the owning shop so a
//! cross-shop update or delete is impossible by construction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use funnelkit_core::{Funnel, FunnelDraft, ProductGid};

use super::RepositoryError;

/// Read access to the funnel store, as seen by the offer resolver.
#[async_trait]
pub trait FunnelStore: Send + Sync {
    /// All active funnels owned by the shop, most recently updated first.
    async fn active_funnels(&self, shop: &str) -> Result<Vec<Funnel>, RepositoryError>;
}

/// `PostgreSQL`-backed funnel repository.
#[derive(Clone)]
pub struct PgFunnelStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct FunnelRow {
    id: Uuid,
    shop_domain: String,
    name: String,
    discount_pct: Option<i32>,
    active: bool,
    trigger_product_gid: String,
    offer_product_gid: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FunnelRow> for Funnel {
    type Error = RepositoryError;

    fn try_from(row: FunnelRow) -> Result<Self, Self::Error> {
        // Trigger/offer columns have historically held bare integer ids as
        // well as full gids; normalize on read so matching is by canonical id.
        let trigger_product = ProductGid::normalize(&row.trigger_product_gid).ok_or_else(|| {
            RepositoryError::DataCorruption(format!(
                "unparseable trigger product id: {}",
                row.trigger_product_gid
            ))
        })?;
        let offer_product = ProductGid::normalize(&row.offer_product_gid).ok_or_else(|| {
            RepositoryError::DataCorruption(format!(
                "unparseable offer product id: {}",
                row.offer_product_gid
            ))
        })?;

        Ok(Self {
            id: row.id,
            shop_domain: row.shop_domain,
            name: row.name,
            discount_pct: row.discount_pct.unwrap_or(0),
            active: row.active,
            trigger_product,
            offer_product,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const FUNNEL_COLUMNS: &str = "id, shop_domain, name, discount_pct, active, \
     trigger_product_gid, offer_product_gid, created_at, updated_at";

impl PgFunnelStore {
    /// Create a new funnel repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a funnel.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` if the discount is out of range.
    /// Returns `RepositoryError::Conflict` if the trigger product already has
    /// an active funnel in this shop.
    pub async fn create(&self, draft: &FunnelDraft) -> Result<Funnel, RepositoryError> {
        draft
            .validate()
            .map_err(|e| RepositoryError::Validation(e.to_string()))?;

        let row = sqlx::query_as::<_, FunnelRow>(&format!(
            "INSERT INTO funnel \
                 (shop_domain, name, discount_pct, active, trigger_product_gid, offer_product_gid) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {FUNNEL_COLUMNS}"
        ))
        .bind(&draft.shop_domain)
        .bind(&draft.name)
        .bind(draft.discount_pct)
        .bind(draft.active)
        .bind(draft.trigger_product.as_str())
        .bind(draft.offer_product.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_trigger_conflict)?;

        row.try_into()
    }

    /// Get a funnel by id, scoped to the owning shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, shop: &str, id: Uuid) -> Result<Option<Funnel>, RepositoryError> {
        let row = sqlx::query_as::<_, FunnelRow>(&format!(
            "SELECT {FUNNEL_COLUMNS} FROM funnel WHERE id = $1 AND shop_domain = $2"
        ))
        .bind(id)
        .bind(shop)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// All funnels owned by the shop, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_shop(&self, shop: &str) -> Result<Vec<Funnel>, RepositoryError> {
        let rows = sqlx::query_as::<_, FunnelRow>(&format!(
            "SELECT {FUNNEL_COLUMNS} FROM funnel \
             WHERE shop_domain = $1 ORDER BY updated_at DESC"
        ))
        .bind(shop)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Fully replace a funnel's merchant-editable fields (name, discount,
    /// active flag, trigger and offer products).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the funnel does not exist in
    /// this shop. Returns `RepositoryError::Conflict` on a trigger collision.
    pub async fn update(
        &self,
        shop: &str,
        id: Uuid,
        draft: &FunnelDraft,
    ) -> Result<Funnel, RepositoryError> {
        draft
            .validate()
            .map_err(|e| RepositoryError::Validation(e.to_string()))?;

        let row = sqlx::query_as::<_, FunnelRow>(&format!(
            "UPDATE funnel \
             SET name = $3, discount_pct = $4, active = $5, \
                 trigger_product_gid = $6, offer_product_gid = $7, updated_at = now() \
             WHERE id = $1 AND shop_domain = $2 \
             RETURNING {FUNNEL_COLUMNS}"
        ))
        .bind(id)
        .bind(shop)
        .bind(&draft.name)
        .bind(draft.discount_pct)
        .bind(draft.active)
        .bind(draft.trigger_product.as_str())
        .bind(draft.offer_product.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_trigger_conflict)?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Delete a funnel, scoped to the owning shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the funnel does not exist in
    /// this shop (including when it exists in another shop).
    pub async fn delete(&self, shop: &str, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM funnel WHERE id = $1 AND shop_domain = $2")
            .bind(id)
            .bind(shop)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl FunnelStore for PgFunnelStore {
    async fn active_funnels(&self, shop: &str) -> Result<Vec<Funnel>, RepositoryError> {
        let rows = sqlx::query_as::<_, FunnelRow>(&format!(
            "SELECT {FUNNEL_COLUMNS} FROM funnel \
             WHERE shop_domain = $1 AND active ORDER BY updated_at DESC"
        ))
        .bind(shop)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// Map a unique-index violation on the trigger product to a recoverable,
/// user-reportable conflict.
fn map_trigger_conflict(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict(
                "this trigger product already has an active funnel".to_owned(),
            );
        }
    }
    RepositoryError::Database(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(trigger: &str, offer: &str) -> FunnelRow {
        FunnelRow {
            id: Uuid::new_v4(),
            shop_domain: "demo.myshopify.com".to_string(),
            name: "Accessory upsell".to_string(),
            discount_pct: None,
            active: true,
            trigger_product_gid: trigger.to_string(),
            offer_product_gid: offer.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion_normalizes_bare_ids() {
        let funnel: Funnel = row("111", "gid://shopify/Product/222")
            .try_into()
            .expect("row converts");
        assert_eq!(funnel.trigger_product.as_str(), "gid://shopify/Product/111");
        assert_eq!(funnel.offer_product.as_str(), "gid://shopify/Product/222");
    }

    #[test]
    fn test_row_conversion_defaults_discount_to_zero() {
        let funnel: Funnel = row("1", "2").try_into().expect("row converts");
        assert_eq!(funnel.discount_pct, 0);
    }

    #[test]
    fn test_row_conversion_rejects_garbage_ids() {
        let result: Result<Funnel, _> = row("not-an-id", "2").try_into();
        assert!(matches!(result, Err(RepositoryError::DataCorruption(_))));
    }
}
