//! Seed command for local testing.
//!
//! Creates an active funnel (and optionally an offline API credential) so
//! the match and sign endpoints have something to work with on a fresh
//! database.

use funnelkit_core::{FunnelDraft, ProductGid};
use funnelkit_server::db::{PgCredentialStore, PgFunnelStore, create_pool};

use super::{CommandError, database_url};

/// Create a funnel for `shop` triggered by `trigger` offering `offer`.
///
/// # Errors
///
/// Returns `CommandError::InvalidInput` if a product id cannot be
/// normalized, or a repository error if the insert fails (including a
/// conflict when the trigger already has an active funnel).
pub async fn run(
    shop: &str,
    trigger: &str,
    offer: &str,
    discount: i32,
    access_token: Option<&str>,
) -> Result<(), CommandError> {
    let trigger_product = ProductGid::normalize(trigger)
        .ok_or_else(|| CommandError::InvalidInput(format!("unparseable trigger id: {trigger}")))?;
    let offer_product = ProductGid::normalize(offer)
        .ok_or_else(|| CommandError::InvalidInput(format!("unparseable offer id: {offer}")))?;

    let database_url = database_url()?;
    let pool = create_pool(&database_url).await?;

    let funnels = PgFunnelStore::new(pool.clone());
    let funnel = funnels
        .create(&FunnelDraft {
            shop_domain: shop.to_string(),
            name: format!("Seeded funnel for {shop}"),
            discount_pct: discount,
            active: true,
            trigger_product,
            offer_product,
        })
        .await?;
    tracing::info!("Created funnel {}", funnel.id);

    if let Some(token) = access_token {
        let credentials = PgCredentialStore::new(pool);
        credentials.insert_offline(shop, token, None).await?;
        tracing::info!("Stored offline credential for {shop}");
    }

    Ok(())
}
