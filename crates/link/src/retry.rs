use std::future::Future;

use ledgerlink_aggregator::ReauthSignal;
use ledgerlink_core::ItemRef;

use crate::broker::Relinker;
use crate::error::LinkError;

/// Runs `action`, and if it fails because the item's login expired, walks
/// the user through a relink and runs it exactly once more. The second
/// attempt's result is returned as is, even if it asks for reauth again.
pub async fn with_relink_on_auth_error<T, E, F, Fut>(
    relinker: &dyn Relinker,
    item: &ItemRef,
    port: u16,
    mut action: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ReauthSignal + From<LinkError>,
{
    match action().await {
        Err(e) if e.requires_reauth() => {
            tracing::warn!(%item, "Item login expired, relinking before retrying");
            relinker.relink(&item.id, port).await?;
            action().await
        }
        other => other,
    }
}
