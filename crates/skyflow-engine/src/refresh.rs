//! Refresh recorded state from the providers

use crate::error::Result;
use crate::provider::{ProviderContext, ProviderRegistry, RetryConfig};
use crate::state::StateStore;
use chrono::Utc;
use serde::Serialize;
use skyflow_core::ResourceAddress;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshFailure {
    pub address: ResourceAddress,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    /// Records whose outputs changed
    pub updated: Vec<ResourceAddress>,
    pub unchanged: Vec<ResourceAddress>,
    /// Records dropped because the resource no longer exists
    pub removed: Vec<ResourceAddress>,
    pub failed: Vec<RefreshFailure>,
}

/// Read every recorded resource back from its provider.
///
/// Resources the provider no longer knows are removed from state, so the
/// next plan creates them again. Inputs and fingerprints are left alone.
#[instrument(skip_all)]
pub async fn refresh(
    store: &dyn StateStore,
    providers: &ProviderRegistry,
    retry: &RetryConfig,
) -> Result<RefreshReport> {
    let snapshot = store.snapshot().await?;
    let mut report = RefreshReport::default();

    for (address, state) in snapshot.iter() {
        let provider = providers.get(&state.resource_type)?;
        let ctx = ProviderContext::new(address.clone());

        let (result, _) = retry
            .run("read", || provider.read(&ctx, &state.id))
            .await;

        match result {
            Ok(None) => {
                info!(address = %address, "Resource no longer exists, removing from state");
                store.delete(address).await?;
                report.removed.push(address.clone());
            }
            Err(e) if e.is_not_found() => {
                info!(address = %address, "Resource no longer exists, removing from state");
                store.delete(address).await?;
                report.removed.push(address.clone());
            }
            Ok(Some(outputs)) if outputs == state.outputs => {
                report.unchanged.push(address.clone());
            }
            Ok(Some(outputs)) => {
                let mut refreshed = state.clone().with_outputs(outputs);
                refreshed.updated_at = Utc::now();
                store.put(address, refreshed).await?;
                report.updated.push(address.clone());
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Refresh failed");
                report.failed.push(RefreshFailure {
                    address: address.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
