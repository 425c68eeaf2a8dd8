//! `null_resource`: a resource that only exists in state
//!
//! Useful for wiring and for forcing re-creation: any change to the
//! `triggers` attribute replaces the resource.

use async_trait::async_trait;
use chrono::Utc;
use skyflow_core::Attributes;
use skyflow_engine::{Created, ProviderContext, ProviderResult, ResourceProvider};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub const KIND: &str = "null_resource";

#[derive(Debug, Default)]
pub struct NullResourceProvider {
    counter: AtomicU64,
}

impl NullResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, ctx: &ProviderContext) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ctx.address.to_string().as_bytes());
        hasher.update(&Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(&self.counter.fetch_add(1, Ordering::SeqCst).to_le_bytes());
        hasher.finalize().to_hex()[..16].to_string()
    }
}

#[async_trait]
impl ResourceProvider for NullResourceProvider {
    fn name(&self) -> &str {
        KIND
    }

    async fn create(&self, ctx: &ProviderContext, _attributes: &Attributes) -> ProviderResult<Created> {
        let id = self.next_id(ctx);
        debug!(address = %ctx.address, id = %id, "Created null resource");
        Ok(Created::new(id, Attributes::new()))
    }

    async fn read(&self, _ctx: &ProviderContext, _id: &str) -> ProviderResult<Option<Attributes>> {
        Ok(Some(Attributes::new()))
    }

    async fn update(
        &self,
        _ctx: &ProviderContext,
        _id: &str,
        _old: &Attributes,
        _new: &Attributes,
    ) -> ProviderResult<Attributes> {
        Ok(Attributes::new())
    }

    async fn destroy(&self, _ctx: &ProviderContext, _id: &str) -> ProviderResult<()> {
        Ok(())
    }

    fn requires_replacement(&self, _ctx: &ProviderContext, old: &Attributes, new: &Attributes) -> bool {
        old.get("triggers") != new.get("triggers")
    }
}
