//! In-memory provider for unit tests

use crate::error::ProviderResult;
use crate::provider::{Created, ProviderContext, ResourceProvider};
use async_trait::async_trait;
use serde_json::json;
use skyflow_core::Attributes;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Echoes inputs back as outputs and adds an `arn`.
#[derive(Debug, Default)]
pub struct MockProvider {
    replace_on: Vec<String>,
    next_id: AtomicU64,
    pub calls: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Changing `attribute` forces replacement.
    pub fn replace_on(mut self, attribute: &str) -> Self {
        self.replace_on.push(attribute.to_string());
        self
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl ResourceProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create(&self, ctx: &ProviderContext, attributes: &Attributes) -> ProviderResult<Created> {
        self.record(format!("create {}", ctx.address));
        let id = format!("{}-{}", ctx.kind(), self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut outputs = attributes.clone();
        outputs.insert("arn".into(), json!(format!("arn:{}", id)));
        Ok(Created::new(id, outputs))
    }

    async fn read(&self, _ctx: &ProviderContext, _id: &str) -> ProviderResult<Option<Attributes>> {
        Ok(None)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _old: &Attributes,
        new: &Attributes,
    ) -> ProviderResult<Attributes> {
        self.record(format!("update {}", ctx.address));
        let mut outputs = new.clone();
        outputs.insert("arn".into(), json!(format!("arn:{}", id)));
        Ok(outputs)
    }

    async fn destroy(&self, ctx: &ProviderContext, _id: &str) -> ProviderResult<()> {
        self.record(format!("destroy {}", ctx.address));
        Ok(())
    }

    fn requires_replacement(&self, _ctx: &ProviderContext, old: &Attributes, new: &Attributes) -> bool {
        self.replace_on
            .iter()
            .any(|attribute| old.get(attribute) != new.get(attribute))
    }
}
