//! Shared helpers for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use skyflow_core::{Attributes, ResourceAddress};
use skyflow_engine::{
    CancelToken, Created, ProviderContext, ProviderError, ProviderRegistry, ProviderResult,
    ResourceProvider, RetryConfig,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provider whose behaviour is scripted per address.
#[derive(Default)]
pub struct ScriptedProvider {
    fail: HashSet<String>,
    panic: HashSet<String>,
    transient: Mutex<HashMap<String, u32>>,
    delay: Duration,
    cancel_after: Option<(String, CancelToken)>,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
    existing: Mutex<HashSet<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call for `address` fails permanently.
    pub fn failing(mut self, address: &str) -> Self {
        self.fail.insert(address.to_string());
        self
    }

    /// Every call for `address` panics.
    pub fn panicking(mut self, address: &str) -> Self {
        self.panic.insert(address.to_string());
        self
    }

    /// The first `times` calls for `address` fail transiently.
    pub fn flaky(self, address: &str, times: u32) -> Self {
        if let Ok(mut transient) = self.transient.lock() {
            transient.insert(address.to_string(), times);
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Cancel `token` while `address` is being created.
    pub fn cancel_during(mut self, address: &str, token: CancelToken) -> Self {
        self.cancel_after = Some((address.to_string(), token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, verb: &str, address: &ResourceAddress) -> ProviderResult<()> {
        if self.panic.contains(&address.to_string()) {
            panic!("{} {} blew up", verb, address);
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", verb, address));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let key = address.to_string();
        if let Some((target, token)) = &self.cancel_after {
            if *target == key {
                token.cancel();
            }
        }
        if self.fail.contains(&key) {
            return Err(ProviderError::Failed(format!("{} rejected by upstream API", key)));
        }
        let mut transient = self.transient.lock().unwrap();
        if let Some(remaining) = transient.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ProviderError::Transient("rate limited".into()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create(&self, ctx: &ProviderContext, attributes: &Attributes) -> ProviderResult<Created> {
        self.enter("create", &ctx.address).await?;
        let id = format!("{}-{}", ctx.address.name(), self.next_id.fetch_add(1, Ordering::SeqCst));
        self.existing.lock().unwrap().insert(id.clone());

        let mut outputs = attributes.clone();
        outputs.insert("arn".into(), json!(format!("arn:{}:{}", ctx.kind(), id)));
        Ok(Created::new(id, outputs))
    }

    async fn read(&self, _ctx: &ProviderContext, id: &str) -> ProviderResult<Option<Attributes>> {
        Ok(self
            .existing
            .lock()
            .unwrap()
            .contains(id)
            .then(Attributes::new))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _old: &Attributes,
        new: &Attributes,
    ) -> ProviderResult<Attributes> {
        self.enter("update", &ctx.address).await?;
        let mut outputs = new.clone();
        outputs.insert("arn".into(), json!(format!("arn:{}:{}", ctx.kind(), id)));
        Ok(outputs)
    }

    async fn destroy(&self, ctx: &ProviderContext, id: &str) -> ProviderResult<()> {
        self.enter("destroy", &ctx.address).await?;
        if self.existing.lock().unwrap().remove(id) {
            Ok(())
        } else {
            Err(ProviderError::NotFound(id.to_string()))
        }
    }

    fn requires_replacement(&self, _ctx: &ProviderContext, old: &Attributes, new: &Attributes) -> bool {
        old.get("cidr_block") != new.get("cidr_block")
    }
}

pub fn registry(provider: Arc<ScriptedProvider>, kinds: &[&str]) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for kind in kinds {
        registry.register(*kind, provider.clone());
    }
    registry
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        backoff_multiplier: 2.0,
    }
}

pub fn addr(s: &str) -> ResourceAddress {
    ResourceAddress::parse(s).unwrap()
}
