//! Resource provider trait and registry
//!
//! Every resource kind (`aws_vpc`, `heroku_app`, `local_file`, ...) is
//! served by a [`ResourceProvider`]. The engine looks providers up by kind
//! through a [`ProviderRegistry`] and never knows what a provider talks to.

use crate::error::{EngineError, ProviderError, ProviderResult, Result};
use async_trait::async_trait;
use skyflow_core::{Attributes, ResourceAddress};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Context passed to every provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderContext {
    pub address: ResourceAddress,
}

impl ProviderContext {
    pub fn new(address: ResourceAddress) -> Self {
        Self { address }
    }

    pub fn kind(&self) -> &str {
        self.address.kind()
    }
}

/// Result of a successful create
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    /// Provider-assigned identifier
    pub id: String,

    /// Attributes computed by the provider (ARNs, endpoints, ...)
    pub outputs: Attributes,
}

impl Created {
    pub fn new(id: impl Into<String>, outputs: Attributes) -> Self {
        Self {
            id: id.into(),
            outputs,
        }
    }
}

/// Resource provider abstraction trait
///
/// Implementations must be safe to call concurrently for different
/// resources of the same kind.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Returns the provider name used in logs
    fn name(&self) -> &str;

    /// Create the resource, returning its identifier and outputs
    async fn create(&self, ctx: &ProviderContext, attributes: &Attributes)
    -> ProviderResult<Created>;

    /// Read the current outputs; `None` when the resource no longer exists
    async fn read(&self, ctx: &ProviderContext, id: &str) -> ProviderResult<Option<Attributes>>;

    /// Update the resource in place, returning its new outputs
    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        old: &Attributes,
        new: &Attributes,
    ) -> ProviderResult<Attributes>;

    /// Destroy the resource. `NotFound` means it is already gone.
    async fn destroy(&self, ctx: &ProviderContext, id: &str) -> ProviderResult<()>;

    /// Whether changing `old` into `new` needs destroy + create.
    ///
    /// Values not known until apply are passed as
    /// [`skyflow_core::UNKNOWN_VALUE`].
    fn requires_replacement(
        &self,
        _ctx: &ProviderContext,
        _old: &Attributes,
        _new: &Attributes,
    ) -> bool {
        false
    }
}

/// Registry mapping resource kinds to providers
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ResourceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `kind`, replacing any previous entry.
    pub fn register(&mut self, kind: impl Into<String>, provider: Arc<dyn ResourceProvider>) {
        self.providers.insert(kind.into(), provider);
    }

    pub fn with(mut self, kind: impl Into<String>, provider: Arc<dyn ResourceProvider>) -> Self {
        self.register(kind, provider);
        self
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn ResourceProvider>> {
        self.providers
            .get(kind)
            .cloned()
            .ok_or_else(|| EngineError::ProviderNotFound(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.providers.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, given `attempt` already failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Run `op`, retrying transient errors with exponential backoff.
    ///
    /// Returns the final result together with the number of attempts made.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> (ProviderResult<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(ProviderError::Transient(message)) if attempt < max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return (result, attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = &AtomicU32::new(0);
        let (result, attempts) = fast()
            .run("create", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::Transient("throttled".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let (result, attempts) = fast()
            .run("create", || async {
                Err::<(), _>(ProviderError::Transient("throttled".into()))
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Transient(_))));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let calls = &AtomicU32::new(0);
        let (result, attempts) = fast()
            .run("update", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ProviderError::InvalidConfig("bad runtime".into()))
            })
            .await;

        assert!(matches!(result, Err(ProviderError::InvalidConfig(_))));
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.get("aws_vpc"),
            Err(EngineError::ProviderNotFound(kind)) if kind == "aws_vpc"
        ));
    }
}
