//! Executor
//!
//! Applies a [`Plan`] against the providers. Steps run on tokio as soon as
//! every step they depend on has committed its state, bounded by
//! `parallelism`. A failed step skips its transitive dependents and leaves
//! independent steps running.

use crate::action::{Action, AppliedStep, ApplyError, ApplyReport, Plan, PlanStep, SkippedStep};
use crate::cancel::CancelToken;
use crate::error::{EngineError, ProviderError, Result};
use crate::provider::{ProviderContext, ProviderRegistry, ResourceProvider, RetryConfig};
use crate::state::{ResourceState, ResourceStatus, StateSnapshot, StateStore};
use chrono::Utc;
use futures_util::FutureExt;
use skyflow_core::{Attributes, Lookup, ModelError, ResourceAddress, fingerprint};
use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// States produced in this run; `None` marks a record removed in this run.
type Produced = Arc<RwLock<HashMap<ResourceAddress, Option<ResourceState>>>>;

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Maximum number of steps in flight
    pub parallelism: usize,

    pub retry: RetryConfig,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            parallelism: 4,
            retry: RetryConfig::default(),
        }
    }
}

pub struct Executor {
    providers: Arc<ProviderRegistry>,
    store: Arc<dyn StateStore>,
    options: ExecuteOptions,
    cancel: CancelToken,
}

impl Executor {
    pub fn new(providers: ProviderRegistry, store: Arc<dyn StateStore>) -> Self {
        Self {
            providers: Arc::new(providers),
            store,
            options: ExecuteOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Apply `plan`. Step failures are reported, not returned; `Err` means
    /// the run could not start.
    #[instrument(skip_all, fields(steps = plan.len(), parallelism = self.options.parallelism))]
    pub async fn execute(&self, plan: &Plan) -> Result<ApplyReport> {
        let started = Instant::now();
        let baseline = Arc::new(self.store.snapshot().await?);
        let produced: Produced = Arc::new(RwLock::new(HashMap::new()));

        let mut schedule = Schedule::new(plan);
        let mut report = ApplyReport::new();
        let mut tasks: JoinSet<(usize, StepResult)> = JoinSet::new();
        let limit = self.options.parallelism.max(1);
        let mut running: HashMap<tokio::task::Id, usize> = HashMap::new();

        loop {
            while tasks.len() < limit {
                if self.cancel.is_cancelled() {
                    if !report.cancelled {
                        warn!("Cancellation requested, no new steps will start");
                    }
                    report.cancelled = true;
                    break;
                }
                let Some(i) = schedule.ready.pop_first() else {
                    break;
                };
                let step = &plan.steps[i];

                if step.action == Action::NoOp {
                    schedule.slots[i] = Slot::Done;
                    self.record_dependencies(step).await;
                    report.unchanged.push(step.address.clone());
                    schedule.release(i);
                    continue;
                }

                schedule.slots[i] = Slot::Running;
                info!(address = %step.address, action = %step.action, "Starting step");

                let job = StepJob {
                    step: step.clone(),
                    providers: self.providers.clone(),
                    store: self.store.clone(),
                    retry: self.options.retry.clone(),
                    baseline: baseline.clone(),
                    produced: produced.clone(),
                };
                let handle = tasks.spawn(async move {
                    let result = AssertUnwindSafe(job.run())
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| StepResult::Failed(StepFailure::new("provider panicked", 1)));
                    (i, result)
                });
                running.insert(handle.id(), i);
            }

            let joined = tokio::select! {
                joined = tasks.join_next_with_id() => joined,
                _ = self.cancel.cancelled(), if !report.cancelled => {
                    warn!(running = tasks.len(), "Cancellation requested, waiting for running steps");
                    report.cancelled = true;
                    continue;
                }
            };
            let Some(joined) = joined else {
                break;
            };
            let (i, result) = match joined {
                Ok((id, done)) => {
                    running.remove(&id);
                    done
                }
                Err(e) => match running.remove(&e.id()) {
                    Some(i) => {
                        error!(address = %plan.steps[i].address, error = %e, "Step task aborted");
                        (i, StepResult::Failed(StepFailure::new(format!("step task aborted: {}", e), 0)))
                    }
                    None => {
                        error!(error = %e, "Unknown step task aborted");
                        continue;
                    }
                },
            };

            schedule.slots[i] = Slot::Done;
            let step = &plan.steps[i];
            match result {
                StepResult::Applied(action) => {
                    info!(address = %step.address, action = %action, "Step applied");
                    report.applied.push(AppliedStep {
                        address: step.address.clone(),
                        action,
                    });
                    schedule.release(i);
                }
                StepResult::Unchanged => {
                    info!(address = %step.address, "Step left resource unchanged");
                    report.unchanged.push(step.address.clone());
                    schedule.release(i);
                }
                StepResult::Failed(failure) => {
                    error!(
                        address = %step.address,
                        action = %step.action,
                        attempts = failure.attempts,
                        error = %failure.message,
                        "Step failed"
                    );
                    report.failed.push(ApplyError {
                        address: step.address.clone(),
                        action: step.action,
                        message: failure.message,
                        attempts: failure.attempts,
                    });
                    schedule.skip_dependents(i, plan, &mut report);
                }
            }
        }

        let reason = if report.cancelled {
            "cancelled"
        } else {
            "not started"
        };
        for (i, step) in plan.steps.iter().enumerate() {
            if schedule.slots[i] == Slot::Pending {
                report.skipped.push(SkippedStep {
                    address: step.address.clone(),
                    action: step.action,
                    reason: reason.to_string(),
                });
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            applied = report.applied.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            duration_ms = report.duration_ms,
            "Apply finished"
        );
        Ok(report)
    }

    /// Rewrite the recorded dependencies of an unchanged resource whose
    /// declaration now points elsewhere. No provider is involved.
    async fn record_dependencies(&self, step: &PlanStep) {
        let (Some(dependencies), Some(prior)) = (step.stale_dependencies(), step.prior.as_ref()) else {
            return;
        };
        debug!(address = %step.address, "Refreshing recorded dependencies");
        let state = prior.clone().with_dependencies(dependencies);
        if let Err(e) = self.store.put(&step.address, state).await {
            warn!(address = %step.address, error = %e, "Failed to refresh recorded dependencies");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Pending,
    Running,
    Done,
    Skipped,
}

/// Dependency bookkeeping for one run
struct Schedule {
    remaining: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    slots: Vec<Slot>,
    /// Lowest index first, so a parallelism of one follows plan order
    ready: BTreeSet<usize>,
}

impl Schedule {
    fn new(plan: &Plan) -> Self {
        let n = plan.steps.len();
        let mut remaining = vec![0; n];
        let mut dependents = vec![Vec::new(); n];

        for (i, step) in plan.steps.iter().enumerate() {
            let deps: BTreeSet<usize> = step
                .depends_on
                .iter()
                .copied()
                .filter(|&d| d < n && d != i)
                .collect();
            remaining[i] = deps.len();
            for d in deps {
                dependents[d].push(i);
            }
        }

        let ready = (0..n).filter(|&i| remaining[i] == 0).collect();
        Self {
            remaining,
            dependents,
            slots: vec![Slot::Pending; n],
            ready,
        }
    }

    fn release(&mut self, i: usize) {
        for &d in &self.dependents[i] {
            self.remaining[d] = self.remaining[d].saturating_sub(1);
            if self.remaining[d] == 0 && self.slots[d] == Slot::Pending {
                self.ready.insert(d);
            }
        }
    }

    fn skip_dependents(&mut self, failed: usize, plan: &Plan, report: &mut ApplyReport) {
        let mut stack: Vec<(usize, usize)> = self.dependents[failed].iter().map(|&d| (d, failed)).collect();

        while let Some((d, cause)) = stack.pop() {
            if self.slots[d] != Slot::Pending {
                continue;
            }
            self.slots[d] = Slot::Skipped;
            self.ready.remove(&d);

            let step = &plan.steps[d];
            let reason = format!("dependency {} was not applied", plan.steps[cause].address);
            warn!(address = %step.address, reason = %reason, "Skipping step");
            report.skipped.push(SkippedStep {
                address: step.address.clone(),
                action: step.action,
                reason,
            });

            stack.extend(self.dependents[d].iter().map(|&next| (next, d)));
        }
    }
}

#[derive(Debug)]
struct StepFailure {
    message: String,
    attempts: u32,
}

impl StepFailure {
    fn new(message: impl Into<String>, attempts: u32) -> Self {
        Self {
            message: message.into(),
            attempts,
        }
    }

    fn provider(error: ProviderError, attempts: u32) -> Self {
        Self::new(error.to_string(), attempts)
    }

    fn state(error: EngineError) -> Self {
        Self::new(format!("state write failed: {}", error), 1)
    }
}

impl From<ModelError> for StepFailure {
    fn from(error: ModelError) -> Self {
        Self::new(error.to_string(), 0)
    }
}

impl From<EngineError> for StepFailure {
    fn from(error: EngineError) -> Self {
        Self::new(error.to_string(), 0)
    }
}

#[derive(Debug)]
enum StepResult {
    Applied(Action),
    Unchanged,
    Failed(StepFailure),
}

/// Everything one step needs, owned so it can move into a task
struct StepJob {
    step: PlanStep,
    providers: Arc<ProviderRegistry>,
    store: Arc<dyn StateStore>,
    retry: RetryConfig,
    baseline: Arc<StateSnapshot>,
    produced: Produced,
}

impl StepJob {
    async fn run(self) -> StepResult {
        let outcome = match self.providers.get(self.step.address.kind()) {
            Ok(provider) => {
                let ctx = ProviderContext::new(self.step.address.clone());
                let provider = provider.as_ref();
                match self.step.action {
                    Action::Create => self.create_step(&ctx, provider).await,
                    Action::Update => self.update_step(&ctx, provider).await,
                    Action::Replace => self.replace_step(&ctx, provider).await,
                    Action::Destroy => self.destroy_step(&ctx, provider).await,
                    Action::NoOp => Ok(None),
                }
            }
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(Some(action)) => StepResult::Applied(action),
            Ok(None) => StepResult::Unchanged,
            Err(failure) => StepResult::Failed(failure),
        }
    }

    async fn create_step(
        &self,
        ctx: &ProviderContext,
        provider: &dyn ResourceProvider,
    ) -> std::result::Result<Option<Action>, StepFailure> {
        let values = self.resolve_inputs().await?;
        self.create(ctx, provider, values).await?;
        Ok(Some(Action::Create))
    }

    async fn update_step(
        &self,
        ctx: &ProviderContext,
        provider: &dyn ResourceProvider,
    ) -> std::result::Result<Option<Action>, StepFailure> {
        let prior = self.prior()?;
        let values = self.resolve_inputs().await?;

        if !prior.is_tainted() && fingerprint(&values) == prior.fingerprint {
            debug!(address = %ctx.address, "Inputs unchanged once resolved");
            return Ok(None);
        }
        if provider.requires_replacement(ctx, &prior.attributes, &values) {
            debug!(address = %ctx.address, "Resolved inputs require replacement");
            self.replace(ctx, provider, &prior, values).await?;
            return Ok(Some(Action::Replace));
        }

        let (result, attempts) = self
            .retry
            .run("update", || {
                provider.update(ctx, &prior.id, &prior.attributes, &values)
            })
            .await;
        let outputs = result.map_err(|e| StepFailure::provider(e, attempts))?;

        let mut state = prior
            .clone()
            .with_attributes(values)
            .with_outputs(outputs)
            .with_dependencies(self.dependencies())
            .with_status(ResourceStatus::Present);
        state.updated_at = Utc::now();
        self.commit(&ctx.address, state).await?;
        Ok(Some(Action::Update))
    }

    async fn replace_step(
        &self,
        ctx: &ProviderContext,
        provider: &dyn ResourceProvider,
    ) -> std::result::Result<Option<Action>, StepFailure> {
        let prior = self.prior()?;
        let values = self.resolve_inputs().await?;
        self.replace(ctx, provider, &prior, values).await?;
        Ok(Some(Action::Replace))
    }

    async fn destroy_step(
        &self,
        ctx: &ProviderContext,
        provider: &dyn ResourceProvider,
    ) -> std::result::Result<Option<Action>, StepFailure> {
        let prior = self.prior()?;
        self.destroy(ctx, provider, &prior.id).await?;
        self.remove(&ctx.address).await?;
        Ok(Some(Action::Destroy))
    }

    async fn replace(
        &self,
        ctx: &ProviderContext,
        provider: &dyn ResourceProvider,
        prior: &ResourceState,
        values: Attributes,
    ) -> std::result::Result<(), StepFailure> {
        self.destroy(ctx, provider, &prior.id).await?;
        self.remove(&ctx.address).await?;
        self.create(ctx, provider, values).await
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        provider: &dyn ResourceProvider,
        values: Attributes,
    ) -> std::result::Result<(), StepFailure> {
        let (result, attempts) = self
            .retry
            .run("create", || provider.create(ctx, &values))
            .await;
        let created = result.map_err(|e| StepFailure::provider(e, attempts))?;
        info!(address = %ctx.address, id = %created.id, "Resource created");

        let state = ResourceState::new(created.id, ctx.kind())
            .with_attributes(values)
            .with_outputs(created.outputs)
            .with_dependencies(self.dependencies());
        self.commit(&ctx.address, state).await
    }

    async fn destroy(
        &self,
        ctx: &ProviderContext,
        provider: &dyn ResourceProvider,
        id: &str,
    ) -> std::result::Result<(), StepFailure> {
        let (result, attempts) = self
            .retry
            .run("destroy", || provider.destroy(ctx, id))
            .await;
        match result {
            Ok(()) => {
                info!(address = %ctx.address, id, "Resource destroyed");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(address = %ctx.address, id, "Resource already gone");
                Ok(())
            }
            Err(e) => Err(StepFailure::provider(e, attempts)),
        }
    }

    async fn commit(
        &self,
        address: &ResourceAddress,
        state: ResourceState,
    ) -> std::result::Result<(), StepFailure> {
        self.store
            .put(address, state.clone())
            .await
            .map_err(StepFailure::state)?;
        self.produced
            .write()
            .await
            .insert(address.clone(), Some(state));
        Ok(())
    }

    async fn remove(&self, address: &ResourceAddress) -> std::result::Result<(), StepFailure> {
        self.store
            .delete(address)
            .await
            .map_err(StepFailure::state)?;
        self.produced.write().await.insert(address.clone(), None);
        Ok(())
    }

    fn prior(&self) -> std::result::Result<ResourceState, StepFailure> {
        self.step
            .prior
            .clone()
            .or_else(|| self.baseline.get(&self.step.address).cloned())
            .ok_or_else(|| StepFailure::new(format!("no recorded state for {}", self.step.address), 0))
    }

    fn dependencies(&self) -> Vec<ResourceAddress> {
        self.step
            .declaration
            .as_ref()
            .map(|d| d.dependencies())
            .unwrap_or_default()
    }

    /// Resolve the declaration against this run's results, then the state
    /// as it was when the run started.
    async fn resolve_inputs(&self) -> std::result::Result<Attributes, StepFailure> {
        let declaration = self
            .step
            .declaration
            .as_ref()
            .ok_or_else(|| StepFailure::new(format!("no declaration for {}", self.step.address), 0))?;

        let produced = self.produced.read().await;
        let resolved = declaration.resolve(|reference| {
            let state = match produced.get(&reference.address) {
                Some(entry) => entry.as_ref(),
                None => self
                    .baseline
                    .get(&reference.address)
                    .filter(|s| s.status != ResourceStatus::Absent),
            };
            state
                .and_then(|s| s.lookup(&reference.path))
                .map_or(Lookup::Missing, Lookup::Known)
        })?;

        Ok(resolved.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use crate::planner::{PlanOptions, plan};
    use crate::state::MemoryStateStore;
    use skyflow_core::parse_yaml;

    const STACK: &str = r#"
resources:
  - kind: aws_vpc
    name: main
    attributes:
      cidr_block: 10.0.0.0/16
  - kind: aws_subnet
    name: a
    attributes:
      vpc_id: ${aws_vpc.main.id}
      vpc_arn: ${aws_vpc.main.arn}
"#;

    fn registry(mock: Arc<MockProvider>) -> ProviderRegistry {
        ProviderRegistry::new()
            .with("aws_vpc", mock.clone())
            .with("aws_subnet", mock)
    }

    #[tokio::test]
    async fn test_apply_resolves_references_from_run() {
        let mock = Arc::new(MockProvider::new());
        let providers = registry(mock.clone());
        let store = Arc::new(MemoryStateStore::new());
        let set = parse_yaml(STACK).unwrap();

        let snapshot = store.snapshot().await.unwrap();
        let plan = plan(&set, &snapshot, &providers, &PlanOptions::default()).unwrap();
        let report = Executor::new(providers, store.clone())
            .execute(&plan)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.applied.len(), 2);

        let vpc = store
            .get(&ResourceAddress::new("aws_vpc", "main"))
            .await
            .unwrap()
            .unwrap();
        let subnet = store
            .get(&ResourceAddress::new("aws_subnet", "a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(subnet.attributes["vpc_id"], serde_json::json!(vpc.id));
        assert_eq!(subnet.attributes["vpc_arn"], vpc.outputs["arn"]);
        assert_eq!(subnet.dependencies, vec![ResourceAddress::new("aws_vpc", "main")]);
    }

    #[tokio::test]
    async fn test_noop_plan_calls_no_provider() {
        let mock = Arc::new(MockProvider::new());
        let providers = registry(mock.clone());
        let store = Arc::new(MemoryStateStore::new());
        let set = parse_yaml(STACK).unwrap();

        let executor = Executor::new(providers.clone(), store.clone());
        let first = plan(&set, &store.snapshot().await.unwrap(), &providers, &PlanOptions::default()).unwrap();
        executor.execute(&first).await.unwrap();
        let calls_after_first = mock.calls.lock().unwrap().len();

        let second = plan(&set, &store.snapshot().await.unwrap(), &providers, &PlanOptions::default()).unwrap();
        assert!(!second.has_changes);
        let report = executor.execute(&second).await.unwrap();

        assert_eq!(report.unchanged.len(), 2);
        assert_eq!(mock.calls.lock().unwrap().len(), calls_after_first);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let providers = registry(Arc::new(MockProvider::new()));
        let store = Arc::new(MemoryStateStore::new());
        let set = parse_yaml(STACK).unwrap();
        let plan = plan(&set, &StateSnapshot::new(), &providers, &PlanOptions::default()).unwrap();

        let executor = Executor::new(providers, store.clone());
        executor.cancel_token().cancel();
        let report = executor.execute(&plan).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped.iter().all(|s| s.reason == "cancelled"));
        assert!(store.snapshot().await.unwrap().is_empty());
    }
}
