//! Planner
//!
//! Diffs the declared resources against the recorded state and produces
//! an ordered [`Plan`]. Planning is pure: it reads the snapshot and the
//! providers' replacement policies and never calls a provider or writes
//! state.

use crate::action::{Action, AttributeChange, Plan, PlanStep};
use crate::error::{EngineError, Result};
use crate::provider::{ProviderContext, ProviderRegistry, ResourceProvider};
use crate::state::{ResourceState, ResourceStatus, StateSnapshot};
use serde_json::Value;
use skyflow_core::{
    Attributes, DeclarationSet, DependencyGraph, Lookup, Reference, ResolvedAttributes,
    ResourceAddress, ResourceDeclaration, fingerprint, resolve_references,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, instrument};

/// Options controlling what gets planned
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Plan as if every declaration had been removed
    pub destroy_all: bool,

    /// Restrict the plan to these addresses and what they need
    pub targets: Vec<ResourceAddress>,
}

impl PlanOptions {
    pub fn destroy() -> Self {
        Self {
            destroy_all: true,
            ..Self::default()
        }
    }

    pub fn with_targets(mut self, targets: Vec<ResourceAddress>) -> Self {
        self.targets = targets;
        self
    }
}

struct Planned {
    action: Action,
    desired: ResolvedAttributes,
}

/// Build the plan that brings `snapshot` in line with `declarations`.
///
/// Declared resources are planned in topological order. Destroys of
/// resources that are recorded but no longer declared follow, dependents
/// first.
#[instrument(skip_all, fields(declared = declarations.len(), recorded = snapshot.len(), destroy_all = options.destroy_all))]
pub fn plan(
    declarations: &DeclarationSet,
    snapshot: &StateSnapshot,
    providers: &ProviderRegistry,
    options: &PlanOptions,
) -> Result<Plan> {
    validate_providers(declarations, snapshot, providers)?;

    let edges = resolve_references(declarations)?;
    let graph = DependencyGraph::build(declarations, &edges)?;

    for target in &options.targets {
        if !declarations.contains(target) && !snapshot.contains(target) {
            return Err(EngineError::UnknownTarget(target.clone()));
        }
    }

    let mut steps: Vec<PlanStep> = Vec::new();

    if !options.destroy_all {
        plan_declared(declarations, snapshot, providers, &graph, options, &mut steps)?;
    }
    plan_destroys(declarations, snapshot, options, &mut steps)?;

    let plan = Plan::new(steps);
    info!(summary = %plan.summary(), "Plan ready");
    Ok(plan)
}

fn validate_providers(
    declarations: &DeclarationSet,
    snapshot: &StateSnapshot,
    providers: &ProviderRegistry,
) -> Result<()> {
    let declared = declarations.iter().map(ResourceDeclaration::kind);
    let recorded = snapshot.iter().map(|(_, s)| s.resource_type.as_str());
    let kinds: BTreeSet<&str> = declared.chain(recorded).collect();

    for kind in kinds {
        if !providers.contains(kind) {
            return Err(EngineError::ProviderNotFound(kind.to_string()));
        }
    }
    Ok(())
}

fn plan_declared(
    declarations: &DeclarationSet,
    snapshot: &StateSnapshot,
    providers: &ProviderRegistry,
    graph: &DependencyGraph,
    options: &PlanOptions,
    steps: &mut Vec<PlanStep>,
) -> Result<()> {
    let scope: Option<HashSet<ResourceAddress>> = if options.targets.is_empty() {
        None
    } else {
        let roots: Vec<ResourceAddress> = options
            .targets
            .iter()
            .filter(|t| declarations.contains(t))
            .cloned()
            .collect();
        Some(graph.transitive_dependencies(&roots).into_iter().collect())
    };

    let mut index: HashMap<ResourceAddress, usize> = HashMap::new();
    let mut planned: HashMap<ResourceAddress, Planned> = HashMap::new();

    for address in graph.topological_order() {
        if scope.as_ref().is_some_and(|s| !s.contains(address)) {
            continue;
        }
        let Some(declaration) = declarations.get(address) else {
            continue;
        };

        let prior = snapshot
            .get(address)
            .filter(|s| s.status != ResourceStatus::Absent);
        let resolved = declaration.resolve(|r| lookup(r, &planned, snapshot))?;
        let provider = providers.get(declaration.kind())?;

        let mut step = decide(declaration, prior, &resolved, provider.as_ref());
        step.depends_on = graph
            .dependencies(address)
            .into_iter()
            .filter_map(|d| index.get(d).copied())
            .collect();

        debug!(address = %address, action = %step.action, "Planned step");
        planned.insert(
            address.clone(),
            Planned {
                action: step.action,
                desired: resolved,
            },
        );
        index.insert(address.clone(), steps.len());
        steps.push(step);
    }

    Ok(())
}

/// Value of `reference` at plan time.
fn lookup(
    reference: &Reference,
    planned: &HashMap<ResourceAddress, Planned>,
    snapshot: &StateSnapshot,
) -> Lookup {
    let is_id = reference.attribute() == "id";

    if let Some(source) = planned.get(&reference.address) {
        match source.action {
            Action::Create | Action::Replace => {
                if is_id || source.desired.deferred.contains(reference.attribute()) {
                    return Lookup::Deferred;
                }
                return reference
                    .path
                    .select(&source.desired.values)
                    .cloned()
                    .map_or(Lookup::Deferred, Lookup::Known);
            }
            Action::Update if !is_id => {
                if source.desired.deferred.contains(reference.attribute()) {
                    return Lookup::Deferred;
                }
                if let Some(value) = reference.path.select(&source.desired.values) {
                    return Lookup::Known(value.clone());
                }
                // Recorded outputs may change with the update.
                return match recorded(reference, snapshot) {
                    Some(_) => Lookup::Deferred,
                    None => Lookup::Missing,
                };
            }
            _ => {}
        }
    }

    recorded(reference, snapshot).map_or(Lookup::Missing, Lookup::Known)
}

fn recorded(reference: &Reference, snapshot: &StateSnapshot) -> Option<Value> {
    snapshot
        .get(&reference.address)
        .filter(|s| s.status != ResourceStatus::Absent)
        .and_then(|s| s.lookup(&reference.path))
}

fn decide(
    declaration: &ResourceDeclaration,
    prior: Option<&ResourceState>,
    resolved: &ResolvedAttributes,
    provider: &dyn ResourceProvider,
) -> PlanStep {
    let address = declaration.address().clone();
    let desired = resolved.with_placeholders();

    let mut step = match prior {
        None => {
            let mut step = PlanStep::new(address, Action::Create);
            step.changes = diff(&Attributes::new(), &desired);
            step
        }
        Some(prior) if prior.is_tainted() => {
            let mut step = PlanStep::new(address, Action::Replace);
            step.changes = diff(&prior.attributes, &desired);
            step.reason = Some("resource is tainted".to_string());
            step
        }
        Some(prior)
            if resolved.is_complete() && fingerprint(&resolved.values) == prior.fingerprint =>
        {
            PlanStep::new(address, Action::NoOp)
        }
        Some(prior) => {
            let ctx = ProviderContext::new(address.clone());
            let mut step =
                if provider.requires_replacement(&ctx, &prior.attributes, &desired) {
                    let mut step = PlanStep::new(address, Action::Replace);
                    step.reason = Some("provider requires replacement".to_string());
                    step
                } else {
                    let mut step = PlanStep::new(address, Action::Update);
                    if !resolved.is_complete() {
                        step.reason = Some("some values are known only after apply".to_string());
                    }
                    step
                };
            step.changes = diff(&prior.attributes, &desired);
            step
        }
    };

    step.declaration = Some(declaration.clone());
    step.prior = prior.cloned();
    step
}

/// Attribute-level differences, sorted by attribute name.
pub fn diff(old: &Attributes, new: &Attributes) -> Vec<AttributeChange> {
    let names: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    names
        .into_iter()
        .filter_map(|name| {
            let before = old.get(name);
            let after = new.get(name);
            (before != after).then(|| AttributeChange {
                name: name.clone(),
                old: before.cloned(),
                new: after.cloned(),
            })
        })
        .collect()
}

fn plan_destroys(
    declarations: &DeclarationSet,
    snapshot: &StateSnapshot,
    options: &PlanOptions,
    steps: &mut Vec<PlanStep>,
) -> Result<()> {
    let orphans: Vec<ResourceAddress> = snapshot
        .iter()
        .map(|(address, _)| address)
        .filter(|address| options.destroy_all || !declarations.contains(address))
        .cloned()
        .collect();
    if orphans.is_empty() {
        return Ok(());
    }

    let graph = DependencyGraph::from_parts(orphans, snapshot.recorded_edges())?;

    let scope: Option<HashSet<ResourceAddress>> = if options.targets.is_empty() {
        None
    } else {
        let roots: Vec<ResourceAddress> = options
            .targets
            .iter()
            .filter(|t| graph.contains(t))
            .cloned()
            .collect();
        Some(graph.transitive_dependents(&roots).into_iter().collect())
    };

    for address in graph.reverse_topological_order() {
        if scope.as_ref().is_some_and(|s| !s.contains(&address)) {
            continue;
        }
        let Some(prior) = snapshot.get(&address) else {
            continue;
        };

        let depends_on = steps
            .iter()
            .enumerate()
            .filter(|(_, step)| must_precede_destroy(step, &address, &graph))
            .map(|(i, _)| i)
            .collect();

        let mut step = PlanStep::new(address.clone(), Action::Destroy);
        step.depends_on = depends_on;
        step.prior = Some(prior.clone());

        debug!(address = %address, "Planned destroy");
        steps.push(step);
    }

    order_replacements_after_orphans(steps);
    Ok(())
}

/// A replacement destroys the old resource before creating the new one,
/// so orphans recorded as depending on it are destroyed first. Updates are
/// included since they can still turn into replacements at apply time.
fn order_replacements_after_orphans(steps: &mut [PlanStep]) {
    for r in 0..steps.len() {
        if !matches!(steps[r].action, Action::Replace | Action::Update) {
            continue;
        }
        let orphans: Vec<usize> = steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.action == Action::Destroy)
            .filter(|(_, step)| {
                step.prior
                    .as_ref()
                    .is_some_and(|p| p.dependencies.contains(&steps[r].address))
            })
            .map(|(j, _)| j)
            .filter(|&j| !waits_on(steps, j, r))
            .collect();

        for j in orphans {
            debug!(address = %steps[r].address, orphan = %steps[j].address, "Replacement waits for orphan destroy");
            if !steps[r].depends_on.contains(&j) {
                steps[r].depends_on.push(j);
            }
        }
    }
}

/// Whether step `from` transitively depends on step `target`.
fn waits_on(steps: &[PlanStep], from: usize, target: usize) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(i) = stack.pop() {
        if i == target {
            return true;
        }
        if !seen.insert(i) {
            continue;
        }
        if let Some(step) = steps.get(i) {
            stack.extend(step.depends_on.iter().copied());
        }
    }
    false
}

/// Whether `step` has to finish before `target` is destroyed: dependents
/// are destroyed first, and resources moving away from `target` are
/// updated first.
fn must_precede_destroy(step: &PlanStep, target: &ResourceAddress, graph: &DependencyGraph) -> bool {
    match step.action {
        Action::Destroy => graph.dependencies(&step.address).contains(&target),
        Action::Update | Action::Replace => step
            .prior
            .as_ref()
            .is_some_and(|p| p.dependencies.contains(target)),
        Action::Create | Action::NoOp => false,
    }
}
