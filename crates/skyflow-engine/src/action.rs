//! Plan and apply result types

use crate::state::ResourceState;
use serde::Serialize;
use serde_json::Value;
use skyflow_core::{ResourceAddress, ResourceDeclaration};
use std::fmt;
use thiserror::Error;

/// Type of change planned for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create a new resource
    Create,
    /// Update an existing resource in place
    Update,
    /// Destroy the existing resource, then create it again
    Replace,
    /// Destroy a resource
    Destroy,
    /// No changes needed
    NoOp,
}

impl Action {
    pub fn is_change(self) -> bool {
        self != Action::NoOp
    }

    /// Marker used when rendering plans
    pub fn symbol(self) -> &'static str {
        match self {
            Action::Create => "+",
            Action::Update => "~",
            Action::Replace => "-/+",
            Action::Destroy => "-",
            Action::NoOp => " ",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Replace => write!(f, "replace"),
            Action::Destroy => write!(f, "destroy"),
            Action::NoOp => write!(f, "no-op"),
        }
    }
}

/// One attribute difference. `None` means absent on that side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    pub name: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// A planned action for one resource
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    pub address: ResourceAddress,

    pub action: Action,

    /// Attribute diff; empty for no-ops and destroys
    pub changes: Vec<AttributeChange>,

    /// Indices of the steps that must finish before this one
    pub depends_on: Vec<usize>,

    /// Why a replace or update was chosen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Declaration to apply; absent for destroys
    #[serde(skip)]
    pub declaration: Option<ResourceDeclaration>,

    /// Recorded state at plan time
    #[serde(skip)]
    pub prior: Option<ResourceState>,
}

impl PlanStep {
    pub fn new(address: ResourceAddress, action: Action) -> Self {
        Self {
            address,
            action,
            changes: Vec::new(),
            depends_on: Vec::new(),
            reason: None,
            declaration: None,
            prior: None,
        }
    }

    /// Dependencies to record for a no-op whose recorded edges no longer
    /// match its declaration.
    pub fn stale_dependencies(&self) -> Option<Vec<ResourceAddress>> {
        if self.action != Action::NoOp {
            return None;
        }
        let declared = self.declaration.as_ref()?.dependencies();
        let recorded = &self.prior.as_ref()?.dependencies;

        let same = declared.len() == recorded.len() && declared.iter().all(|d| recorded.contains(d));
        (!same).then_some(declared)
    }
}

/// Plan containing every step to be applied, in order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    /// Steps in execution order
    pub steps: Vec<PlanStep>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        let has_changes = steps.iter().any(|s| s.action.is_change());
        Self { steps, has_changes }
    }

    /// Whether applying would rewrite recorded dependencies, even with
    /// nothing to change.
    pub fn has_stale_dependencies(&self) -> bool {
        self.steps.iter().any(|s| s.stale_dependencies().is_some())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, address: &ResourceAddress) -> Option<&PlanStep> {
        self.steps.iter().find(|s| &s.address == address)
    }

    /// Get steps by action
    pub fn steps_by_action(&self, action: Action) -> Vec<&PlanStep> {
        self.steps.iter().filter(|s| s.action == action).collect()
    }

    /// Steps that change something, in order
    pub fn changes(&self) -> Vec<&PlanStep> {
        self.steps.iter().filter(|s| s.action.is_change()).collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.steps_by_action(Action::Create).len(),
            update: self.steps_by_action(Action::Update).len(),
            replace: self.steps_by_action(Action::Replace).len(),
            destroy: self.steps_by_action(Action::Destroy).len(),
            no_change: self.steps_by_action(Action::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub destroy: usize,
    pub no_change: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to destroy, {} unchanged",
            self.create, self.update, self.replace, self.destroy, self.no_change
        )
    }
}

/// A step that failed during apply
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{action} {address} failed after {attempts} attempt(s): {message}")]
pub struct ApplyError {
    pub address: ResourceAddress,
    pub action: Action,
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedStep {
    pub address: ResourceAddress,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedStep {
    pub address: ResourceAddress,
    pub action: Action,
    pub reason: String,
}

/// Outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Applied,
    Unchanged,
    Failed,
    Skipped,
}

/// Result of applying a plan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    /// Steps the provider confirmed, in completion order
    pub applied: Vec<AppliedStep>,

    /// No-op steps
    pub unchanged: Vec<ResourceAddress>,

    /// Failed steps
    pub failed: Vec<ApplyError>,

    /// Steps never started
    pub skipped: Vec<SkippedStep>,

    /// Whether the run was cancelled
    pub cancelled: bool,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && !self.cancelled
    }

    pub fn status_of(&self, address: &ResourceAddress) -> Option<StepStatus> {
        if self.applied.iter().any(|s| &s.address == address) {
            Some(StepStatus::Applied)
        } else if self.unchanged.contains(address) {
            Some(StepStatus::Unchanged)
        } else if self.failed.iter().any(|e| &e.address == address) {
            Some(StepStatus::Failed)
        } else if self.skipped.iter().any(|s| &s.address == address) {
            Some(StepStatus::Skipped)
        } else {
            None
        }
    }
}
