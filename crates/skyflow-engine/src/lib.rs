//! SkyFlow Engine
//!
//! Turns a declaration set and the recorded state into a plan, and applies
//! that plan through resource providers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                    sky CLI                       │
//! │          (plan / apply / destroy / refresh)      │
//! └─────────────────┬────────────────────────────────┘
//!                   │
//! ┌─────────────────▼────────────────────────────────┐
//! │                 skyflow-engine                   │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  │
//! │  │  Planner   │─▶│  Executor  │─▶│ StateStore │  │
//! │  └────────────┘  └─────┬──────┘  └────────────┘  │
//! │                        │                         │
//! │  ┌─────────────────────▼──────────────────────┐  │
//! │  │   ProviderRegistry: kind -> dyn Provider   │  │
//! │  └────────────────────────────────────────────┘  │
//! └───────┬─────────────────┬────────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  local_file   │ │ null_resource │
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod cancel;
pub mod error;
pub mod executor;
#[cfg(test)]
mod mock;
pub mod planner;
pub mod provider;
pub mod refresh;
pub mod state;

// Re-exports
pub use action::{
    Action, AppliedStep, ApplyError, ApplyReport, AttributeChange, Plan, PlanStep, PlanSummary,
    SkippedStep, StepStatus,
};
pub use cancel::CancelToken;
pub use error::{EngineError, ProviderError, ProviderResult, Result};
pub use executor::{ExecuteOptions, Executor};
pub use planner::{PlanOptions, diff, plan};
pub use provider::{Created, ProviderContext, ProviderRegistry, ResourceProvider, RetryConfig};
pub use refresh::{RefreshFailure, RefreshReport, refresh};
pub use state::{
    FileStateStore, MemoryStateStore, ResourceState, ResourceStatus, STATE_VERSION, StateLock,
    StateSnapshot, StateStore, load_snapshot, taint, untaint,
};
