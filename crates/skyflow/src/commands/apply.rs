use super::Outcome;
use crate::context::Project;
use crate::render;
use colored::Colorize;
use skyflow_core::{DeclarationSet, ResourceAddress};
use skyflow_engine::{CancelToken, Executor, PlanOptions, StateStore};
use std::sync::Arc;
use tracing::warn;

pub struct ApplyArgs {
    pub targets: Vec<ResourceAddress>,
    pub parallelism: Option<usize>,
    pub yes: bool,
    /// Tear down everything recorded in state
    pub destroy: bool,
}

pub async fn handle(project: &Project, args: ApplyArgs) -> anyhow::Result<Outcome> {
    let (declarations, options) = if args.destroy {
        (
            DeclarationSet::new(),
            PlanOptions::destroy().with_targets(args.targets.clone()),
        )
    } else {
        (
            project.declarations()?,
            PlanOptions::default().with_targets(args.targets.clone()),
        )
    };

    let store = project.open_store().await?;
    let outcome = run(project, &declarations, &options, store.clone(), &args).await;
    store.close().await?;
    outcome
}

async fn run(
    project: &Project,
    declarations: &DeclarationSet,
    options: &PlanOptions,
    store: Arc<skyflow_engine::FileStateStore>,
    args: &ApplyArgs,
) -> anyhow::Result<Outcome> {
    let snapshot = store.snapshot().await?;
    let providers = project.providers();
    let plan = skyflow_engine::plan(declarations, &snapshot, &providers, options)?;

    render::plan(&plan);
    if !plan.has_changes {
        if plan.has_stale_dependencies() {
            // Calls no provider; only recorded dependencies are rewritten.
            let store: Arc<dyn StateStore> = store;
            Executor::new(providers, store).execute(&plan).await?;
        }
        return Ok(Outcome::Success);
    }

    if !args.yes {
        println!();
        if args.destroy {
            println!(
                "{}",
                "Warning: every resource above will be destroyed.".yellow()
            );
        }
        println!("Run again with --yes to apply these changes");
        return Ok(Outcome::Success);
    }

    let cancel = CancelToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received");
            eprintln!(
                "{}",
                "Interrupted: waiting for running steps to finish...".yellow()
            );
            watcher.cancel();
        }
    });

    let store: Arc<dyn StateStore> = store;
    let executor = Executor::new(providers, store)
        .with_options(project.execute_options(args.parallelism))
        .with_cancel_token(cancel);
    let report = executor.execute(&plan).await?;

    render::apply_report(&report);
    if report.is_success() {
        Ok(Outcome::Success)
    } else {
        Ok(Outcome::PartialFailure)
    }
}
