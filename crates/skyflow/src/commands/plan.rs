use super::Outcome;
use crate::context::Project;
use crate::render;
use serde::Serialize;
use skyflow_core::ResourceAddress;
use skyflow_engine::{PlanOptions, PlanStep, PlanSummary};

#[derive(Serialize)]
struct PlanDocument<'a> {
    has_changes: bool,
    summary: PlanSummary,
    steps: &'a [PlanStep],
}

pub async fn handle(
    project: &Project,
    targets: Vec<ResourceAddress>,
    json: bool,
) -> anyhow::Result<Outcome> {
    let declarations = project.declarations()?;
    let snapshot = project.snapshot().await?;
    let providers = project.providers();

    let options = PlanOptions::default().with_targets(targets);
    let plan = skyflow_engine::plan(&declarations, &snapshot, &providers, &options)?;

    if json {
        let document = PlanDocument {
            has_changes: plan.has_changes,
            summary: plan.summary(),
            steps: &plan.steps,
        };
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        render::plan(&plan);
    }

    Ok(Outcome::Success)
}
