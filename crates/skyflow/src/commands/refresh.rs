use super::Outcome;
use crate::context::Project;
use crate::render;
use colored::Colorize;

pub async fn handle(project: &Project) -> anyhow::Result<Outcome> {
    println!("{}", "Refreshing state...".blue());

    let store = project.open_store().await?;
    let providers = project.providers();
    let result = skyflow_engine::refresh(&*store, &providers, &project.retry()).await;
    store.close().await?;

    let report = result?;
    render::refresh_report(&report);

    if report.failed.is_empty() {
        Ok(Outcome::Success)
    } else {
        Ok(Outcome::PartialFailure)
    }
}
