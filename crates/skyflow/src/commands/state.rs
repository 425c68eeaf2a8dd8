use super::Outcome;
use crate::context::Project;
use crate::render;
use colored::Colorize;
use skyflow_core::ResourceAddress;
use skyflow_engine::EngineError;

pub async fn list(project: &Project) -> anyhow::Result<Outcome> {
    let snapshot = project.snapshot().await?;
    render::state_list(&snapshot);
    Ok(Outcome::Success)
}

pub async fn show(project: &Project, address: &ResourceAddress) -> anyhow::Result<Outcome> {
    let snapshot = project.snapshot().await?;
    let state = snapshot
        .get(address)
        .ok_or_else(|| EngineError::ResourceNotFound(address.clone()))?;
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(Outcome::Success)
}

pub async fn taint(project: &Project, address: &ResourceAddress) -> anyhow::Result<Outcome> {
    set_taint(project, address, true).await
}

pub async fn untaint(project: &Project, address: &ResourceAddress) -> anyhow::Result<Outcome> {
    set_taint(project, address, false).await
}

async fn set_taint(
    project: &Project,
    address: &ResourceAddress,
    tainted: bool,
) -> anyhow::Result<Outcome> {
    let store = project.open_store().await?;
    let result = if tainted {
        skyflow_engine::taint(&*store, address).await
    } else {
        skyflow_engine::untaint(&*store, address).await
    };
    store.close().await?;
    result?;

    if tainted {
        println!(
            "{} {} will be replaced on the next apply",
            "✓".green(),
            address.to_string().cyan()
        );
    } else {
        println!("{} {} untainted", "✓".green(), address.to_string().cyan());
    }
    Ok(Outcome::Success)
}
