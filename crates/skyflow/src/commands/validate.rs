use super::Outcome;
use crate::context::Project;
use colored::Colorize;
use skyflow_core::DependencyGraph;
use skyflow_engine::EngineError;
use std::collections::BTreeMap;

/// Check the stack file: references, cycles and provider kinds.
pub fn handle(project: &Project) -> anyhow::Result<Outcome> {
    println!("{}", "Validating configuration...".blue());
    if let Some(stack_file) = &project.stack_file {
        println!("Stack file: {}", stack_file.display().to_string().cyan());
    }

    let declarations = project.declarations()?;
    let edges = skyflow_core::resolve_references(&declarations)?;
    let graph = DependencyGraph::build(&declarations, &edges)?;

    let providers = project.providers();
    let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
    for declaration in declarations.iter() {
        if !providers.contains(declaration.kind()) {
            return Err(EngineError::ProviderNotFound(declaration.kind().to_string()).into());
        }
        *kinds.entry(declaration.kind()).or_default() += 1;
    }

    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    println!("Summary:");
    println!(
        "  Resources: {} ({} dependencies)",
        graph.node_count(),
        graph.edge_count()
    );
    for (kind, count) in kinds {
        println!("    - {} x{}", kind.cyan(), count);
    }

    Ok(Outcome::Success)
}
