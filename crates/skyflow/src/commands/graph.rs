use super::Outcome;
use crate::context::Project;
use skyflow_core::DependencyGraph;

/// Print the dependency graph in DOT format
pub fn handle(project: &Project) -> anyhow::Result<Outcome> {
    let declarations = project.declarations()?;
    let edges = skyflow_core::resolve_references(&declarations)?;
    let graph = DependencyGraph::build(&declarations, &edges)?;

    print!("{}", graph.to_dot());
    Ok(Outcome::Success)
}
