//! Library dependency ordering.

use std::collections::{BTreeMap, BTreeSet};

use crate::artifacts::ArtifactProvider;
use crate::error::{KeelError, Result};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Order the nodes of `graph` so every node comes after the nodes it points to.
///
/// Nodes that only appear as edge targets are included. A cycle fails with
/// [`KeelError::CyclicDependency`] carrying the cycle path.
pub fn topological_order(graph: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
    let mut order = Vec::new();
    let mut path = Vec::new();

    for node in graph.keys() {
        visit(node, graph, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    node: &'a str,
    graph: &'a BTreeMap<String, Vec<String>>,
    marks: &mut BTreeMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<()> {
    match marks.get(node) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(node.to_string());
            return Err(KeelError::CyclicDependency { cycle });
        }
        None => {}
    }

    marks.insert(node, Mark::Visiting);
    path.push(node);
    for dependency in graph.get(node).into_iter().flatten() {
        visit(dependency, graph, marks, path, order)?;
    }
    path.pop();
    marks.insert(node, Mark::Done);
    order.push(node.to_string());
    Ok(())
}

/// Libraries reachable from `contract_names`, each after the libraries it links.
///
/// The graph is read from library placeholders in each artifact's bytecode,
/// following libraries that link other libraries.
pub fn library_dependency_order(
    contract_names: &[String],
    artifacts: &dyn ArtifactProvider,
) -> Result<Vec<String>> {
    let graph = library_graph(contract_names, artifacts)?;
    let libraries: BTreeSet<&String> = graph.values().flatten().collect();
    Ok(topological_order(&graph)?
        .into_iter()
        .filter(|name| libraries.contains(name))
        .collect())
}

/// Contract -> referenced libraries, for every contract and library reachable
/// from `contract_names`.
pub fn library_graph(
    contract_names: &[String],
    artifacts: &dyn ArtifactProvider,
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut graph = BTreeMap::new();
    let mut pending: Vec<String> = contract_names.to_vec();
    while let Some(name) = pending.pop() {
        if graph.contains_key(&name) {
            continue;
        }
        let libraries = artifacts.contract(&name)?.library_names();
        pending.extend(libraries.iter().cloned());
        graph.insert(name, libraries);
    }
    Ok(graph)
}

/// Every library transitively linked by `name`, per `graph`.
pub fn reachable_libraries(name: &str, graph: &BTreeMap<String, Vec<String>>) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut pending: Vec<&String> = graph.get(name).into_iter().flatten().collect();
    while let Some(library) = pending.pop() {
        if seen.insert(library.clone()) {
            pending.extend(graph.get(library).into_iter().flatten());
        }
    }
    seen
}
