//! DAGPlanner — turns an adjacency map into topological waves, or reports
//! the cycle that prevents one.
//!
//! Tie-breaking within a wave is not observable to callers; this
//! implementation iterates in whatever order `HashMap` gives it.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::EngineError;

/// A wave: a set of node names with no dependencies on any node in its own
/// or later waves.
pub type Wave = Vec<String>;

/// Compute topological waves from a `node-name -> dependency node-names`
/// adjacency map (Kahn's algorithm, layer variant).
///
/// # Errors
/// [`EngineError::CycleDetected`] naming one node still unscheduled once no
/// further wave can be produced.
pub fn compute_waves(adjacency: &HashMap<String, Vec<String>>) -> Result<Vec<Wave>, EngineError> {
    // indegree[n] = number of dependencies n still has outstanding.
    let mut indegree: HashMap<&str, usize> = adjacency
        .keys()
        .map(|name| (name.as_str(), 0usize))
        .collect();
    // dependents[d] = nodes that depend on d (reverse of `adjacency`).
    let mut dependents: HashMap<&str, Vec<&str>> =
        adjacency.keys().map(|name| (name.as_str(), Vec::new())).collect();

    for (name, deps) in adjacency {
        *indegree.get_mut(name.as_str()).unwrap() = deps.len();
        for dep in deps {
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let mut waves = Vec::new();
    let mut frontier: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&n, _)| n)
        .collect();
    let mut scheduled: HashSet<&str> = HashSet::new();

    while !frontier.is_empty() {
        let wave: Vec<&str> = frontier.drain(..).collect();
        for &name in &wave {
            scheduled.insert(name);
        }

        let mut next_frontier = Vec::new();
        for &name in &wave {
            if let Some(deps) = dependents.get(name) {
                for &dependent in deps {
                    let deg = indegree.get_mut(dependent).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        next_frontier.push(dependent);
                    }
                }
            }
        }

        waves.push(wave.into_iter().map(str::to_owned).collect());
        frontier.extend(next_frontier);
    }

    if scheduled.len() != adjacency.len() {
        let stuck = adjacency
            .keys()
            .find(|name| !scheduled.contains(name.as_str()))
            .cloned()
            .unwrap_or_default();
        return Err(EngineError::CycleDetected(stuck));
    }

    Ok(waves)
}
