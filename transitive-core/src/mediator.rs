// transitive-core/src/mediator.rs
use std::collections::{HashMap, VecDeque};

use tracing::debug;
use transitive_common::error::{ResolveError, Result};
use transitive_common::{Coordinate, Mediation, MediationKey};

use crate::graph::{DependencyNode, Edge, PathState, ResolutionGraph};

/// Collapses `graph` to one version per mediation key.
///
/// The winner of a key is the caller's override when there is one, else the
/// nearest occurrence, else the first one discovered at that depth. The
/// winners are then re-walked from the root: edges are re-pointed at the
/// winning version, path exclusions are applied to the winner's own
/// dependencies, scope and optionality are recomputed, and keys no longer
/// reachable are dropped. Edges that would point back up the walk are
/// removed, so the result is acyclic.
pub fn mediate(
    graph: &ResolutionGraph,
    overrides: &HashMap<MediationKey, String>,
) -> Result<ResolutionGraph> {
    let groups = graph.versions_by_key();
    let mut winners: HashMap<MediationKey, Coordinate> = HashMap::new();
    let mut mediations = Vec::new();

    for (key, candidates) in &groups {
        let winner = select_winner(key, candidates, overrides, &graph.root)?;
        let mut omitted: Vec<String> = Vec::new();
        for candidate in candidates {
            let version = &candidate.coordinate.version;
            if *version != winner.version && !omitted.contains(version) {
                omitted.push(version.clone());
            }
        }
        if !omitted.is_empty() {
            debug!("Mediated {}: {} over {:?}", key, winner.version, omitted);
            mediations.push(Mediation {
                key: key.clone(),
                selected: winner.version.clone(),
                omitted,
            });
        }
        winners.insert(key.clone(), winner);
    }

    let (states, depths) = walk_winners(graph, &winners);

    let mut mediated = ResolutionGraph::new(graph.root.clone(), graph.scope);
    for (key, _) in &groups {
        let (Some(state), Some(&depth), Some(winner)) =
            (states.get(key), depths.get(key), winners.get(key))
        else {
            debug!("{} is unreachable after mediation", key);
            continue;
        };
        let Some(original) = graph.node(winner) else {
            continue;
        };
        let is_root = *winner == graph.root;

        let mut dependencies: Vec<Edge> = Vec::new();
        for edge in &original.dependencies {
            let target_key = edge.target.key();
            let (Some(&target_depth), Some(target)) =
                (depths.get(&target_key), winners.get(&target_key))
            else {
                continue;
            };
            if target_depth <= depth || state.follow(edge, is_root, graph.scope).is_none() {
                continue;
            }
            if dependencies.iter().any(|e| e.target == *target) {
                continue;
            }
            dependencies.push(Edge {
                target: target.clone(),
                depth: depth + 1,
                ..edge.clone()
            });
        }

        mediated.insert(DependencyNode {
            coordinate: winner.clone(),
            dependencies,
            depth,
            scope: state.scope,
            optional: state.optional,
            packaging: original.packaging.clone(),
            unavailable: original.unavailable,
        });
    }

    mediated.warnings = graph.warnings.clone();
    mediated.mediations = mediations;
    debug!(
        "Mediation kept {} of {} node(s) for {}",
        mediated.len(),
        graph.len(),
        graph.root
    );
    Ok(mediated)
}

fn select_winner(
    key: &MediationKey,
    candidates: &[&DependencyNode],
    overrides: &HashMap<MediationKey, String>,
    root: &Coordinate,
) -> Result<Coordinate> {
    let conflict = |message: String| ResolveError::VersionConflict {
        key: key.to_string(),
        message,
    };

    if *key == root.key() {
        if let Some(version) = overrides.get(key).filter(|v| **v != root.version) {
            return Err(conflict(format!(
                "override {version} contradicts the requested root version {}",
                root.version
            )));
        }
        return Ok(root.clone());
    }

    if let Some(version) = overrides.get(key) {
        return candidates
            .iter()
            .find(|n| n.coordinate.version == *version)
            .map(|n| n.coordinate.clone())
            .ok_or_else(|| {
                conflict(format!(
                    "override {version} is not among the discovered versions {:?}",
                    candidates
                        .iter()
                        .map(|n| n.coordinate.version.as_str())
                        .collect::<Vec<_>>()
                ))
            });
    }

    // `min_by_key` keeps the first of equally near candidates, which is the
    // first one discovered.
    candidates
        .iter()
        .min_by_key(|n| n.depth)
        .map(|n| n.coordinate.clone())
        .ok_or_else(|| conflict("no candidate versions".to_string()))
}

/// Breadth-first walk over winner edges. Returns the merged path state and
/// the walk depth of every reachable key.
fn walk_winners(
    graph: &ResolutionGraph,
    winners: &HashMap<MediationKey, Coordinate>,
) -> (
    HashMap<MediationKey, PathState>,
    HashMap<MediationKey, usize>,
) {
    let root_key = graph.root.key();
    let mut states = HashMap::from([(root_key.clone(), PathState::root(graph.scope))]);
    let mut depths = HashMap::from([(root_key.clone(), 0)]);
    let mut queue = VecDeque::from([root_key.clone()]);

    while let Some(key) = queue.pop_front() {
        let (Some(winner), Some(state), Some(&depth)) =
            (winners.get(&key), states.get(&key).cloned(), depths.get(&key))
        else {
            continue;
        };
        let Some(node) = graph.node(winner) else {
            continue;
        };
        let is_root = key == root_key;

        for edge in &node.dependencies {
            let target_key = edge.target.key();
            if !winners.contains_key(&target_key) {
                continue;
            }
            let Some(child) = state.follow(edge, is_root, graph.scope) else {
                continue;
            };
            let revisit = match states.get_mut(&target_key) {
                Some(existing) => existing.merge(&child),
                None => {
                    states.insert(target_key.clone(), child);
                    depths.insert(target_key.clone(), depth + 1);
                    true
                }
            };
            if revisit {
                queue.push_back(target_key);
            }
        }
    }
    (states, depths)
}
