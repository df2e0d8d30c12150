// transitive-core/src/builder.rs
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use transitive_common::error::{ResolveError, Result};
use transitive_common::{Coordinate, Descriptor, MediationKey, ResolutionWarning, Scope};

use crate::graph::{Edge, PathState, ResolutionGraph};
use crate::source::{cancellable, DependencySource};
use crate::version::VersionRequirement;

/// Discovers the unmediated dependency graph of a root coordinate.
///
/// Traversal is breadth-first, one level at a time. Descriptors of a level
/// are fetched concurrently but consumed in discovery order, so the graph
/// does not depend on which fetch finishes first. A node reached again along
/// a path that widens its scope, drops optionality or excludes less is
/// expanded again.
pub struct GraphBuilder {
    source: Arc<dyn DependencySource>,
    workers: usize,
    overrides: HashMap<MediationKey, String>,
}

/// Per-build traversal state.
struct Traversal {
    root: Coordinate,
    requested: Scope,
    states: HashMap<Coordinate, PathState>,
    descriptors: HashMap<Coordinate, Arc<Descriptor>>,
    failures: HashMap<Coordinate, ResolveError>,
    versions: HashMap<MediationKey, Vec<String>>,
    /// Nodes whose edge list skipped a failed optional range.
    partial: HashSet<Coordinate>,
    warned: HashSet<String>,
    followed: HashMap<Coordinate, Vec<Coordinate>>,
}

impl Traversal {
    fn new(root: &Coordinate, requested: Scope) -> Self {
        Self {
            root: root.clone(),
            requested,
            states: HashMap::from([(root.clone(), PathState::root(requested))]),
            descriptors: HashMap::new(),
            failures: HashMap::new(),
            versions: HashMap::new(),
            partial: HashSet::new(),
            warned: HashSet::new(),
            followed: HashMap::new(),
        }
    }
}

impl GraphBuilder {
    pub fn new(source: Arc<dyn DependencySource>, workers: usize) -> Self {
        Self {
            source,
            workers: workers.max(1),
            overrides: HashMap::new(),
        }
    }

    /// Versions that replace whatever the descriptors declare for a key.
    pub fn with_overrides(mut self, overrides: HashMap<MediationKey, String>) -> Self {
        self.overrides = overrides;
        self
    }

    pub async fn build(
        &self,
        root: &Coordinate,
        scope: Scope,
        cancel: &CancellationToken,
    ) -> Result<ResolutionGraph> {
        debug!("Building dependency graph for {} ({})", root, scope);
        let mut graph = ResolutionGraph::new(root.clone(), scope);
        let mut walk = Traversal::new(root, scope);

        let mut level = vec![root.clone()];
        let mut depth = 0;
        while !level.is_empty() {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            debug!("Graph level {}: {} node(s)", depth, level.len());
            self.fetch_level(&level, &mut walk, cancel).await?;

            let mut next = Vec::new();
            let mut queued = HashSet::new();
            for coordinate in &level {
                for child in self
                    .expand(coordinate, depth, &mut graph, &mut walk, cancel)
                    .await?
                {
                    if queued.insert(child.clone()) {
                        next.push(child);
                    }
                }
            }
            level = next;
            depth += 1;
        }

        for (coordinate, state) in &walk.states {
            if let Some(node) = graph.node_mut(coordinate) {
                node.scope = state.scope;
                node.optional = state.optional;
            }
        }
        detect_cycle(root, &walk.followed)?;

        debug!(
            "Dependency graph for {} has {} node(s), {} warning(s)",
            root,
            graph.len(),
            graph.warnings.len()
        );
        Ok(graph)
    }

    async fn fetch_level(
        &self,
        level: &[Coordinate],
        walk: &mut Traversal,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pending: Vec<Coordinate> = level
            .iter()
            .filter(|c| !walk.descriptors.contains_key(*c) && !walk.failures.contains_key(*c))
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let source = &self.source;
        let fetched: Vec<(Coordinate, Result<Arc<Descriptor>>)> = cancellable(cancel, async {
            Ok(stream::iter(pending)
                .map(|coordinate| async move {
                    let result = source.descriptor(&coordinate).await;
                    (coordinate, result)
                })
                .buffered(self.workers)
                .collect()
                .await)
        })
        .await?;

        for (coordinate, result) in fetched {
            match result {
                Ok(descriptor) => {
                    walk.descriptors.insert(coordinate, descriptor);
                }
                Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
                Err(e) => {
                    debug!("Descriptor fetch failed for {}: {}", coordinate, e);
                    walk.failures.insert(coordinate, e);
                }
            }
        }
        Ok(())
    }

    /// Follows the edges of one node visited at BFS level `level` and returns
    /// the children that need a (re-)visit. A child first reached here sits at
    /// `level + 1`, which may be deeper than the node's own nearest depth when
    /// a revisit is what made the edge followable.
    async fn expand(
        &self,
        coordinate: &Coordinate,
        level: usize,
        graph: &mut ResolutionGraph,
        walk: &mut Traversal,
        cancel: &CancellationToken,
    ) -> Result<Vec<Coordinate>> {
        let Some(state) = walk.states.get(coordinate).cloned() else {
            return Ok(Vec::new());
        };

        if let Some(failure) = walk.failures.get(coordinate) {
            if !state.optional {
                error!("Required dependency {} failed: {}", coordinate, failure);
                return Err(failure.clone());
            }
            if walk.warned.insert(coordinate.to_string()) {
                warn!("Skipping optional dependency {}: {}", coordinate, failure);
                graph.warnings.push(ResolutionWarning {
                    coordinate: coordinate.to_string(),
                    message: failure.to_string(),
                });
            }
            if let Some(node) = graph.node_mut(coordinate) {
                node.unavailable = true;
            }
            return Ok(Vec::new());
        }

        let Some(descriptor) = walk.descriptors.get(coordinate).cloned() else {
            return Ok(Vec::new());
        };
        let is_root = *coordinate == walk.root;
        let requested = walk.requested;
        let Some(node) = graph.node(coordinate) else {
            return Ok(Vec::new());
        };
        let node_depth = node.depth;
        let needs_edges = node.packaging.is_none()
            || (!state.optional && walk.partial.contains(coordinate));

        if needs_edges {
            let edges = self
                .edges(coordinate, &descriptor, node_depth, &state, graph, walk, cancel)
                .await?;
            if let Some(node) = graph.node_mut(coordinate) {
                node.packaging = Some(descriptor.packaging.clone());
                node.dependencies = edges;
            }
        }

        let edges = graph
            .node(coordinate)
            .map(|n| n.dependencies.clone())
            .unwrap_or_default();
        let mut revisit = Vec::new();
        for edge in edges {
            let Some(child) = state.follow(&edge, is_root, requested) else {
                continue;
            };
            let followed = walk.followed.entry(coordinate.clone()).or_default();
            if !followed.contains(&edge.target) {
                followed.push(edge.target.clone());
            }

            let changed = match walk.states.get_mut(&edge.target) {
                Some(existing) => existing.merge(&child),
                None => {
                    graph.add_node(edge.target.clone(), level + 1, &child);
                    walk.states.insert(edge.target.clone(), child);
                    true
                }
            };
            if changed {
                revisit.push(edge.target);
            }
        }
        Ok(revisit)
    }

    /// The structural edges of a descriptor: everything that can ever be
    /// followed, with overrides and version ranges applied.
    #[allow(clippy::too_many_arguments)]
    async fn edges(
        &self,
        owner: &Coordinate,
        descriptor: &Descriptor,
        depth: usize,
        state: &PathState,
        graph: &mut ResolutionGraph,
        walk: &mut Traversal,
        cancel: &CancellationToken,
    ) -> Result<Vec<Edge>> {
        let is_root = *owner == walk.root;
        let requested = walk.requested;
        walk.partial.remove(owner);
        let mut edges = Vec::with_capacity(descriptor.dependencies.len());

        for dependency in &descriptor.dependencies {
            if matches!(dependency.scope, Scope::System | Scope::Import) {
                debug!(
                    "{}: skipping {}-scoped {}",
                    owner, dependency.scope, dependency.coordinate
                );
                continue;
            }
            let followable = if is_root {
                requested.classpath_includes(dependency.scope)
            } else {
                !dependency.optional && dependency.scope.propagates()
            };
            if !followable {
                continue;
            }

            let mut target = dependency.coordinate.clone();
            if let Some(version) = self.overrides.get(&target.key()) {
                if *version != target.version {
                    debug!("{}: overriding {} with version {}", owner, target, version);
                }
                target.version = version.clone();
            } else {
                match self.concrete_version(owner, &target, walk, cancel).await {
                    Ok(version) => target.version = version,
                    Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
                    Err(e) if dependency.optional || state.optional => {
                        warn!("{}: skipping optional {}: {}", owner, target, e);
                        if walk.warned.insert(target.to_string()) {
                            graph.warnings.push(ResolutionWarning {
                                coordinate: target.to_string(),
                                message: e.to_string(),
                            });
                        }
                        if !dependency.optional {
                            walk.partial.insert(owner.clone());
                        }
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            edges.push(Edge {
                target,
                scope: dependency.scope,
                optional: dependency.optional,
                exclusions: dependency.exclusions.clone(),
                depth: depth + 1,
            });
        }
        Ok(edges)
    }

    /// Resolves ranges and `LATEST`/`RELEASE` against published metadata;
    /// plain versions pass through untouched. A range that does not parse
    /// makes `owner`'s descriptor corrupt.
    async fn concrete_version(
        &self,
        owner: &Coordinate,
        target: &Coordinate,
        walk: &mut Traversal,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let requirement = VersionRequirement::parse(&target.version)
            .map_err(|e| ResolveError::corrupt(owner, format!("dependency {target}: {e}")))?;
        if requirement.is_soft() {
            return Ok(target.version.clone());
        }

        let available = match walk.versions.entry(target.key()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let versions = cancellable(
                    cancel,
                    self.source.versions(&target.group, &target.artifact),
                )
                .await?;
                entry.insert(versions)
            }
        };
        let selected = requirement.select(available).ok_or_else(|| {
            ResolveError::not_found(format!("{} (no version matches)", target))
        })?;
        debug!("Version requirement {} selected {}", target, selected);
        Ok(selected.to_string())
    }
}

/// Fails on any cycle between exact coordinates. Cycles that only exist
/// between different versions of a key are left for the mediator to break.
fn detect_cycle(root: &Coordinate, followed: &HashMap<Coordinate, Vec<Coordinate>>) -> Result<()> {
    fn visit(
        node: &Coordinate,
        followed: &HashMap<Coordinate, Vec<Coordinate>>,
        path: &mut Vec<Coordinate>,
        done: &mut HashSet<Coordinate>,
    ) -> Result<()> {
        if done.contains(node) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|c| c == node) {
            let cycle = path[start..]
                .iter()
                .chain(std::iter::once(node))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            error!("Dependency cycle detected: {}", cycle);
            return Err(ResolveError::CyclicDependency { cycle });
        }

        path.push(node.clone());
        for child in followed.get(node).into_iter().flatten() {
            visit(child, followed, path, done)?;
        }
        path.pop();
        done.insert(node.clone());
        Ok(())
    }

    visit(root, followed, &mut Vec::new(), &mut HashSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{coord, MemorySource};

    async fn build(source: MemorySource, root: &str, scope: Scope) -> Result<ResolutionGraph> {
        GraphBuilder::new(Arc::new(source), 4)
            .build(&coord(root), scope, &CancellationToken::new())
            .await
    }

    fn coordinates(graph: &ResolutionGraph) -> Vec<String> {
        graph.coordinates().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn discovers_breadth_first_with_depths() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:1", "g:b:1"])
            .with("g:a:1", &["g:c:1"])
            .with("g:b:1", &[])
            .with("g:c:1", &[]);
        let graph = build(source, "g:root:1", Scope::Compile).await.unwrap();

        assert_eq!(coordinates(&graph), ["g:root:1", "g:a:1", "g:b:1", "g:c:1"]);
        assert_eq!(graph.node(&coord("g:c:1")).unwrap().depth, 2);
    }

    #[tokio::test]
    async fn keeps_every_version_of_a_key() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:1", "g:b:2"])
            .with("g:a:1", &["g:b:1"])
            .with("g:b:1", &[])
            .with("g:b:2", &[]);
        let graph = build(source, "g:root:1", Scope::Compile).await.unwrap();
        assert!(graph.contains(&coord("g:b:1")));
        assert!(graph.contains(&coord("g:b:2")));
    }

    #[tokio::test]
    async fn exact_self_reference_is_a_cycle() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:1"])
            .with("g:a:1", &["g:root:1"]);
        let err = build(source, "g:root:1", Scope::Compile).await.unwrap_err();
        match err {
            ResolveError::CyclicDependency { cycle } => {
                assert_eq!(cycle, "g:root:1 -> g:a:1 -> g:root:1")
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cycle_through_another_version_is_not_an_error() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:1"])
            .with("g:a:1", &["g:b:1"])
            .with("g:b:1", &["g:a:2"])
            .with("g:a:2", &[]);
        let graph = build(source, "g:root:1", Scope::Compile).await.unwrap();
        assert_eq!(graph.len(), 4);
    }

    #[tokio::test]
    async fn exclusions_prune_the_subtree_below_the_edge() {
        let source = MemorySource::new()
            .with_dependencies(
                "g:root:1",
                vec![MemorySource::dep("g:a:1").exclude("g", "c")],
            )
            .with("g:a:1", &["g:b:1"])
            .with("g:b:1", &["g:c:1"])
            .with("g:c:1", &[]);
        let graph = build(source, "g:root:1", Scope::Compile).await.unwrap();
        assert_eq!(coordinates(&graph), ["g:root:1", "g:a:1", "g:b:1"]);
    }

    #[tokio::test]
    async fn second_path_without_exclusion_revisits() {
        let source = MemorySource::new()
            .with_dependencies(
                "g:root:1",
                vec![
                    MemorySource::dep("g:a:1").exclude("g", "c"),
                    MemorySource::dep("g:x:1"),
                ],
            )
            .with("g:a:1", &["g:b:1"])
            .with("g:x:1", &["g:y:1"])
            .with("g:y:1", &["g:b:1"])
            .with("g:b:1", &["g:c:1"])
            .with("g:c:1", &[]);
        let graph = build(source, "g:root:1", Scope::Compile).await.unwrap();
        assert!(graph.contains(&coord("g:c:1")));
    }

    #[tokio::test]
    async fn test_and_provided_do_not_propagate() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:1"])
            .with_dependencies(
                "g:a:1",
                vec![
                    MemorySource::dep("g:t:1").with_scope(Scope::Test),
                    MemorySource::dep("g:p:1").with_scope(Scope::Provided),
                    MemorySource::dep("g:r:1").with_scope(Scope::Runtime),
                ],
            )
            .with("g:r:1", &[]);
        let compile = build(source.clone(), "g:root:1", Scope::Compile).await.unwrap();
        assert_eq!(coordinates(&compile), ["g:root:1", "g:a:1"]);

        let runtime = build(source, "g:root:1", Scope::Runtime).await.unwrap();
        assert_eq!(coordinates(&runtime), ["g:root:1", "g:a:1", "g:r:1"]);
        assert_eq!(runtime.node(&coord("g:r:1")).unwrap().scope, Scope::Runtime);
    }

    #[tokio::test]
    async fn transitive_optional_dependencies_are_dropped() {
        let source = MemorySource::new()
            .with_dependencies("g:root:1", vec![MemorySource::dep("g:a:1").optional(true)])
            .with_dependencies("g:a:1", vec![MemorySource::dep("g:b:1").optional(true)])
            .with("g:b:1", &[]);
        let graph = build(source, "g:root:1", Scope::Compile).await.unwrap();
        assert_eq!(coordinates(&graph), ["g:root:1", "g:a:1"]);
        assert!(graph.node(&coord("g:a:1")).unwrap().optional);
    }

    #[tokio::test]
    async fn missing_optional_descriptor_is_a_warning() {
        let source = MemorySource::new()
            .with_dependencies(
                "g:root:1",
                vec![MemorySource::dep("g:gone:1").optional(true), MemorySource::dep("g:a:1")],
            )
            .with("g:a:1", &[]);
        let graph = build(source, "g:root:1", Scope::Compile).await.unwrap();
        assert_eq!(graph.warnings.len(), 1);
        assert_eq!(graph.warnings[0].coordinate, "g:gone:1");
        assert!(graph.node(&coord("g:gone:1")).unwrap().unavailable);
    }

    #[tokio::test]
    async fn missing_required_descriptor_aborts() {
        let source = MemorySource::new().with("g:root:1", &["g:gone:1"]);
        let err = build(source, "g:root:1", Scope::Compile).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }), "{err:?}");
        assert_eq!(err.coordinate(), Some("g:gone:1"));
    }

    #[tokio::test]
    async fn ranges_resolve_against_published_versions() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:[1.0,2.0)"])
            .with("g:a:1.0", &[])
            .with("g:a:1.5", &[])
            .with("g:a:2.0", &[]);
        let graph = build(source, "g:root:1", Scope::Compile).await.unwrap();
        assert_eq!(coordinates(&graph), ["g:root:1", "g:a:1.5"]);
    }

    #[tokio::test]
    async fn overrides_rewrite_declared_versions() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:1"])
            .with("g:a:1", &["g:b:1"])
            .with("g:b:1", &[])
            .with("g:b:3", &[]);
        let overrides = HashMap::from([(MediationKey::new("g", "b"), "3".to_string())]);
        let graph = GraphBuilder::new(Arc::new(source), 2)
            .with_overrides(overrides)
            .build(&coord("g:root:1"), Scope::Compile, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(coordinates(&graph), ["g:root:1", "g:a:1", "g:b:3"]);
    }

    /// root -> a (excluding g:x) -> x:1 only becomes followable once a is
    /// reached again through c -> d, so x:1 sits at the depth of that path.
    fn late_unexcluded_source() -> MemorySource {
        MemorySource::new()
            .with_dependencies(
                "g:root:1",
                vec![
                    MemorySource::dep("g:a:1").exclude("g", "x"),
                    MemorySource::dep("g:c:1"),
                    MemorySource::dep("g:e:1"),
                ],
            )
            .with("g:a:1", &["g:x:1"])
            .with("g:c:1", &["g:d:1"])
            .with("g:d:1", &["g:a:1"])
            .with("g:e:1", &["g:f:1"])
            .with("g:f:1", &["g:x:2"])
            .with("g:x:1", &[])
            .with("g:x:2", &[])
    }

    #[tokio::test]
    async fn revisit_records_children_at_the_depth_of_the_new_path() {
        let graph = build(late_unexcluded_source(), "g:root:1", Scope::Compile)
            .await
            .unwrap();
        assert_eq!(graph.node(&coord("g:a:1")).unwrap().depth, 1);
        assert_eq!(graph.node(&coord("g:x:2")).unwrap().depth, 3);
        assert_eq!(graph.node(&coord("g:x:1")).unwrap().depth, 4);
    }

    #[tokio::test]
    async fn malformed_range_is_a_corrupt_descriptor_of_the_declarer() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:lib:1"])
            .with("g:lib:1", &["g:a:[1.0,2.0"]);
        let err = build(source, "g:root:1", Scope::Compile).await.unwrap_err();
        assert!(matches!(err, ResolveError::CorruptDescriptor { .. }), "{err:?}");
        assert_eq!(err.coordinate(), Some("g:lib:1"));
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_build() {
        let source = MemorySource::new().with("g:root:1", &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = GraphBuilder::new(Arc::new(source), 1)
            .build(&coord("g:root:1"), Scope::Compile, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled));
    }
}
