// transitive-core/src/resolver.rs
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use transitive_common::config::Config;
use transitive_common::error::{ResolveError, Result};
use transitive_common::{
    Coordinate, MediationKey, Resolution, ResolutionWarning, ResolvedArtifact, Scope,
};
use transitive_net::RepositoryClient;

use crate::builder::GraphBuilder;
use crate::graph::{DependencyNode, ResolutionGraph};
use crate::mediator::mediate;
use crate::source::{cancellable, DependencySource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Idle,
    Building,
    Mediating,
    Fetching,
    Done,
    Failed,
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionState::Idle => "idle",
            ResolutionState::Building => "building",
            ResolutionState::Mediating => "mediating",
            ResolutionState::Fetching => "fetching",
            ResolutionState::Done => "done",
            ResolutionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub coordinate: Coordinate,
    pub scope: Scope,
    /// Versions that win mediation for their key no matter where they sit.
    pub overrides: HashMap<MediationKey, String>,
}

impl ResolveRequest {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            scope: Scope::Compile,
            overrides: HashMap::new(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_override(
        mut self,
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.overrides
            .insert(MediationKey::new(group, artifact), version.into());
        self
    }
}

/// Runs resolutions: build, mediate, then fetch every surviving artifact.
///
/// One resolver may be reused for many requests; `state()` reports the
/// phase of the most recent one.
pub struct Resolver {
    source: Arc<dyn DependencySource>,
    workers: usize,
    state: Mutex<ResolutionState>,
}

impl Resolver {
    /// Resolver backed by a `RepositoryClient` built from `config`.
    pub fn new(config: &Config) -> Result<Self> {
        let client = RepositoryClient::new(config)?;
        Ok(Self::with_source(Arc::new(client), config.workers))
    }

    pub fn with_source(source: Arc<dyn DependencySource>, workers: usize) -> Self {
        Self {
            source,
            workers: workers.max(1),
            state: Mutex::new(ResolutionState::Idle),
        }
    }

    pub fn state(&self) -> ResolutionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: ResolutionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("Resolution state {} -> {}", *state, next);
        *state = next;
    }

    #[instrument(skip_all, name = "resolve", fields(root = %request.coordinate, scope = %request.scope))]
    pub async fn resolve(
        &self,
        request: &ResolveRequest,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        match self.run(request, cancel).await {
            Ok(resolution) => {
                self.transition(ResolutionState::Done);
                info!(
                    "Resolved {} artifact(s) for {} with {} warning(s)",
                    resolution.artifacts.len(),
                    request.coordinate,
                    resolution.warnings.len()
                );
                Ok(resolution)
            }
            Err(e) => {
                self.transition(ResolutionState::Failed);
                error!("Resolution of {} failed: {}", request.coordinate, e);
                Err(e)
            }
        }
    }

    async fn run(&self, request: &ResolveRequest, cancel: &CancellationToken) -> Result<Resolution> {
        self.transition(ResolutionState::Building);
        let graph = GraphBuilder::new(Arc::clone(&self.source), self.workers)
            .with_overrides(request.overrides.clone())
            .build(&request.coordinate, request.scope, cancel)
            .await?;

        self.transition(ResolutionState::Mediating);
        let mediated = mediate(&graph, &request.overrides)?;
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        self.transition(ResolutionState::Fetching);
        let (artifacts, fetch_warnings) = self.fetch_all(&mediated, cancel).await?;

        let mut warnings = mediated.warnings.clone();
        warnings.extend(fetch_warnings);
        Ok(Resolution {
            artifacts,
            warnings,
            mediations: mediated.mediations.clone(),
        })
    }

    /// Fetches every node on the requested classpath, `workers` at a time.
    /// Results land in discovery-order slots, so completion order never
    /// shows in the output.
    async fn fetch_all(
        &self,
        graph: &ResolutionGraph,
        cancel: &CancellationToken,
    ) -> Result<(Vec<ResolvedArtifact>, Vec<ResolutionWarning>)> {
        let targets: Vec<(Coordinate, bool)> = graph
            .nodes()
            .filter(|n| n.coordinate == graph.root || graph.scope.classpath_includes(n.scope))
            .filter(|n| !n.unavailable)
            .map(|n| (payload_coordinate(n), n.optional))
            .collect();
        debug!("Fetching {} artifact(s)", targets.len());

        let mut slots: Vec<Option<ResolvedArtifact>> = vec![None; targets.len()];
        let mut warnings: Vec<(usize, ResolutionWarning)> = Vec::new();

        let source = &self.source;
        let mut fetches = stream::iter(targets.iter().enumerate())
            .map(|(index, (coordinate, optional))| async move {
                (index, *optional, source.artifact(coordinate).await)
            })
            .buffer_unordered(self.workers);

        while let Some((index, optional, result)) =
            cancellable(cancel, async { Ok(fetches.next().await) }).await?
        {
            let coordinate = &targets[index].0;
            match result {
                Ok(artifact) => {
                    debug!("Fetched {} from '{}'", coordinate, artifact.source_repository);
                    slots[index] = Some(artifact);
                }
                Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
                Err(e) if optional => {
                    warn!("Skipping optional artifact {}: {}", coordinate, e);
                    warnings.push((
                        index,
                        ResolutionWarning {
                            coordinate: coordinate.to_string(),
                            message: e.to_string(),
                        },
                    ));
                }
                // Dropping `fetches` abandons the fetches still in flight.
                Err(e) => return Err(e),
            }
        }

        warnings.sort_by_key(|(index, _)| *index);
        Ok((
            slots.into_iter().flatten().collect(),
            warnings.into_iter().map(|(_, w)| w).collect(),
        ))
    }
}

/// `pom`-packaged artifacts have no jar; their payload is the POM itself.
fn payload_coordinate(node: &DependencyNode) -> Coordinate {
    let coordinate = &node.coordinate;
    if node.is_pom_only() && coordinate.classifier.is_none() && coordinate.extension == "jar" {
        coordinate.descriptor()
    } else {
        coordinate.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{coord, MemorySource};

    async fn resolve(source: MemorySource, request: ResolveRequest) -> (Resolver, Result<Resolution>) {
        let resolver = Resolver::with_source(Arc::new(source), 8);
        let result = resolver.resolve(&request, &CancellationToken::new()).await;
        (resolver, result)
    }

    fn coordinates(resolution: &Resolution) -> Vec<String> {
        resolution.coordinates().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn output_follows_discovery_order() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:1", "g:b:1", "g:c:1"])
            .with("g:a:1", &["g:d:1"])
            .with("g:b:1", &["g:e:1"])
            .with("g:c:1", &[])
            .with("g:d:1", &[])
            .with("g:e:1", &[]);
        let (resolver, result) = resolve(source, ResolveRequest::new(coord("g:root:1"))).await;

        let resolution = result.unwrap();
        assert_eq!(
            coordinates(&resolution),
            ["g:root:1", "g:a:1", "g:b:1", "g:c:1", "g:d:1", "g:e:1"]
        );
        assert_eq!(resolver.state(), ResolutionState::Done);
    }

    #[tokio::test]
    async fn compile_classpath_keeps_provided_and_drops_runtime_and_test() {
        let source = MemorySource::new()
            .with_dependencies(
                "g:root:1",
                vec![
                    MemorySource::dep("g:lib:1"),
                    MemorySource::dep("g:servlet:1").with_scope(Scope::Provided),
                    MemorySource::dep("g:driver:1").with_scope(Scope::Runtime),
                    MemorySource::dep("g:junit:1").with_scope(Scope::Test),
                ],
            )
            .with("g:lib:1", &[])
            .with("g:servlet:1", &[])
            .with("g:driver:1", &[])
            .with("g:junit:1", &[]);

        let (_, compile) = resolve(source.clone(), ResolveRequest::new(coord("g:root:1"))).await;
        assert_eq!(
            coordinates(&compile.unwrap()),
            ["g:root:1", "g:lib:1", "g:servlet:1"]
        );

        let (_, test) = resolve(
            source,
            ResolveRequest::new(coord("g:root:1")).with_scope(Scope::Test),
        )
        .await;
        assert_eq!(test.unwrap().artifacts.len(), 5);
    }

    #[tokio::test]
    async fn pom_packaging_resolves_to_the_pom() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:bom:1"])
            .with("g:bom:1", &["g:real:1"])
            .with_packaging("g:bom:1", "pom")
            .with("g:real:1", &[]);
        let (_, result) = resolve(source, ResolveRequest::new(coord("g:root:1"))).await;
        assert_eq!(
            coordinates(&result.unwrap()),
            ["g:root:1", "g:bom:pom:1", "g:real:1"]
        );
    }

    #[tokio::test]
    async fn optional_artifact_failure_is_a_warning() {
        let source = MemorySource::new()
            .with_dependencies("g:root:1", vec![MemorySource::dep("g:opt:1").optional(true)])
            .with("g:opt:1", &[])
            .without_artifact("g:opt:1");
        let (resolver, result) = resolve(source, ResolveRequest::new(coord("g:root:1"))).await;

        let resolution = result.unwrap();
        assert_eq!(coordinates(&resolution), ["g:root:1"]);
        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(resolution.warnings[0].coordinate, "g:opt:1");
        assert_eq!(resolver.state(), ResolutionState::Done);
    }

    #[tokio::test]
    async fn required_artifact_failure_fails_the_resolution() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:1"])
            .with("g:a:1", &[])
            .without_artifact("g:a:1");
        let (resolver, result) = resolve(source, ResolveRequest::new(coord("g:root:1"))).await;

        let err = result.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }), "{err:?}");
        assert_eq!(err.coordinate(), Some("g:a:1"));
        assert_eq!(resolver.state(), ResolutionState::Failed);
    }

    #[tokio::test]
    async fn overrides_flow_through_to_the_output() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:1", "g:b:2"])
            .with("g:a:1", &["g:b:1"])
            .with("g:b:1", &[])
            .with("g:b:2", &[])
            .with("g:b:5", &[]);
        let request = ResolveRequest::new(coord("g:root:1")).with_override("g", "b", "5");
        let (_, result) = resolve(source, request).await;
        assert_eq!(coordinates(&result.unwrap()), ["g:root:1", "g:a:1", "g:b:5"]);
    }

    #[tokio::test]
    async fn losing_versions_are_never_downloaded() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:1", "g:b:2"])
            .with("g:a:1", &["g:b:1"])
            .with("g:b:1", &[])
            .with("g:b:2", &[]);
        let counters = source.clone();
        let (_, result) = resolve(source, ResolveRequest::new(coord("g:root:1"))).await;

        let resolution = result.unwrap();
        assert_eq!(coordinates(&resolution), ["g:root:1", "g:a:1", "g:b:2"]);
        // Both versions of g:b are described, only the winner is fetched.
        assert_eq!(counters.descriptor_fetches(), 4);
        assert_eq!(counters.artifact_fetches(), 3);
    }

    #[tokio::test]
    async fn repeated_resolution_is_identical() {
        let source = MemorySource::new()
            .with("g:root:1", &["g:a:1", "g:b:2"])
            .with("g:a:1", &["g:b:1", "g:c:1"])
            .with("g:b:1", &[])
            .with("g:b:2", &["g:c:2"])
            .with("g:c:1", &[])
            .with("g:c:2", &[]);
        let resolver = Resolver::with_source(Arc::new(source), 3);
        let request = ResolveRequest::new(coord("g:root:1"));
        let first = resolver.resolve(&request, &CancellationToken::new()).await.unwrap();
        let second = resolver.resolve(&request, &CancellationToken::new()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(coordinates(&first), ["g:root:1", "g:a:1", "g:b:2", "g:c:1"]);
    }

    #[tokio::test]
    async fn cancellation_yields_cancelled() {
        let source = MemorySource::new().with("g:root:1", &[]);
        let counters = source.clone();
        let resolver = Resolver::with_source(Arc::new(source), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolver
            .resolve(&ResolveRequest::new(coord("g:root:1")), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled));
        assert_eq!(resolver.state(), ResolutionState::Failed);
        assert_eq!(counters.descriptor_fetches(), 0);
        assert_eq!(counters.artifact_fetches(), 0);
    }
}
