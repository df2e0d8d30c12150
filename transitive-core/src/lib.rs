// transitive-core/src/lib.rs
pub mod builder;
pub mod graph;
pub mod mediator;
pub mod resolver;
pub mod source;
pub mod version;

#[cfg(test)]
mod testing;

pub use builder::GraphBuilder;
pub use graph::{DependencyNode, Edge, ResolutionGraph};
pub use mediator::mediate;
pub use resolver::{ResolutionState, ResolveRequest, Resolver};
pub use source::DependencySource;
pub use transitive_common::{
    Config, Coordinate, RepositoryDescriptor, Resolution, ResolveError, Result, Scope,
};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Resolves `group:artifact:version` for `scope` against `repositories`,
/// queried in priority order. An empty list means Maven Central. Everything
/// else (cache directory, workers, timeouts) comes from `config`.
pub async fn resolve(
    group: &str,
    artifact: &str,
    version: &str,
    scope: Scope,
    repositories: Vec<RepositoryDescriptor>,
    config: &Config,
) -> Result<Resolution> {
    let config = config.clone().with_repositories(repositories);
    let request = ResolveRequest::new(Coordinate::new(group, artifact, version)).with_scope(scope);
    debug!(
        "Resolving {} ({}) with {} repositories",
        request.coordinate,
        scope,
        config.repositories.len()
    );
    Resolver::new(&config)?
        .resolve(&request, &CancellationToken::new())
        .await
}

/// The compile classpath of `group:artifact:version` using the repositories
/// in `config`.
pub async fn find_compile_dependencies(
    group: &str,
    artifact: &str,
    version: &str,
    config: &Config,
) -> Result<Resolution> {
    let request = ResolveRequest::new(Coordinate::new(group, artifact, version));
    Resolver::new(config)?
        .resolve(&request, &CancellationToken::new())
        .await
}
