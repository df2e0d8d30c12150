// transitive-core/src/source.rs
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use transitive_common::error::{ResolveError, Result};
use transitive_common::{Coordinate, Descriptor, ResolvedArtifact};
use transitive_net::RepositoryClient;

/// Where the resolver gets metadata, descriptors and payloads from.
///
/// `RepositoryClient` is the production implementation; tests plug in an
/// in-memory catalogue.
#[async_trait]
pub trait DependencySource: Send + Sync {
    /// Every published version of `group:artifact`.
    async fn versions(&self, group: &str, artifact: &str) -> Result<Vec<String>>;

    async fn descriptor(&self, coordinate: &Coordinate) -> Result<Arc<Descriptor>>;

    async fn artifact(&self, coordinate: &Coordinate) -> Result<ResolvedArtifact>;
}

#[async_trait]
impl DependencySource for RepositoryClient {
    async fn versions(&self, group: &str, artifact: &str) -> Result<Vec<String>> {
        self.fetch_metadata(group, artifact).await
    }

    async fn descriptor(&self, coordinate: &Coordinate) -> Result<Arc<Descriptor>> {
        self.fetch_descriptor(coordinate).await
    }

    async fn artifact(&self, coordinate: &Coordinate) -> Result<ResolvedArtifact> {
        self.fetch_artifact(coordinate).await
    }
}

/// Runs `work` until it finishes or `cancel` fires, whichever comes first.
/// Dropping `work` abandons any in-flight request.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ResolveError::Cancelled),
        result = work => result,
    }
}
