// transitive-core/src/testing.rs
// In-memory dependency source for unit tests.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use transitive_common::error::{ResolveError, Result};
use transitive_common::{Coordinate, Dependency, Descriptor, ResolvedArtifact};

use crate::source::DependencySource;

pub fn coord(s: &str) -> Coordinate {
    Coordinate::parse(s).unwrap()
}

#[derive(Clone, Default)]
pub struct MemorySource {
    catalogue: Vec<Arc<Descriptor>>,
    missing_artifacts: HashSet<Coordinate>,
    descriptor_fetches: Arc<AtomicUsize>,
    artifact_fetches: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dep(coordinate: &str) -> Dependency {
        Dependency::new(coord(coordinate))
    }

    pub fn with(self, coordinate: &str, dependencies: &[&str]) -> Self {
        let dependencies = dependencies.iter().map(|d| Self::dep(d)).collect();
        self.with_dependencies(coordinate, dependencies)
    }

    pub fn with_dependencies(mut self, coordinate: &str, dependencies: Vec<Dependency>) -> Self {
        self.catalogue
            .push(Arc::new(Descriptor::new(coord(coordinate), dependencies)));
        self
    }

    pub fn with_packaging(mut self, coordinate: &str, packaging: &str) -> Self {
        let target = coord(coordinate);
        for descriptor in &mut self.catalogue {
            if descriptor.coordinate == target {
                Arc::make_mut(descriptor).packaging = packaging.to_string();
            }
        }
        self
    }

    /// The descriptor resolves but the payload does not.
    pub fn without_artifact(mut self, coordinate: &str) -> Self {
        self.missing_artifacts.insert(coord(coordinate));
        self
    }

    pub fn descriptor_fetches(&self) -> usize {
        self.descriptor_fetches.load(Ordering::SeqCst)
    }

    pub fn artifact_fetches(&self) -> usize {
        self.artifact_fetches.load(Ordering::SeqCst)
    }

    fn find(&self, coordinate: &Coordinate) -> Option<&Arc<Descriptor>> {
        self.catalogue.iter().find(|d| {
            d.coordinate.group == coordinate.group
                && d.coordinate.artifact == coordinate.artifact
                && d.coordinate.version == coordinate.version
        })
    }
}

#[async_trait]
impl DependencySource for MemorySource {
    async fn versions(&self, group: &str, artifact: &str) -> Result<Vec<String>> {
        let versions: Vec<String> = self
            .catalogue
            .iter()
            .filter(|d| d.coordinate.group == group && d.coordinate.artifact == artifact)
            .map(|d| d.coordinate.version.clone())
            .collect();
        if versions.is_empty() {
            return Err(ResolveError::not_found(format!("{group}:{artifact}")));
        }
        Ok(versions)
    }

    async fn descriptor(&self, coordinate: &Coordinate) -> Result<Arc<Descriptor>> {
        self.descriptor_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.find(coordinate)
            .cloned()
            .ok_or_else(|| ResolveError::not_found(coordinate))
    }

    async fn artifact(&self, coordinate: &Coordinate) -> Result<ResolvedArtifact> {
        self.artifact_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.missing_artifacts.contains(coordinate) || self.find(coordinate).is_none() {
            return Err(ResolveError::not_found(coordinate));
        }
        Ok(ResolvedArtifact {
            coordinate: coordinate.clone(),
            source_repository: "memory".to_string(),
            local_path: PathBuf::from("/memory").join(coordinate.repository_path()),
        })
    }
}
