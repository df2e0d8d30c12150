// transitive-net/src/client.rs
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_recursion::async_recursion;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use transitive_common::cache::{Cache, CacheEntry};
use transitive_common::config::Config;
use transitive_common::error::{ResolveError, Result};
use transitive_common::model::dependency::parse_scope;
use transitive_common::model::repository::by_priority;
use transitive_common::{
    Coordinate, Dependency, Descriptor, Exclusion, RepositoryDescriptor, ResolvedArtifact, Scope,
};

use crate::http::{build_http_client, fetch_with_retry, FetchOutcome};
use crate::metadata::parse_versions;
use crate::pom::{type_extension, PomDependency, PomModel};
use crate::single_flight::SingleFlight;

/// A POM with its parent chain folded in. Dependency entries are kept
/// uninterpolated so inherited entries see the child's properties.
#[derive(Debug)]
struct EffectivePom {
    coordinate: Coordinate,
    packaging: String,
    properties: HashMap<String, String>,
    dependency_management: Vec<PomDependency>,
    dependencies: Vec<PomDependency>,
}

/// Fetches metadata, descriptors and payloads from Maven 2 layout
/// repositories through the local cache.
///
/// Repositories are queried in priority order and the first one that has
/// the file wins. Fetches for the same file are single-flighted, so sharing
/// one client across concurrent tasks never downloads a file twice.
pub struct RepositoryClient {
    http: Client,
    cache: Cache,
    config: Config,
    repositories: Vec<RepositoryDescriptor>,
    flights: SingleFlight,
    poms: Mutex<HashMap<Coordinate, Arc<EffectivePom>>>,
    descriptors: Mutex<HashMap<Coordinate, Arc<Descriptor>>>,
    network_requests: AtomicUsize,
}

impl RepositoryClient {
    pub fn new(config: &Config) -> Result<Self> {
        let repositories = by_priority(config.repositories.clone());
        debug!(
            "Repository client using {:?}",
            repositories.iter().map(|r| &r.id).collect::<Vec<_>>()
        );
        Ok(Self {
            http: build_http_client(config)?,
            cache: Cache::new(config)?,
            config: config.clone(),
            repositories,
            flights: SingleFlight::new(),
            poms: Mutex::new(HashMap::new()),
            descriptors: Mutex::new(HashMap::new()),
            network_requests: AtomicUsize::new(0),
        })
    }

    pub fn repositories(&self) -> &[RepositoryDescriptor] {
        &self.repositories
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// HTTP requests issued so far, retries included.
    pub fn network_requests(&self) -> usize {
        self.network_requests.load(Ordering::Relaxed)
    }

    /// Versions of `group:artifact` listed by the first repository that
    /// publishes metadata for it.
    #[instrument(skip(self))]
    pub async fn fetch_metadata(&self, group: &str, artifact: &str) -> Result<Vec<String>> {
        let subject = format!("{group}:{artifact}");
        self.flights
            .run(&format!("metadata:{subject}"), || {
                self.load_or_download_metadata(group, artifact, &subject)
            })
            .await
    }

    /// The effective dependency list of `coordinate`.
    pub async fn fetch_descriptor(&self, coordinate: &Coordinate) -> Result<Arc<Descriptor>> {
        let pom_coordinate = coordinate.descriptor();
        if let Some(hit) = self.memoized_descriptor(&pom_coordinate) {
            return Ok(hit);
        }

        let pom = self.effective_pom(&pom_coordinate, &mut Vec::new()).await?;
        let descriptor = Arc::new(self.to_descriptor(&pom).await?);
        debug!(
            "Descriptor for {}: {} declared dependencies",
            coordinate,
            descriptor.dependencies.len()
        );
        self.descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pom_coordinate, Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Downloads (or finds in the cache) the payload of `coordinate`.
    pub async fn fetch_artifact(&self, coordinate: &Coordinate) -> Result<ResolvedArtifact> {
        let entry = self.fetch_file(coordinate).await?;
        Ok(ResolvedArtifact {
            coordinate: coordinate.clone(),
            source_repository: entry.repository,
            local_path: entry.path,
        })
    }

    fn memoized_descriptor(&self, pom_coordinate: &Coordinate) -> Option<Arc<Descriptor>> {
        self.descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pom_coordinate)
            .cloned()
    }

    fn memoized_pom(&self, pom_coordinate: &Coordinate) -> Option<Arc<EffectivePom>> {
        self.poms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pom_coordinate)
            .cloned()
    }

    async fn fetch_file(&self, coordinate: &Coordinate) -> Result<CacheEntry> {
        self.flights
            .run(&coordinate.to_string(), || self.load_or_download(coordinate))
            .await
    }

    async fn load_or_download(&self, coordinate: &Coordinate) -> Result<CacheEntry> {
        if let Some(entry) = self.cache.load(coordinate)? {
            return Ok(entry);
        }
        let subject = coordinate.to_string();
        match self
            .download(&coordinate.repository_path(), &subject)
            .await?
        {
            Some((content, repository)) => self.cache.store(coordinate, &repository, &content),
            None => Err(ResolveError::not_found(subject)),
        }
    }

    async fn load_or_download_metadata(
        &self,
        group: &str,
        artifact: &str,
        subject: &str,
    ) -> Result<Vec<String>> {
        let relative = format!("{}/{}/maven-metadata.xml", group.replace('.', "/"), artifact);
        let mut network_error = None;

        for repository in &self.repositories {
            if let Some(xml) = self.cache.load_metadata(group, artifact, &repository.id)? {
                return parse_versions(&xml, subject);
            }
            match self.request(repository, &relative, subject).await {
                Ok(FetchOutcome::Found(content)) => {
                    let xml = String::from_utf8_lossy(&content);
                    let versions = parse_versions(&xml, subject)?;
                    self.cache
                        .store_metadata(group, artifact, &repository.id, &xml)?;
                    return Ok(versions);
                }
                Ok(FetchOutcome::Missing) => {
                    debug!("No metadata for {} in '{}'", subject, repository.id);
                }
                Err(e @ ResolveError::Network { .. }) => {
                    warn!("Metadata fetch for {} from '{}' failed: {}", subject, repository.id, e);
                    network_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(network_error.unwrap_or_else(|| ResolveError::not_found(subject)))
    }

    /// Tries every repository in priority order. `Ok(None)` means every
    /// repository answered that it does not have the file.
    async fn download(
        &self,
        relative: &str,
        subject: &str,
    ) -> Result<Option<(Vec<u8>, String)>> {
        let mut network_error = None;

        for repository in &self.repositories {
            match self.request(repository, relative, subject).await {
                Ok(FetchOutcome::Found(content)) => {
                    debug!(
                        "Fetched {} ({} bytes) from '{}'",
                        subject,
                        content.len(),
                        repository.id
                    );
                    return Ok(Some((content, repository.id.clone())));
                }
                Ok(FetchOutcome::Missing) => {
                    debug!("{} not present in '{}'", subject, repository.id);
                }
                Err(e @ ResolveError::Network { .. }) => {
                    warn!("Fetch of {} from '{}' failed: {}", subject, repository.id, e);
                    network_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        // A transport failure means some repository might still have it.
        match network_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn request(
        &self,
        repository: &RepositoryDescriptor,
        relative: &str,
        subject: &str,
    ) -> Result<FetchOutcome> {
        let url = repository.url_for(relative);
        debug!("Requesting {} from '{}'", url, repository.id);
        fetch_with_retry(
            &self.http,
            &url,
            subject,
            self.config.request_timeout,
            self.config.retries,
            || {
                self.network_requests.fetch_add(1, Ordering::Relaxed);
            },
        )
        .await
    }

    #[async_recursion]
    async fn effective_pom(
        &self,
        pom_coordinate: &Coordinate,
        stack: &mut Vec<Coordinate>,
    ) -> Result<Arc<EffectivePom>> {
        if let Some(hit) = self.memoized_pom(pom_coordinate) {
            return Ok(hit);
        }

        if stack.contains(pom_coordinate) {
            let cycle = stack
                .iter()
                .chain(std::iter::once(pom_coordinate))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ResolveError::corrupt(
                pom_coordinate,
                format!("parent or import cycle: {cycle}"),
            ));
        }

        stack.push(pom_coordinate.clone());
        let entry = self.fetch_file(pom_coordinate).await?;
        let bytes = tokio::fs::read(&entry.path).await?;
        let model = PomModel::from_bytes(&bytes, pom_coordinate)?;

        let parent = match &model.parent {
            Some(parent) => Some(self.effective_pom(&parent.coordinate(), stack).await?),
            None => None,
        };
        stack.pop();

        let pom = Arc::new(merge_with_parent(pom_coordinate, model, parent.as_deref()));
        self.poms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pom_coordinate.clone(), Arc::clone(&pom));
        Ok(pom)
    }

    /// Interpolated `<dependencyManagement>` of `pom`, keyed by management
    /// key. Explicit entries win over entries imported from BOMs; the first
    /// import to manage a key wins among imports.
    #[async_recursion]
    async fn managed_dependencies(
        &self,
        pom: &EffectivePom,
        stack: &mut Vec<Coordinate>,
    ) -> Result<HashMap<String, PomDependency>> {
        let mut managed = HashMap::new();
        let mut imports = Vec::new();

        for raw in &pom.dependency_management {
            let entry = match raw.interpolated(&pom.properties) {
                Ok(entry) => entry,
                Err(name) => {
                    debug!(
                        "Skipping managed entry {} of {}: unresolved {}",
                        raw.management_key(),
                        pom.coordinate,
                        name
                    );
                    continue;
                }
            };
            let is_import = entry
                .scope
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("import"))
                && entry.dep_type.as_deref() == Some("pom");
            if is_import {
                imports.push(entry);
            } else {
                managed.insert(entry.management_key(), entry);
            }
        }

        for import in imports {
            let (Some(group), Some(artifact), Some(version)) =
                (&import.group_id, &import.artifact_id, &import.version)
            else {
                return Err(ResolveError::corrupt(
                    &pom.coordinate,
                    format!("incomplete BOM import {}", import.management_key()),
                ));
            };
            let bom_coordinate = Coordinate::new(group, artifact, version).descriptor();
            if stack.contains(&bom_coordinate) {
                return Err(ResolveError::corrupt(
                    &pom.coordinate,
                    format!("BOM import cycle through {bom_coordinate}"),
                ));
            }
            stack.push(bom_coordinate.clone());
            let bom = self.effective_pom(&bom_coordinate, stack).await?;
            let imported = self.managed_dependencies(&bom, stack).await?;
            stack.pop();
            for (key, entry) in imported {
                managed.entry(key).or_insert(entry);
            }
        }

        Ok(managed)
    }

    async fn to_descriptor(&self, pom: &EffectivePom) -> Result<Descriptor> {
        let managed = self.managed_dependencies(pom, &mut Vec::new()).await?;
        let coordinate = Coordinate::new(
            &pom.coordinate.group,
            &pom.coordinate.artifact,
            &pom.coordinate.version,
        );

        let mut dependencies = Vec::with_capacity(pom.dependencies.len());
        for raw in &pom.dependencies {
            let dep = raw.interpolated(&pom.properties).map_err(|name| {
                ResolveError::corrupt(
                    &coordinate,
                    format!("unresolved property {name} in dependency {}", raw.management_key()),
                )
            })?;
            let managed_entry = managed.get(&dep.management_key());
            let (Some(group), Some(artifact)) = (&dep.group_id, &dep.artifact_id) else {
                return Err(ResolveError::corrupt(
                    &coordinate,
                    format!("dependency without groupId/artifactId: {}", dep.management_key()),
                ));
            };
            let version = dep
                .version
                .clone()
                .or_else(|| managed_entry.and_then(|m| m.version.clone()))
                .ok_or_else(|| {
                    ResolveError::corrupt(
                        &coordinate,
                        format!("no version for dependency {group}:{artifact}"),
                    )
                })?;
            let scope = parse_scope(
                dep.scope
                    .as_deref()
                    .or_else(|| managed_entry.and_then(|m| m.scope.as_deref())),
            )
            .map_err(|e| ResolveError::corrupt(&coordinate, e.to_string()))?;
            let optional = match (&dep.optional, managed_entry) {
                (Some(_), _) => dep.is_optional(),
                (None, Some(m)) => m.is_optional(),
                (None, None) => false,
            };
            let (extension, classifier) =
                type_extension(dep.dep_type.as_deref(), dep.classifier.as_deref());

            let mut dep_coordinate =
                Coordinate::new(group, artifact, version).with_extension(extension);
            if let Some(classifier) = classifier {
                dep_coordinate = dep_coordinate.with_classifier(classifier);
            }
            let exclusions: BTreeSet<Exclusion> = dep
                .exclusions
                .iter()
                .chain(managed_entry.into_iter().flat_map(|m| m.exclusions.iter()))
                .map(|(g, a)| Exclusion::new(g, a))
                .collect();

            let mut dependency = Dependency::new(dep_coordinate)
                .with_scope(scope)
                .optional(optional);
            dependency.exclusions = exclusions;
            if scope == Scope::Import {
                debug!("Ignoring import-scoped dependency {} outside dependencyManagement", dependency.coordinate);
                continue;
            }
            dependencies.push(dependency);
        }

        Ok(Descriptor {
            coordinate,
            packaging: pom.packaging.clone(),
            dependencies,
        })
    }
}

fn merge_with_parent(
    pom_coordinate: &Coordinate,
    model: PomModel,
    parent: Option<&EffectivePom>,
) -> EffectivePom {
    let mut properties = parent.map(|p| p.properties.clone()).unwrap_or_default();
    properties.extend(model.properties);

    let group = model
        .group_id
        .or_else(|| parent.map(|p| p.coordinate.group.clone()))
        .unwrap_or_else(|| pom_coordinate.group.clone());
    let packaging = model.packaging.unwrap_or_else(|| "jar".to_string());
    for prefix in ["project", "pom"] {
        properties.insert(format!("{prefix}.groupId"), group.clone());
        properties.insert(format!("{prefix}.artifactId"), pom_coordinate.artifact.clone());
        properties.insert(format!("{prefix}.version"), pom_coordinate.version.clone());
        properties.insert(format!("{prefix}.packaging"), packaging.clone());
    }
    if let Some(parent) = parent {
        properties.insert("project.parent.groupId".into(), parent.coordinate.group.clone());
        properties.insert("project.parent.artifactId".into(), parent.coordinate.artifact.clone());
        properties.insert("project.parent.version".into(), parent.coordinate.version.clone());
    }

    let mut dependency_management = parent
        .map(|p| p.dependency_management.clone())
        .unwrap_or_default();
    dependency_management.extend(model.dependency_management);

    // Inherited dependencies are overridden by the child's own entry.
    let mut dependencies: Vec<PomDependency> = parent
        .map(|p| p.dependencies.clone())
        .unwrap_or_default();
    for own in model.dependencies {
        let key = own.management_key();
        match dependencies.iter_mut().find(|d| d.management_key() == key) {
            Some(inherited) => *inherited = own,
            None => dependencies.push(own),
        }
    }

    EffectivePom {
        coordinate: pom_coordinate.clone(),
        packaging,
        properties,
        dependency_management,
        dependencies,
    }
}
