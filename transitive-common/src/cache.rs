// transitive-common/src/cache.rs
// Local artifact cache: descriptors, payloads and repository metadata.
//
// Layout: <root>/<group as dirs>/<artifact>/<version>/<classifier-extension>/<file>
// Every descriptor or payload has a `<file>.sha256.json` sidecar. An entry
// without a sidecar, or whose sidecar disagrees with the file, is a miss.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::error::{ResolveError, Result};
use crate::model::Coordinate;
use crate::Config;

/// Repository metadata (available versions) goes stale; descriptors and
/// payloads of a released version never do.
const METADATA_TTL: Duration = Duration::from_secs(24 * 60 * 60); // 24 hours

const SIDECAR_SUFFIX: &str = ".sha256.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Sidecar {
    sha256: String,
    repository: String,
    size: u64,
}

/// A verified cache hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub repository: String,
    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct Cache {
    config: Config,
}

impl Cache {
    pub fn new(config: &Config) -> Result<Self> {
        let cache_dir = config.cache_dir();
        if !cache_dir.exists() {
            fs::create_dir_all(cache_dir)?;
        }

        Ok(Self {
            config: config.clone(),
        })
    }

    pub fn entry_path(&self, coordinate: &Coordinate) -> PathBuf {
        self.config
            .artifact_dir(&coordinate.group, &coordinate.artifact)
            .join(&coordinate.version)
            .join(coordinate.cache_leaf())
            .join(coordinate.file_name())
    }

    pub fn metadata_path(&self, group: &str, artifact: &str, repository: &str) -> PathBuf {
        self.config
            .artifact_dir(group, artifact)
            .join(format!("maven-metadata-{repository}.xml"))
    }

    /// Returns the entry for `coordinate` if it exists and its checksum
    /// matches the sidecar. Mismatched entries are removed.
    pub fn load(&self, coordinate: &Coordinate) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(coordinate);
        let sidecar_path = sidecar_path(&path);
        if !path.is_file() || !sidecar_path.is_file() {
            return Ok(None);
        }

        let sidecar: Sidecar = match fs::read(&sidecar_path)
            .map_err(ResolveError::from)
            .and_then(|raw| serde_json::from_slice(&raw).map_err(ResolveError::from))
        {
            Ok(sidecar) => sidecar,
            Err(e) => {
                warn!("Unreadable sidecar {}: {}", sidecar_path.display(), e);
                self.evict(&path);
                return Ok(None);
            }
        };

        let actual = sha256_file(&path)?;
        if !actual.eq_ignore_ascii_case(&sidecar.sha256) {
            debug!(
                "Cached file checksum mismatch ({}): expected {}, got {}. Evicting.",
                path.display(),
                sidecar.sha256,
                actual
            );
            self.evict(&path);
            return Ok(None);
        }

        debug!("Cache hit for {} at {}", coordinate, path.display());
        Ok(Some(CacheEntry {
            path,
            repository: sidecar.repository,
            sha256: sidecar.sha256,
            size: sidecar.size,
        }))
    }

    /// Atomically stores `content` for `coordinate`. The payload is renamed
    /// into place before the sidecar, so a crash in between leaves a miss,
    /// never a hit with the wrong bytes.
    pub fn store(
        &self,
        coordinate: &Coordinate,
        repository: &str,
        content: &[u8],
    ) -> Result<CacheEntry> {
        let path = self.entry_path(coordinate);
        let sha256 = hex::encode(Sha256::digest(content));
        let sidecar = Sidecar {
            sha256: sha256.clone(),
            repository: repository.to_string(),
            size: content.len() as u64,
        };

        atomic_write_file(&path, content)?;
        atomic_write_file(&sidecar_path(&path), &serde_json::to_vec_pretty(&sidecar)?)?;
        debug!(
            "Stored {} ({} bytes) from '{}' at {}",
            coordinate,
            content.len(),
            repository,
            path.display()
        );

        Ok(CacheEntry {
            path,
            repository: sidecar.repository,
            sha256,
            size: sidecar.size,
        })
    }

    /// Loads cached `maven-metadata.xml` for one repository if it is still
    /// within the TTL.
    pub fn load_metadata(
        &self,
        group: &str,
        artifact: &str,
        repository: &str,
    ) -> Result<Option<String>> {
        let path = self.metadata_path(group, artifact, repository);
        if !self.is_cache_valid(&path)? {
            return Ok(None);
        }
        debug!("Loading metadata from cache file: {:?}", path);
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| ResolveError::Cache(format!("IO error: {e}")))
    }

    pub fn store_metadata(
        &self,
        group: &str,
        artifact: &str,
        repository: &str,
        data: &str,
    ) -> Result<()> {
        let path = self.metadata_path(group, artifact, repository);
        debug!("Saving metadata to cache file: {:?}", path);
        atomic_write_file(&path, data.as_bytes())
    }

    /// Checks if a cache file exists and is within the metadata TTL.
    pub fn is_cache_valid(&self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }

        let modified_time = fs::metadata(path)?.modified()?;
        let age = SystemTime::now()
            .duration_since(modified_time)
            .map_err(|e| ResolveError::Cache(format!("System time error: {e}")))?;

        Ok(age <= METADATA_TTL)
    }

    fn evict(&self, path: &Path) {
        for victim in [path.to_path_buf(), sidecar_path(path)] {
            if let Err(e) = fs::remove_file(&victim) {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!("Failed to remove cache file {}: {}", victim.display(), e);
                }
            }
        }
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(SIDECAR_SUFFIX);
    path.with_file_name(name)
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Writes through a temp file in the destination directory and renames it
/// over `path`.
fn atomic_write_file(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        ResolveError::Cache(format!("Cannot get parent directory for {}", path.display()))
    })?;
    fs::create_dir_all(dir)?;

    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;
    temp_file
        .persist(path)
        .map_err(|e| ResolveError::Io(Arc::new(e.error)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache() -> (TempDir, Cache) {
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(&Config::new(dir.path())).unwrap();
        (dir, cache)
    }

    #[test]
    fn store_then_load_round_trips_repository() {
        let (_dir, cache) = cache();
        let coord = Coordinate::new("org.example", "lib", "1.0");
        let stored = cache.store(&coord, "central", b"payload").unwrap();
        assert!(stored
            .path
            .ends_with("org/example/lib/1.0/jar/lib-1.0.jar"));

        let loaded = cache.load(&coord).unwrap().expect("cache hit");
        assert_eq!(loaded, stored);
        assert_eq!(loaded.repository, "central");
        assert_eq!(loaded.size, 7);
    }

    #[test]
    fn tampered_payload_is_evicted() {
        let (_dir, cache) = cache();
        let coord = Coordinate::new("org.example", "lib", "1.0");
        let stored = cache.store(&coord, "central", b"payload").unwrap();
        fs::write(&stored.path, b"tampered").unwrap();

        assert!(cache.load(&coord).unwrap().is_none());
        assert!(!stored.path.exists());
        assert!(!sidecar_path(&stored.path).exists());
    }

    #[test]
    fn payload_without_sidecar_is_a_miss() {
        let (_dir, cache) = cache();
        let coord = Coordinate::new("org.example", "lib", "1.0").with_classifier("sources");
        let path = cache.entry_path(&coord);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"half written").unwrap();

        assert!(path.ends_with("org/example/lib/1.0/sources-jar/lib-1.0-sources.jar"));
        assert!(cache.load(&coord).unwrap().is_none());
    }

    #[test]
    fn metadata_is_cached_per_repository() {
        let (_dir, cache) = cache();
        cache
            .store_metadata("org.example", "lib", "central", "<metadata/>")
            .unwrap();
        assert_eq!(
            cache
                .load_metadata("org.example", "lib", "central")
                .unwrap()
                .as_deref(),
            Some("<metadata/>")
        );
        assert!(cache
            .load_metadata("org.example", "lib", "other")
            .unwrap()
            .is_none());
    }
}
