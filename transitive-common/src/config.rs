// transitive-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use tracing::debug;

use super::error::{ResolveError, Result};
use crate::model::repository::{by_priority, RepositoryDescriptor};

// Fallback when no per-user cache directory can be determined.
const DEFAULT_FALLBACK_CACHE_DIR: &str = "target/local-repo";
const DEFAULT_WORKERS: usize = 8;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRIES: u32 = 2;

/// Caller-owned settings for one resolver session. Nothing here is global;
/// two sessions with different configs can run side by side.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub repositories: Vec<RepositoryDescriptor>,
    pub workers: usize,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub retries: u32,
}

impl Config {
    /// Config rooted at `cache_dir` with every other setting at its default.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            repositories: vec![RepositoryDescriptor::maven_central()],
            workers: DEFAULT_WORKERS,
            request_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }

    pub fn load() -> Result<Self> {
        debug!("Loading transitive configuration");

        let cache_dir = env::var("TRANSITIVE_CACHE_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir);
        debug!("Effective cache directory: {}", cache_dir.display());

        let mut config = Self::new(cache_dir);

        if let Some(raw) = env::var("TRANSITIVE_REPOSITORIES").ok().filter(|s| !s.is_empty()) {
            config.repositories = parse_repositories(&raw)?;
        }
        if let Some(raw) = env::var("TRANSITIVE_WORKERS").ok().filter(|s| !s.is_empty()) {
            let workers = raw.parse::<usize>().map_err(|e| {
                ResolveError::Config(format!("Invalid TRANSITIVE_WORKERS '{raw}': {e}"))
            })?;
            config = config.with_workers(workers);
        }
        if let Some(raw) = env::var("TRANSITIVE_TIMEOUT").ok().filter(|s| !s.is_empty()) {
            config.request_timeout = humantime::parse_duration(&raw).map_err(|e| {
                ResolveError::Config(format!("Invalid TRANSITIVE_TIMEOUT '{raw}': {e}"))
            })?;
        }
        if let Some(raw) = env::var("TRANSITIVE_RETRIES").ok().filter(|s| !s.is_empty()) {
            config.retries = raw.parse::<u32>().map_err(|e| {
                ResolveError::Config(format!("Invalid TRANSITIVE_RETRIES '{raw}': {e}"))
            })?;
        }

        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    pub fn with_repositories(mut self, repositories: Vec<RepositoryDescriptor>) -> Self {
        self.repositories = by_priority(repositories);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory holding the versions of one artifact.
    pub fn artifact_dir(&self, group: &str, artifact: &str) -> PathBuf {
        group
            .split('.')
            .fold(self.cache_dir.clone(), |dir, part| dir.join(part))
            .join(artifact)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(default_cache_dir())
    }
}

fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("", "", "transitive").map_or_else(
        || {
            debug!(
                "No user cache directory available, falling back to default: {}",
                DEFAULT_FALLBACK_CACHE_DIR
            );
            PathBuf::from(DEFAULT_FALLBACK_CACHE_DIR)
        },
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

/// Parses `id=url[,id=url...]`; position in the list becomes the priority.
pub fn parse_repositories(raw: &str) -> Result<Vec<RepositoryDescriptor>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(priority, entry)| {
            let (id, url) = entry.split_once('=').ok_or_else(|| {
                ResolveError::Config(format!(
                    "Invalid repository entry '{entry}': expected id=url"
                ))
            })?;
            RepositoryDescriptor::new(id.trim(), url.trim(), priority as i32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repository_list_in_priority_order() {
        let repos =
            parse_repositories("corp=https://repo.corp.example/maven, central=https://repo1.maven.org/maven2/")
                .unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].id, "corp");
        assert_eq!(repos[0].priority, 0);
        assert_eq!(repos[1].id, "central");
        assert_eq!(repos[1].priority, 1);

        assert!(parse_repositories("no-equals-sign").is_err());
        assert!(parse_repositories("bad=ftp://example.com").is_err());
    }

    #[test]
    fn artifact_dir_splits_group() {
        let config = Config::new("/cache");
        assert_eq!(
            config.artifact_dir("org.apache.commons", "commons-lang3"),
            Path::new("/cache/org/apache/commons/commons-lang3")
        );
    }

    // The only test in this crate that touches TRANSITIVE_* variables.
    #[test]
    fn load_reads_environment_overrides() {
        env::set_var("TRANSITIVE_CACHE_DIR", "/tmp/transitive-env-cache");
        env::set_var("TRANSITIVE_REPOSITORIES", "corp=https://repo.corp.example/maven");
        env::set_var("TRANSITIVE_WORKERS", "3");
        env::set_var("TRANSITIVE_TIMEOUT", "1m 30s");
        env::set_var("TRANSITIVE_RETRIES", "5");
        let loaded = Config::load();
        env::set_var("TRANSITIVE_WORKERS", "many");
        let invalid = Config::load();
        for var in [
            "TRANSITIVE_CACHE_DIR",
            "TRANSITIVE_REPOSITORIES",
            "TRANSITIVE_WORKERS",
            "TRANSITIVE_TIMEOUT",
            "TRANSITIVE_RETRIES",
        ] {
            env::remove_var(var);
        }

        let config = loaded.unwrap();
        assert_eq!(config.cache_dir(), Path::new("/tmp/transitive-env-cache"));
        assert_eq!(config.repositories.len(), 1);
        assert_eq!(config.repositories[0].id, "corp");
        assert_eq!(config.workers, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        assert_eq!(config.retries, 5);
        assert!(matches!(invalid, Err(ResolveError::Config(_))));
    }

    #[test]
    fn workers_never_zero() {
        assert_eq!(Config::new("/cache").with_workers(0).workers, 1);
        assert_eq!(Config::new("/cache").workers, 8);
    }
}
