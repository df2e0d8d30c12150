// transitive-common/src/model/repository.rs
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ResolveError, Result};

pub const MAVEN_CENTRAL_ID: &str = "central";
pub const MAVEN_CENTRAL_URL: &str = "https://repo1.maven.org/maven2/";

/// A remote Maven 2 layout repository. Lower `priority` is queried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub id: String,
    pub base_url: String,
    #[serde(default)]
    pub priority: i32,
}

impl RepositoryDescriptor {
    /// Validates that `base_url` is an absolute http(s) URL and normalizes it
    /// to end with a slash so relative joins keep the last path segment.
    pub fn new(id: impl Into<String>, base_url: &str, priority: i32) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ResolveError::Validation(format!(
                "Repository id for '{base_url}' must not be empty"
            )));
        }
        let url = Url::parse(base_url).map_err(|e| {
            ResolveError::Validation(format!("Failed to parse repository URL '{base_url}': {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ResolveError::Validation(format!(
                "Invalid URL scheme for repository '{}': must be http or https, but got '{}'",
                id,
                url.scheme()
            )));
        }
        let mut base_url = url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            id,
            base_url,
            priority,
        })
    }

    pub fn maven_central() -> Self {
        Self {
            id: MAVEN_CENTRAL_ID.to_string(),
            base_url: MAVEN_CENTRAL_URL.to_string(),
            priority: 0,
        }
    }

    /// Absolute URL of a path relative to the repository root.
    pub fn url_for(&self, relative: &str) -> String {
        format!("{}{}", self.base_url, relative.trim_start_matches('/'))
    }
}

/// Orders repositories for querying. Stable, so equal priorities keep the
/// order the caller supplied them in.
pub fn by_priority(mut repositories: Vec<RepositoryDescriptor>) -> Vec<RepositoryDescriptor> {
    if repositories.is_empty() {
        repositories.push(RepositoryDescriptor::maven_central());
    }
    repositories.sort_by_key(|r| r.priority);
    repositories
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_and_non_http_urls() {
        assert!(RepositoryDescriptor::new("local", "file:///tmp/repo", 0).is_err());
        assert!(RepositoryDescriptor::new("rel", "maven2/", 0).is_err());
        assert!(RepositoryDescriptor::new("", "https://repo.example.com", 0).is_err());
    }

    #[test]
    fn normalizes_trailing_slash() {
        let repo = RepositoryDescriptor::new("corp", "https://repo.example.com/maven", 1).unwrap();
        assert_eq!(repo.base_url, "https://repo.example.com/maven/");
        assert_eq!(
            repo.url_for("/org/example/a/1.0/a-1.0.pom"),
            "https://repo.example.com/maven/org/example/a/1.0/a-1.0.pom"
        );
    }

    #[test]
    fn empty_list_defaults_to_central_and_sorting_is_stable() {
        assert_eq!(by_priority(Vec::new()), vec![RepositoryDescriptor::maven_central()]);

        let a = RepositoryDescriptor::new("a", "https://a.example.com/", 5).unwrap();
        let b = RepositoryDescriptor::new("b", "https://b.example.com/", 1).unwrap();
        let c = RepositoryDescriptor::new("c", "https://c.example.com/", 5).unwrap();
        let ids: Vec<_> = by_priority(vec![a, b, c])
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }
}
