// transitive-common/src/model/coordinate.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, Result};

pub const DEFAULT_EXTENSION: &str = "jar";
pub const POM_EXTENSION: &str = "pom";

/// Identifies one artifact in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

/// Artifact identity with the version stripped. Mediation collapses every
/// coordinate sharing a key down to a single version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediationKey {
    pub group: String,
    pub artifact: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl Coordinate {
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
            classifier: None,
            extension: default_extension(),
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        let classifier = classifier.into();
        self.classifier = (!classifier.is_empty()).then_some(classifier);
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn at_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }

    /// Parses `group:artifact:version`, `group:artifact:extension:version` or
    /// `group:artifact:extension:classifier:version`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ResolveError::Validation(format!(
                "Invalid coordinate '{s}': empty segment"
            )));
        }
        match parts.as_slice() {
            [g, a, v] => Ok(Self::new(*g, *a, *v)),
            [g, a, e, v] => Ok(Self::new(*g, *a, *v).with_extension(*e)),
            [g, a, e, c, v] => Ok(Self::new(*g, *a, *v)
                .with_extension(*e)
                .with_classifier(*c)),
            _ => Err(ResolveError::Validation(format!(
                "Invalid coordinate '{s}': expected group:artifact[:extension[:classifier]]:version"
            ))),
        }
    }

    pub fn key(&self) -> MediationKey {
        MediationKey {
            group: self.group.clone(),
            artifact: self.artifact.clone(),
            classifier: self.classifier.clone(),
            extension: self.extension.clone(),
        }
    }

    /// The coordinate of the POM describing this artifact.
    pub fn descriptor(&self) -> Self {
        Self {
            group: self.group.clone(),
            artifact: self.artifact.clone(),
            version: self.version.clone(),
            classifier: None,
            extension: POM_EXTENSION.to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact, self.version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        }
    }

    pub fn group_path(&self) -> String {
        self.group.replace('.', "/")
    }

    /// Path relative to a Maven 2 layout repository root.
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group_path(),
            self.artifact,
            self.version,
            self.file_name()
        )
    }

    /// Leaf directory name inside the version directory of the local cache.
    pub fn cache_leaf(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!("{}-{}", classifier, self.extension),
            None => self.extension.clone(),
        }
    }
}

impl FromStr for Coordinate {
    type Err = ResolveError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Coordinate::parse(s)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)?;
        match &self.classifier {
            Some(classifier) => write!(f, ":{}:{}", self.extension, classifier)?,
            None if self.extension != DEFAULT_EXTENSION => write!(f, ":{}", self.extension)?,
            None => {}
        }
        write!(f, ":{}", self.version)
    }
}

impl MediationKey {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            classifier: None,
            extension: default_extension(),
        }
    }

    pub fn coordinate(&self, version: impl Into<String>) -> Coordinate {
        Coordinate {
            group: self.group.clone(),
            artifact: self.artifact.clone(),
            version: version.into(),
            classifier: self.classifier.clone(),
            extension: self.extension.clone(),
        }
    }
}

impl fmt::Display for MediationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)?;
        match &self.classifier {
            Some(classifier) => write!(f, ":{}:{}", self.extension, classifier),
            None if self.extension != DEFAULT_EXTENSION => write!(f, ":{}", self.extension),
            None => Ok(()),
        }
    }
}
