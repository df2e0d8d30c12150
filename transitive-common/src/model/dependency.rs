// transitive-common/src/model/dependency.rs
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::coordinate::{Coordinate, MediationKey};
use crate::error::{ResolveError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Compile,
    Runtime,
    Provided,
    Test,
    System,
    /// Only valid inside `<dependencyManagement>`; never becomes a graph edge.
    Import,
}

impl Scope {
    /// Whether a dependency declared with this scope is followed past the
    /// artifact that declares it.
    pub fn propagates(self) -> bool {
        matches!(self, Scope::Compile | Scope::Runtime)
    }

    /// Effective scope of a dependency declared as `declared` by a node that
    /// was itself pulled in as `self`. `None` means the edge is not followed.
    pub fn transitive(self, declared: Scope) -> Option<Scope> {
        if !declared.propagates() {
            return None;
        }
        match (self, declared) {
            (Scope::Compile, declared) => Some(declared),
            (Scope::Runtime, _) => Some(Scope::Runtime),
            (Scope::Provided, _) => Some(Scope::Provided),
            (Scope::Test, _) => Some(Scope::Test),
            (Scope::System | Scope::Import, _) => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Scope::Compile => 4,
            Scope::Runtime => 3,
            Scope::Provided | Scope::System => 2,
            Scope::Test => 1,
            Scope::Import => 0,
        }
    }

    /// The wider of two scopes; a node reached as both compile and runtime is
    /// compile.
    pub fn widest(self, other: Scope) -> Scope {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Whether a node with `effective` scope belongs on the classpath when
    /// `self` was requested.
    pub fn classpath_includes(self, effective: Scope) -> bool {
        match self {
            Scope::Compile => matches!(effective, Scope::Compile | Scope::Provided | Scope::System),
            Scope::Runtime => matches!(effective, Scope::Compile | Scope::Runtime),
            Scope::Provided => matches!(effective, Scope::Compile | Scope::Provided),
            Scope::Test => effective != Scope::Import,
            Scope::System => effective == Scope::System,
            Scope::Import => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Compile => "compile",
            Scope::Runtime => "runtime",
            Scope::Provided => "provided",
            Scope::Test => "test",
            Scope::System => "system",
            Scope::Import => "import",
        }
    }
}

impl FromStr for Scope {
    type Err = ResolveError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compile" => Ok(Scope::Compile),
            "runtime" => Ok(Scope::Runtime),
            "provided" => Ok(Scope::Provided),
            "test" => Ok(Scope::Test),
            "system" => Ok(Scope::System),
            "import" => Ok(Scope::Import),
            other => Err(ResolveError::Validation(format!("Unknown scope '{other}'"))),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(group, artifact)` pattern removed from everything below the edge that
/// declares it. Either side may be `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Exclusion {
    pub group: String,
    pub artifact: String,
}

impl Exclusion {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
        }
    }

    pub fn matches(&self, key: &MediationKey) -> bool {
        (self.group == "*" || self.group == key.group)
            && (self.artifact == "*" || self.artifact == key.artifact)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub coordinate: Coordinate,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub exclusions: BTreeSet<Exclusion>,
}

impl Dependency {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            scope: Scope::Compile,
            optional: false,
            exclusions: BTreeSet::new(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn exclude(mut self, group: impl Into<String>, artifact: impl Into<String>) -> Self {
        self.exclusions.insert(Exclusion::new(group, artifact));
        self
    }

    pub fn is_excluded_by(&self, exclusions: &BTreeSet<Exclusion>) -> bool {
        let key = self.coordinate.key();
        exclusions.iter().any(|e| e.matches(&key))
    }
}

/// The effective dependency list of one coordinate, after parent inheritance,
/// property interpolation and dependency management have been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub coordinate: Coordinate,
    pub packaging: String,
    pub dependencies: Vec<Dependency>,
}

impl Descriptor {
    pub fn new(coordinate: Coordinate, dependencies: Vec<Dependency>) -> Self {
        Self {
            coordinate,
            packaging: "jar".to_string(),
            dependencies,
        }
    }

    pub fn is_pom_only(&self) -> bool {
        self.packaging == "pom"
    }
}

pub fn parse_scope(value: Option<&str>) -> Result<Scope> {
    value.map_or(Ok(Scope::Compile), str::parse)
}
