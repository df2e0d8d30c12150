// transitive-common/src/model/artifact.rs
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::coordinate::{Coordinate, MediationKey};

/// An artifact that has been downloaded (or found) in the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    pub coordinate: Coordinate,
    /// Id of the repository the payload originally came from.
    pub source_repository: String,
    pub local_path: PathBuf,
}

/// Something the caller should know about that did not fail the resolution,
/// e.g. an optional dependency that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionWarning {
    pub coordinate: String,
    pub message: String,
}

/// Which version won a mediation key and which versions were omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mediation {
    pub key: MediationKey,
    pub selected: String,
    pub omitted: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub artifacts: Vec<ResolvedArtifact>,
    pub warnings: Vec<ResolutionWarning>,
    pub mediations: Vec<Mediation>,
}

impl Resolution {
    pub fn coordinates(&self) -> impl Iterator<Item = &Coordinate> {
        self.artifacts.iter().map(|a| &a.coordinate)
    }
}
