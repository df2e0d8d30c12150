// transitive-common/src/model/mod.rs
pub mod artifact;
pub mod coordinate;
pub mod dependency;
pub mod repository;

// Re-export
pub use artifact::{Mediation, Resolution, ResolutionWarning, ResolvedArtifact};
pub use coordinate::{Coordinate, MediationKey};
pub use dependency::{Dependency, Descriptor, Exclusion, Scope};
pub use repository::RepositoryDescriptor;
