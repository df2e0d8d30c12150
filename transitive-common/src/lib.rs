// transitive-common/src/lib.rs
pub mod cache;
pub mod config;
pub mod error;
pub mod model;

// Re-export key types
pub use cache::{Cache, CacheEntry};
pub use config::Config;
pub use error::{ResolveError, Result};
pub use model::{
    Coordinate, Dependency, Descriptor, Exclusion, MediationKey, Mediation, RepositoryDescriptor,
    Resolution, ResolutionWarning, ResolvedArtifact, Scope,
};
