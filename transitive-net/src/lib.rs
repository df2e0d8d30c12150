// transitive-net/src/lib.rs
pub mod client;
pub mod http;
pub mod metadata;
pub mod pom;
pub mod single_flight;
pub mod validation;

pub use client::RepositoryClient;
pub use http::{build_http_client, fetch_with_retry, FetchOutcome};
pub use transitive_common::{
    cache::Cache,
    error::{ResolveError, Result},
    Config,
};
pub use validation::validate_url;
