pub mod cas;
pub mod manifest;
pub mod paths;
pub mod resolver;
pub mod transport;

pub use cas::{Cas, CasError, hash_archive};
pub use manifest::{ManifestError, parse_manifest, render_manifest, upsert_dependency};
pub use paths::*;
pub use resolver::{
    CapabilityChange, DependencyEdit, ResolutionResult, Resolver, ResolverError,
    prompt_capability_changes,
};
pub use transport::{FetchResult, Transport, TransportError, TransportRegistry};
