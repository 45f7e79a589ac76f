//! Shared data model for the Janus ledger.
//!
//! Everything that crosses a component boundary lives here: the
//! [`ContentId`] that names a blob in the content-addressed store, the
//! manifest-side [`PackageRef`] and the lockfile-side [`ResolvedPackage`].

pub mod hash;
pub mod lockfile;
pub mod types;

// Re-exports
pub use hash::*;
pub use lockfile::{LOCKFILE_VERSION, Lockfile};
pub use types::*;

/// File name of the human-authored manifest.
pub const MANIFEST_FILE: &str = "janus.pkg";

/// File name of the machine-authored lockfile.
pub const LOCK_FILE: &str = "JANUS.lock";
