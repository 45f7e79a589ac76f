use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Returns the Janus home directory, or None if the user's home cannot be resolved.
///
/// `JANUS_HOME` overrides the default `~/.janus`.
pub fn try_janus_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("JANUS_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".janus"))
}

/// Shared content-addressed store: `~/.janus/cas`.
pub fn cas_path() -> Option<PathBuf> {
    try_janus_home().map(|h| h.join("cas"))
}

/// Project-local store used when no home directory can be resolved.
pub fn project_cas_path(project_root: &Path) -> PathBuf {
    project_root.join(".janus").join("cas")
}

/// `<project>/janus.pkg`
pub fn manifest_path(project_root: &Path) -> PathBuf {
    project_root.join(janus_schema::MANIFEST_FILE)
}

/// `<project>/JANUS.lock`
pub fn lockfile_path(project_root: &Path) -> PathBuf {
    project_root.join(janus_schema::LOCK_FILE)
}
