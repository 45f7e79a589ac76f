//! Reading and writing `janus.pkg` and `JANUS.lock`.
//!
//! A missing file is `Ok(None)` so a first run starts from empty state.

use std::fs;
use std::io;
use std::path::Path;

use janus_schema::{Lockfile, Manifest, PackageRef};

use super::ResolverError;
use crate::manifest::{parse_manifest, render_manifest, upsert_dependency};
use crate::paths::{lockfile_path, manifest_path};

fn read_optional(path: &Path) -> Result<Option<String>, ResolverError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Load `<project_root>/janus.pkg`.
///
/// # Errors
///
/// Returns [`ResolverError::ManifestParse`] for a malformed manifest.
pub fn load_manifest(project_root: &Path) -> Result<Option<Manifest>, ResolverError> {
    let path = manifest_path(project_root);
    let Some(content) = read_optional(&path)? else {
        return Ok(None);
    };
    let manifest =
        parse_manifest(&content).map_err(|source| ResolverError::ManifestParse { path, source })?;
    Ok(Some(manifest))
}

/// Write `<project_root>/janus.pkg` in canonical form.
///
/// # Errors
///
/// Returns [`ResolverError::Io`] if the file cannot be written.
pub fn save_manifest(project_root: &Path, manifest: &Manifest) -> Result<(), ResolverError> {
    let path = manifest_path(project_root);
    fs::write(&path, render_manifest(manifest))?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Declare `dep` in `<project_root>/janus.pkg`, creating the file if needed.
///
/// Only the dependency's own block changes; comments and nodes the parser
/// does not know are kept as written.
///
/// # Errors
///
/// Returns [`ResolverError::ManifestParse`] if the existing manifest is
/// malformed, or [`ResolverError::Io`] if it cannot be read or written.
pub fn write_dependency(
    project_root: &Path,
    dep: &PackageRef,
    is_dev: bool,
) -> Result<(), ResolverError> {
    let path = manifest_path(project_root);
    let current = read_optional(&path)?.unwrap_or_default();
    let updated = match upsert_dependency(&current, dep, is_dev) {
        Ok(updated) => updated,
        Err(source) => return Err(ResolverError::ManifestParse { path, source }),
    };
    fs::write(&path, updated)?;
    tracing::debug!("Declared '{}' in {}", dep.name, path.display());
    Ok(())
}

/// Load `<project_root>/JANUS.lock`.
///
/// # Errors
///
/// Returns [`ResolverError::LockfileParse`] if the file is not a valid
/// lockfile.
pub fn load_lockfile(project_root: &Path) -> Result<Option<Lockfile>, ResolverError> {
    let path = lockfile_path(project_root);
    let Some(content) = read_optional(&path)? else {
        return Ok(None);
    };
    let lockfile = serde_json::from_str(&content)
        .map_err(|source| ResolverError::LockfileParse { path, source })?;
    Ok(Some(lockfile))
}

/// Write `<project_root>/JANUS.lock` as pretty-printed JSON.
///
/// The file is overwritten in place, not replaced atomically.
///
/// # Errors
///
/// Returns [`ResolverError::Io`] if the file cannot be written.
pub fn save_lockfile(project_root: &Path, lockfile: &Lockfile) -> Result<(), ResolverError> {
    let path = lockfile_path(project_root);
    let mut content = serde_json::to_string_pretty(lockfile).map_err(io::Error::other)?;
    content.push('\n');
    fs::write(&path, content)?;
    tracing::debug!(
        "Wrote {} ({} packages)",
        path.display(),
        lockfile.packages.len()
    );
    Ok(())
}
