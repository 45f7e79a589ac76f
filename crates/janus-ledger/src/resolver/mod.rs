//! Dependency resolution.
//!
//! Turns a manifest into a fresh lockfile. Each pass fetches whatever the
//! previous lockfile cannot vouch for, stores it in the CAS, and reports
//! how the result differs from the previous lockfile. Nothing is written
//! until [`Resolver::commit`] is called, and any capability change must be
//! approved first.

mod capability;
mod persist;

pub use capability::{CapabilityChange, diff_capabilities, prompt_capability_changes};
pub use persist::{
    load_lockfile, load_manifest, save_lockfile, save_manifest, write_dependency,
};

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

use janus_schema::{
    Capability, ContentId, Lockfile, Manifest, PackageRef, ResolvedPackage, Source,
};
use thiserror::Error;

use crate::cas::{Cas, CasError, hash_archive};
use crate::manifest::ManifestError;
use crate::paths;
use crate::transport::{TransportError, TransportRegistry};

/// Version recorded when the transport reports none.
pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("Failed to parse {}: {source}", .path.display())]
    ManifestParse {
        path: PathBuf,
        source: ManifestError,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    LockfileParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid capability on '{package}': {reason}")]
    InvalidCapability { package: String, reason: String },

    #[error("Dependency '{name}' not found: {reason}")]
    DependencyNotFound { name: String, reason: String },

    // Never raised: duplicate names are skipped, not treated as cycles.
    #[error("Circular dependency detected at '{0}'")]
    CircularDependency(String),

    #[error("{0} capability change(s) need approval")]
    CapabilityChangeDetected(usize),

    #[error("Capability changes were not approved")]
    UserRejectedChanges,

    #[error("Integrity check failed for '{name}': expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to fetch '{name}': {source}")]
    Transport {
        name: String,
        source: TransportError,
    },

    #[error("CAS error: {0}")]
    Cas(#[from] CasError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ResolverError {
    fn from_transport(name: &str, err: TransportError) -> Self {
        match err {
            TransportError::ContentNotFound(reason) => Self::DependencyNotFound {
                name: name.to_string(),
                reason,
            },
            TransportError::IntegrityCheckFailed { expected, actual } => {
                Self::IntegrityCheckFailed {
                    name: name.to_string(),
                    expected: expected.to_hex(),
                    actual: actual.to_hex(),
                }
            }
            other => Self::Transport {
                name: name.to_string(),
                source: other,
            },
        }
    }
}

/// A declaration [`Resolver::commit`] writes into `janus.pkg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdit {
    /// The declaration as it will be written.
    pub dependency: PackageRef,
    /// Written as a `dev-dependency` block.
    pub is_dev: bool,
}

/// Outcome of a resolution pass. Nothing has been written yet.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    /// The new lockfile, built from scratch.
    pub lockfile: Lockfile,
    /// The edited manifest, when the pass changed it (`add_dependency`).
    pub manifest: Option<Manifest>,
    /// The declaration behind [`ResolutionResult::manifest`]; commit splices
    /// only this block into the file on disk.
    pub manifest_edit: Option<DependencyEdit>,
    /// Capability differences against the previous lockfile.
    pub capability_changes: Vec<CapabilityChange>,
    /// Names not pinned before.
    pub packages_added: Vec<String>,
    /// Names pinned before with a different content id.
    pub packages_updated: Vec<String>,
    /// Names pinned before and no longer resolved.
    pub packages_removed: Vec<String>,
}

impl ResolutionResult {
    /// Whether the new lockfile differs from the old one in any reported way.
    pub fn has_changes(&self) -> bool {
        !(self.capability_changes.is_empty()
            && self.packages_added.is_empty()
            && self.packages_updated.is_empty()
            && self.packages_removed.is_empty())
    }

    /// Fail if any capability changed. For non-interactive runs where
    /// nobody can approve.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::CapabilityChangeDetected`] with the number of
    /// changes.
    pub fn ensure_no_capability_changes(&self) -> Result<(), ResolverError> {
        if self.capability_changes.is_empty() {
            Ok(())
        } else {
            Err(ResolverError::CapabilityChangeDetected(
                self.capability_changes.len(),
            ))
        }
    }
}

/// Resolves a project's dependencies against one CAS and one transport
/// registry.
#[derive(Debug)]
pub struct Resolver {
    project_root: PathBuf,
    cas: Cas,
    registry: TransportRegistry,
}

impl Resolver {
    /// A resolver for `project_root` using the shared CAS (or a project-local
    /// one when no home directory exists) and the default transports.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Cas`] if the store directory cannot be created.
    pub fn new(project_root: impl Into<PathBuf>) -> Result<Self, ResolverError> {
        let project_root = project_root.into();
        let cas_root =
            paths::cas_path().unwrap_or_else(|| paths::project_cas_path(&project_root));
        let cas = Cas::with_root(cas_root)?;
        Ok(Self::with_components(
            project_root,
            cas,
            TransportRegistry::with_defaults(),
        ))
    }

    /// A resolver with an explicit store and registry.
    pub fn with_components(
        project_root: impl Into<PathBuf>,
        cas: Cas,
        registry: TransportRegistry,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            cas,
            registry,
        }
    }

    /// Directory holding `janus.pkg` and `JANUS.lock`.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// The store fetched content is written to.
    pub fn cas(&self) -> &Cas {
        &self.cas
    }

    /// The transports sources are fetched through.
    pub fn registry(&self) -> &TransportRegistry {
        &self.registry
    }

    /// Declare a new dependency and resolve the whole manifest.
    ///
    /// A missing `janus.pkg` starts an empty manifest; a missing or
    /// unreadable `JANUS.lock` is treated as empty. An existing declaration
    /// of the same name is replaced. The edited manifest is returned in
    /// [`ResolutionResult::manifest`] and written by [`Resolver::commit`].
    ///
    /// # Errors
    ///
    /// Returns an error if the existing manifest is malformed or resolution
    /// fails, including [`ResolverError::InvalidCapability`] for an unnamed
    /// or repeated capability.
    pub fn add_dependency(
        &self,
        name: &str,
        source: Source,
        capabilities: Vec<Capability>,
        is_dev: bool,
    ) -> Result<ResolutionResult, ResolverError> {
        let mut manifest = load_manifest(&self.project_root)?.unwrap_or_default();
        let lockfile = match load_lockfile(&self.project_root) {
            Ok(lockfile) => lockfile.unwrap_or_default(),
            Err(ResolverError::LockfileParse { path, source: err }) => {
                tracing::warn!("Ignoring unreadable lockfile {}: {}", path.display(), err);
                Lockfile::new()
            }
            Err(e) => return Err(e),
        };

        manifest.dependencies.retain(|d| d.name != name);
        manifest.dev_dependencies.retain(|d| d.name != name);
        let dep = PackageRef {
            name: name.to_string(),
            source,
            capabilities,
        };
        if is_dev {
            manifest.dev_dependencies.push(dep.clone());
        } else {
            manifest.dependencies.push(dep.clone());
        }
        tracing::info!("Adding {}dependency '{}'", if is_dev { "dev-" } else { "" }, name);

        let mut result = self.resolve_from_manifest(&manifest, &lockfile)?;
        result.manifest = Some(manifest);
        result.manifest_edit = Some(DependencyEdit {
            dependency: dep,
            is_dev,
        });
        Ok(result)
    }

    /// Re-resolve the project's existing manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::ManifestNotFound`] without a `janus.pkg`,
    /// [`ResolverError::LockfileParse`] for a malformed `JANUS.lock`, or any
    /// resolution failure.
    pub fn update_dependencies(&self) -> Result<ResolutionResult, ResolverError> {
        let manifest = load_manifest(&self.project_root)?.ok_or_else(|| {
            ResolverError::ManifestNotFound(paths::manifest_path(&self.project_root))
        })?;
        let lockfile = load_lockfile(&self.project_root)?.unwrap_or_default();
        self.resolve_from_manifest(&manifest, &lockfile)
    }

    /// Resolve every dependency of `manifest`, using `old` as the baseline
    /// for cache hits and change reporting.
    ///
    /// Dependencies are processed in declaration order, runtime before dev;
    /// the first declaration of a name wins.
    ///
    /// # Errors
    ///
    /// Stops at the first dependency with an unnamed or repeated capability,
    /// or that cannot be fetched, stored or verified.
    pub fn resolve_from_manifest(
        &self,
        manifest: &Manifest,
        old: &Lockfile,
    ) -> Result<ResolutionResult, ResolverError> {
        let mut queue: VecDeque<PackageRef> = manifest.all_dependencies().cloned().collect();
        let mut resolved: BTreeMap<String, ResolvedPackage> = BTreeMap::new();
        let mut capability_changes = Vec::new();
        let mut packages_added = Vec::new();
        let mut packages_updated = Vec::new();

        tracing::debug!("Resolving {} dependencies", queue.len());

        while let Some(dep) = queue.pop_front() {
            if resolved.contains_key(&dep.name) {
                tracing::trace!("Skipping duplicate dependency '{}'", dep.name);
                continue;
            }

            validate_capabilities(&dep.name, &dep.capabilities)?;
            let previous = old.get(&dep.name);
            let package = self.resolve_package(&dep, previous)?;

            match previous {
                Some(previous) => {
                    capability_changes.extend(diff_capabilities(
                        &dep.name,
                        &previous.capabilities,
                        &package.capabilities,
                    ));
                    if previous.content_id != package.content_id {
                        packages_updated.push(dep.name.clone());
                    }
                }
                None => packages_added.push(dep.name.clone()),
            }

            // Only names are recorded for transitive dependencies; their
            // sources come from the previous lockfile.
            for child in &package.dependencies {
                if resolved.contains_key(child) {
                    continue;
                }
                let pinned = old.get(child).ok_or_else(|| ResolverError::DependencyNotFound {
                    name: child.clone(),
                    reason: format!("required by '{}' but not pinned", dep.name),
                })?;
                queue.push_back(PackageRef {
                    name: pinned.name.clone(),
                    source: pinned.source.clone(),
                    capabilities: pinned.capabilities.clone(),
                });
            }

            resolved.insert(dep.name.clone(), package);
        }

        let packages_removed: Vec<String> = old
            .packages
            .keys()
            .filter(|name| !resolved.contains_key(*name))
            .cloned()
            .collect();

        tracing::debug!(
            "Resolved {} packages ({} added, {} updated, {} removed, {} capability changes)",
            resolved.len(),
            packages_added.len(),
            packages_updated.len(),
            packages_removed.len(),
            capability_changes.len()
        );

        Ok(ResolutionResult {
            lockfile: Lockfile::from_packages(resolved),
            manifest: None,
            manifest_edit: None,
            capability_changes,
            packages_added,
            packages_updated,
            packages_removed,
        })
    }

    fn resolve_package(
        &self,
        dep: &PackageRef,
        previous: Option<&ResolvedPackage>,
    ) -> Result<ResolvedPackage, ResolverError> {
        if let Some(previous) = previous {
            if previous.source == dep.source && self.cas.exists(&previous.content_id) {
                tracing::trace!(
                    "Cache hit for '{}' ({})",
                    dep.name,
                    previous.content_id.short()
                );
                return Ok(ResolvedPackage {
                    capabilities: dep.capabilities.clone(),
                    ..previous.clone()
                });
            }
        }

        let url = source_url(&dep.source, &self.project_root);
        let checksum = match &dep.source {
            Source::Tar {
                checksum: Some(checksum),
                ..
            } => Some(checksum.as_str()),
            _ => None,
        };
        let expected = checksum.and_then(|c| ContentId::from_hex(c).ok());

        tracing::debug!("Fetching '{}' from {}", dep.name, url);
        let fetched = self
            .registry
            .fetch_with_verification(&url, expected.as_ref())
            .map_err(|e| ResolverError::from_transport(&dep.name, e))?;

        // A checksum that is not a content id can never match.
        if let (Some(checksum), None) = (checksum, expected) {
            return Err(ResolverError::IntegrityCheckFailed {
                name: dep.name.clone(),
                expected: checksum.to_string(),
                actual: fetched.content_id.to_hex(),
            });
        }

        let id = fetched.content_id;
        self.cas.store(&id, &fetched.content)?;
        if !self.cas.verify(&id)? {
            let actual = hash_archive(&self.cas.retrieve(&id)?);
            return Err(ResolverError::IntegrityCheckFailed {
                name: dep.name.clone(),
                expected: id.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let version = fetched
            .metadata
            .get("version")
            .cloned()
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        tracing::debug!("Resolved '{}' {} -> {}", dep.name, version, id.short());

        Ok(ResolvedPackage {
            name: dep.name.clone(),
            version,
            content_id: id,
            source: dep.source.clone(),
            capabilities: dep.capabilities.clone(),
            dependencies: Vec::new(),
        })
    }

    /// Persist a resolution: the manifest declaration (if the pass added
    /// one), then the lockfile.
    ///
    /// The rest of `janus.pkg` is kept as written, comments included.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::UserRejectedChanges`] when the result carries
    /// capability changes and `approved` is false; nothing is written then.
    pub fn commit(&self, result: &ResolutionResult, approved: bool) -> Result<(), ResolverError> {
        if !result.capability_changes.is_empty() && !approved {
            tracing::warn!(
                "Not writing {}: {} capability change(s) not approved",
                janus_schema::LOCK_FILE,
                result.capability_changes.len()
            );
            return Err(ResolverError::UserRejectedChanges);
        }

        if let Some(edit) = &result.manifest_edit {
            write_dependency(&self.project_root, &edit.dependency, edit.is_dev)?;
        }
        save_lockfile(&self.project_root, &result.lockfile)?;
        tracing::info!(
            "Locked {} packages in {}",
            result.lockfile.packages.len(),
            paths::lockfile_path(&self.project_root).display()
        );
        Ok(())
    }
}

/// Capabilities must be named, and each name may appear once per package.
fn validate_capabilities(package: &str, capabilities: &[Capability]) -> Result<(), ResolverError> {
    let invalid = |reason: String| ResolverError::InvalidCapability {
        package: package.to_string(),
        reason,
    };
    for (i, capability) in capabilities.iter().enumerate() {
        if capability.name.is_empty() {
            return Err(invalid("capability name is empty".to_string()));
        }
        if capabilities[..i].iter().any(|c| c.name == capability.name) {
            return Err(invalid(format!(
                "capability '{}' is declared twice",
                capability.name
            )));
        }
    }
    Ok(())
}

/// The transport URL for a declared source.
///
/// Git refs become a `#type=name` fragment; relative paths are taken from
/// `project_root`.
pub fn source_url(source: &Source, project_root: &Path) -> String {
    match source {
        Source::Git { url, reference } => {
            let base = url.split_once('#').map_or(url.as_str(), |(base, _)| base);
            format!("{base}#{}={}", reference.ref_type, reference.name)
        }
        Source::Tar { url, .. } => url.clone(),
        Source::Path { path } => {
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                project_root.join(path)
            };
            format!("file://{}", absolute.display())
        }
    }
}
