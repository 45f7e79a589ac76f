//! Lockfile structure.
//!
//! `JANUS.lock` pins every resolved package to a content id. A resolution
//! pass never edits a lockfile in place: it builds a fresh one and keeps the
//! previous one only as a comparison baseline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ResolvedPackage;

/// Current lockfile format version.
pub const LOCKFILE_VERSION: u32 = 1;

/// The resolved dependency graph, keyed by package name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    /// Lockfile format version.
    pub version: u32,
    /// Resolved packages, sorted by name for deterministic output.
    #[serde(default)]
    pub packages: BTreeMap<String, ResolvedPackage>,
}

impl Lockfile {
    /// Create a new empty lockfile.
    pub fn new() -> Self {
        Self {
            version: LOCKFILE_VERSION,
            packages: BTreeMap::new(),
        }
    }

    /// Build a lockfile from an already-resolved package map.
    pub fn from_packages(packages: BTreeMap<String, ResolvedPackage>) -> Self {
        Self {
            version: LOCKFILE_VERSION,
            packages,
        }
    }

    /// Find a package by name.
    pub fn get(&self, name: &str) -> Option<&ResolvedPackage> {
        self.packages.get(name)
    }

    /// Whether a package of this name is pinned.
    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Insert a package under its own name, returning any previous entry.
    pub fn insert(&mut self, pkg: ResolvedPackage) -> Option<ResolvedPackage> {
        self.packages.insert(pkg.name.clone(), pkg)
    }

    /// Number of pinned packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the lockfile pins nothing.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl Default for Lockfile {
    fn default() -> Self {
        Self::new()
    }
}
