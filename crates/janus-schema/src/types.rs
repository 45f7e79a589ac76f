//! Manifest and lockfile domain types.
//!
//! [`PackageRef`] is what a manifest declares; [`ResolvedPackage`] is what
//! the resolver pins. Both name their origin with a [`Source`] and carry the
//! [`Capability`] list the package asks for.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::ContentId;

/// Ref used when a git source names no `tag=`, `branch=` or `commit=`.
pub const DEFAULT_GIT_REF: &str = "main";

/// How a git source pins history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    /// An annotated or lightweight tag.
    Tag,
    /// The tip of a branch (default).
    #[default]
    Branch,
    /// A specific commit; requires full history to check out.
    Commit,
}

impl RefType {
    /// The qualifier keyword used in manifests and URL fragments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Branch => "branch",
            Self::Commit => "commit",
        }
    }

    /// Parse a `tag` / `branch` / `commit` qualifier.
    pub fn from_qualifier(s: &str) -> Option<Self> {
        match s {
            "tag" => Some(Self::Tag),
            "branch" => Some(Self::Branch),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A git ref together with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GitRef {
    /// Whether `name` is a tag, branch or commit.
    pub ref_type: RefType,
    /// The tag name, branch name or commit hash.
    pub name: String,
}

impl GitRef {
    /// A tag ref.
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            ref_type: RefType::Tag,
            name: name.into(),
        }
    }

    /// A branch ref.
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            ref_type: RefType::Branch,
            name: name.into(),
        }
    }

    /// A commit ref.
    pub fn commit(name: impl Into<String>) -> Self {
        Self {
            ref_type: RefType::Commit,
            name: name.into(),
        }
    }
}

impl Default for GitRef {
    fn default() -> Self {
        Self::branch(DEFAULT_GIT_REF)
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.ref_type, self.name)
    }
}

/// Where a dependency's bytes come from. Exactly one variant per reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    /// A git repository reached over HTTPS.
    Git {
        /// Repository URL, optionally prefixed with `git+`.
        url: String,
        /// The ref to check out.
        #[serde(rename = "ref")]
        reference: GitRef,
    },
    /// A tarball at a URL.
    Tar {
        /// Location of the archive.
        url: String,
        /// Expected content id of the fetched archive, if pinned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum: Option<String>,
    },
    /// A file or directory on the local filesystem.
    Path {
        /// Path, relative paths are taken from the project root.
        path: PathBuf,
    },
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Git { url, reference } => write!(f, "git {url} ({reference})"),
            Self::Tar { url, .. } => write!(f, "tar {url}"),
            Self::Path { path } => write!(f, "path {}", path.display()),
        }
    }
}

/// A named, parameterized permission a dependency declares it needs.
///
/// Equality is structural: same name and the same parameter map. The map is
/// ordered so declaration order never matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    /// Capability name, e.g. `fs` or `net`.
    pub name: String,
    /// Parameters narrowing the capability, e.g. `path = "/tmp"`.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Capability {
    /// A capability with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add (or replace) a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, "({})", params.join(", "))?;
        }
        Ok(())
    }
}

/// A dependency as declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    /// Package name, unique within a resolution.
    pub name: String,
    /// Where to fetch it from.
    pub source: Source,
    /// Capabilities the dependency declares.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl PackageRef {
    /// A reference with no declared capabilities.
    pub fn new(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            source,
            capabilities: Vec::new(),
        }
    }

    /// Append a declared capability.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }
}

/// Parsed `janus.pkg`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Project name.
    pub name: String,
    /// Project version string.
    pub version: String,
    /// Runtime dependencies, in declaration order.
    pub dependencies: Vec<PackageRef>,
    /// Development-only dependencies, in declaration order.
    pub dev_dependencies: Vec<PackageRef>,
}

impl Manifest {
    /// Direct dependencies followed by dev dependencies.
    pub fn all_dependencies(&self) -> impl Iterator<Item = &PackageRef> {
        self.dependencies.iter().chain(self.dev_dependencies.iter())
    }
}

/// A dependency after resolution, pinned to a content id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPackage {
    /// Package name.
    pub name: String,
    /// Version reported by the transport, `"unknown"` when it reports none.
    pub version: String,
    /// Identity of the stored content.
    pub content_id: ContentId,
    /// Where the content was fetched from.
    pub source: Source,
    /// Capabilities granted at resolution time.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Names of this package's own dependencies.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ResolvedPackage {
    /// Look up a granted capability by name.
    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_equality_ignores_param_order() {
        let a = Capability::new("fs")
            .with_param("path", "/tmp")
            .with_param("mode", "ro");
        let b = Capability::new("fs")
            .with_param("mode", "ro")
            .with_param("path", "/tmp");
        assert_eq!(a, b);
        assert_ne!(a, Capability::new("fs").with_param("path", "/tmp"));
    }

    #[test]
    fn default_git_ref_is_main_branch() {
        let r = GitRef::default();
        assert_eq!(r.ref_type, RefType::Branch);
        assert_eq!(r.name, "main");
        assert_eq!(r.to_string(), "branch=main");
    }

    #[test]
    fn source_serializes_with_type_tag() {
        let source = Source::Git {
            url: "https://example.com/a.git".into(),
            reference: GitRef::tag("v1"),
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["type"], "git");
        assert_eq!(json["ref"]["ref_type"], "tag");
        assert_eq!(json["ref"]["name"], "v1");

        let tar = Source::Tar {
            url: "file:///tmp/a.tar".into(),
            checksum: None,
        };
        let json = serde_json::to_value(&tar).unwrap();
        assert!(json.get("checksum").is_none());
    }

    #[test]
    fn capability_display_lists_params() {
        let cap = Capability::new("net").with_param("host", "example.com");
        assert_eq!(cap.to_string(), "net(host=example.com)");
        assert_eq!(Capability::new("clock").to_string(), "clock");
    }
}
