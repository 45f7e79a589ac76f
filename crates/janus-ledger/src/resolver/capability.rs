//! Capability diffs between a pinned package and its new resolution.

use std::fmt;
use std::io::{self, Write};

use janus_schema::Capability;

/// One difference in what a dependency is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityChange {
    /// The new resolution requests a capability the pin did not have.
    Added {
        package: String,
        capability: Capability,
    },
    /// A pinned capability is no longer requested.
    Removed {
        package: String,
        capability: Capability,
    },
    /// Same capability name, different parameters.
    Modified {
        package: String,
        old: Capability,
        new: Capability,
    },
}

impl CapabilityChange {
    /// The dependency the change belongs to.
    pub fn package(&self) -> &str {
        match self {
            Self::Added { package, .. }
            | Self::Removed { package, .. }
            | Self::Modified { package, .. } => package,
        }
    }

    /// Name of the capability that changed.
    pub fn capability_name(&self) -> &str {
        match self {
            Self::Added { capability, .. } | Self::Removed { capability, .. } => &capability.name,
            Self::Modified { new, .. } => &new.name,
        }
    }
}

impl fmt::Display for CapabilityChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added {
                package,
                capability,
            } => write!(f, "{package}: + {capability}"),
            Self::Removed {
                package,
                capability,
            } => write!(f, "{package}: - {capability}"),
            Self::Modified { package, old, new } => write!(f, "{package}: ~ {old} -> {new}"),
        }
    }
}

/// Compare capability sets by name: removals first, then additions, then
/// parameter changes.
///
/// Names are unique within each set; the parser and the resolver reject a
/// package that repeats one.
pub fn diff_capabilities(
    package: &str,
    old: &[Capability],
    new: &[Capability],
) -> Vec<CapabilityChange> {
    let find = |set: &[Capability], name: &str| set.iter().find(|c| c.name == name).cloned();
    let mut changes = Vec::new();

    for cap in old {
        if find(new, &cap.name).is_none() {
            changes.push(CapabilityChange::Removed {
                package: package.to_string(),
                capability: cap.clone(),
            });
        }
    }

    for cap in new {
        if find(old, &cap.name).is_none() {
            changes.push(CapabilityChange::Added {
                package: package.to_string(),
                capability: cap.clone(),
            });
        }
    }

    for cap in new {
        if let Some(previous) = find(old, &cap.name) {
            if previous.params != cap.params {
                changes.push(CapabilityChange::Modified {
                    package: package.to_string(),
                    old: previous,
                    new: cap.clone(),
                });
            }
        }
    }

    changes
}

/// Write a human-readable diff of `changes` to `out`.
///
/// Returns `true` (safe to apply without asking) only when there is nothing
/// to show. Any change, including a removal, needs explicit approval.
///
/// # Errors
///
/// Propagates write failures.
pub fn prompt_capability_changes(
    changes: &[CapabilityChange],
    out: &mut impl Write,
) -> io::Result<bool> {
    if changes.is_empty() {
        return Ok(true);
    }

    writeln!(out, "The following capability changes require approval:")?;

    let mut current: Option<&str> = None;
    for change in changes {
        if current != Some(change.package()) {
            writeln!(out)?;
            writeln!(out, "  {}", change.package())?;
            current = Some(change.package());
        }
        match change {
            CapabilityChange::Added { capability, .. } => {
                writeln!(out, "    + added    {capability}")?;
            }
            CapabilityChange::Removed { capability, .. } => {
                writeln!(out, "    - removed  {capability}")?;
            }
            CapabilityChange::Modified { old, new, .. } => {
                writeln!(out, "    ~ modified {}", new.name)?;
                writeln!(out, "        old: {old}")?;
                writeln!(out, "        new: {new}")?;
            }
        }
    }

    Ok(false)
}
