use std::fmt::Write;

use janus_schema::{Capability, Manifest, PackageRef, Source};

use super::lexer::is_identifier;

/// Render a manifest in canonical `janus.pkg` form.
///
/// Git refs are always written with their qualifier, so parsing the output
/// yields the same manifest.
pub fn render_manifest(manifest: &Manifest) -> String {
    let mut out = String::new();

    if !manifest.name.is_empty() {
        let _ = writeln!(out, "name {}", quote(&manifest.name));
    }
    if !manifest.version.is_empty() {
        let _ = writeln!(out, "version {}", quote(&manifest.version));
    }

    let blocks = manifest
        .dependencies
        .iter()
        .map(|dep| render_dependency(dep, false))
        .chain(
            manifest
                .dev_dependencies
                .iter()
                .map(|dep| render_dependency(dep, true)),
        );
    for block in blocks {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&block);
    }

    out
}

/// One `dependency` (or `dev-dependency`) block, newline-terminated.
pub(crate) fn render_dependency(dep: &PackageRef, is_dev: bool) -> String {
    let node = if is_dev { "dev-dependency" } else { "dependency" };
    let mut out = String::new();
    let _ = writeln!(out, "{node} {} {{", quote(&dep.name));

    match &dep.source {
        Source::Git { url, reference } => {
            let _ = writeln!(
                out,
                "    git {} {}={}",
                quote(url),
                reference.ref_type,
                quote(&reference.name)
            );
        }
        Source::Tar { url, checksum } => {
            let _ = write!(out, "    tar {}", quote(url));
            if let Some(checksum) = checksum {
                let _ = write!(out, " checksum={}", quote(checksum));
            }
            out.push('\n');
        }
        Source::Path { path } => {
            let _ = writeln!(out, "    path {}", quote(&path.to_string_lossy()));
        }
    }

    for capability in &dep.capabilities {
        render_capability(&mut out, capability);
    }

    out.push_str("}\n");
    out
}

fn render_capability(out: &mut String, capability: &Capability) {
    let _ = write!(out, "    capability {}", quote(&capability.name));
    for (key, value) in &capability.params {
        if is_identifier(key) {
            let _ = write!(out, " {key}={}", quote(value));
        } else {
            let _ = write!(out, " {}={}", quote(key), quote(value));
        }
    }
    out.push('\n');
}

fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            '\0' => quoted.push_str("\\0"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
