//! git over HTTPS.
//!
//! URL syntax: `[git+]https://host/repo[.git][#[tag=|branch=|commit=]ref]`.
//! Tags and branches are shallow-cloned; commits need the full history and
//! are checked out after cloning. The checkout is archived with the
//! normalized archive format and hashed, so two clones of the same tree get
//! the same content id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use janus_schema::{DEFAULT_GIT_REF, RefType};
use tempfile::TempDir;

use super::{FetchResult, Transport, TransportError};
use crate::cas::{archive_directory, hash_archive};

/// A parsed git source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitUrl {
    /// Clone URL without the `git+` prefix or fragment.
    pub repo_url: String,
    /// Tag, branch or commit to fetch.
    pub reference: String,
    /// How `reference` is interpreted.
    pub ref_type: RefType,
}

/// Parse `[git+]https://host/repo[.git][#[tag=|branch=|commit=]ref]`.
///
/// No fragment means branch `main`. A fragment without a recognized
/// qualifier is taken as a tag.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] for non-HTTPS or hostless URLs and
/// [`TransportError::InvalidRef`] for an empty ref.
pub fn parse_git_url(url: &str) -> Result<GitUrl, TransportError> {
    let stripped = url.strip_prefix("git+").unwrap_or(url);
    let Some(rest) = stripped.strip_prefix("https://") else {
        return Err(TransportError::InvalidUrl(url.to_string()));
    };

    let (repo, fragment) = match rest.split_once('#') {
        Some((repo, fragment)) => (repo, Some(fragment)),
        None => (rest, None),
    };
    if repo.is_empty() || repo.starts_with('/') {
        return Err(TransportError::InvalidUrl(url.to_string()));
    }

    let (ref_type, reference) = match fragment {
        None => (RefType::Branch, DEFAULT_GIT_REF),
        Some(fragment) => match fragment.split_once('=') {
            Some((key, value)) => match RefType::from_qualifier(key) {
                Some(ref_type) => (ref_type, value),
                None => (RefType::Tag, fragment),
            },
            None => (RefType::Tag, fragment),
        },
    };
    if reference.is_empty() {
        return Err(TransportError::InvalidRef(url.to_string()));
    }

    Ok(GitUrl {
        repo_url: format!("https://{repo}"),
        reference: reference.to_string(),
        ref_type,
    })
}

/// Captured result of one git invocation.
#[derive(Debug, Clone, Default)]
pub struct GitOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

impl GitOutput {
    /// Whether git exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    fn status_text(&self) -> String {
        self.status
            .map_or_else(|| "signal".to_string(), |code| format!("exit {code}"))
    }
}

/// Runs git. The only contract is argv in, exit status and output back.
pub trait GitRunner: Send + Sync {
    /// Run `git <args>` in `cwd` (or the current directory).
    ///
    /// A non-zero exit is reported through [`GitOutput::status`], not as an
    /// error; errors are for failing to run git at all.
    fn run(&self, args: &[&str], cwd: Option<&Path>) -> Result<GitOutput, TransportError>;
}

/// The `git` executable found on `PATH`.
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: Option<PathBuf>,
}

impl SystemGit {
    /// Locate `git` on `PATH`. A missing binary is reported on first use.
    pub fn new() -> Self {
        Self {
            program: which::which("git").ok(),
        }
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

impl GitRunner for SystemGit {
    fn run(&self, args: &[&str], cwd: Option<&Path>) -> Result<GitOutput, TransportError> {
        let command = args.first().copied().unwrap_or_default().to_string();
        let Some(program) = &self.program else {
            return Err(TransportError::GitCommandFailed {
                command,
                status: "not found".to_string(),
                stderr: "git executable not found on PATH".to_string(),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|e| TransportError::GitCommandFailed {
            command,
            status: "spawn".to_string(),
            stderr: e.to_string(),
        })?;

        Ok(GitOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Transport for `git+https://` and `https://` repository URLs.
pub struct GitTransport {
    runner: Box<dyn GitRunner>,
}

impl std::fmt::Debug for GitTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitTransport").finish_non_exhaustive()
    }
}

impl GitTransport {
    /// Use the system `git`.
    pub fn new() -> Self {
        Self::with_runner(Box::new(SystemGit::new()))
    }

    /// Use a custom runner (tests substitute fakes here).
    pub fn with_runner(runner: Box<dyn GitRunner>) -> Self {
        Self { runner }
    }

    fn clone_into(&self, git_url: &GitUrl, dest: &str) -> Result<(), TransportError> {
        let output = match git_url.ref_type {
            RefType::Tag | RefType::Branch => self.runner.run(
                &[
                    "clone",
                    "--depth=1",
                    "--branch",
                    &git_url.reference,
                    "--",
                    &git_url.repo_url,
                    dest,
                ],
                None,
            )?,
            // Shallow clones cannot reach arbitrary history.
            RefType::Commit => self
                .runner
                .run(&["clone", "--", &git_url.repo_url, dest], None)?,
        };

        if !output.success() {
            return Err(classify_clone_failure(&git_url.repo_url, &output));
        }
        Ok(())
    }

    fn checkout(&self, git_url: &GitUrl, checkout: &Path) -> Result<(), TransportError> {
        let output = self
            .runner
            .run(&["checkout", &git_url.reference], Some(checkout))?;
        if !output.success() {
            return Err(TransportError::GitCommandFailed {
                command: format!("checkout {}", git_url.reference),
                status: output.status_text(),
                stderr: output.stderr_text(),
            });
        }
        Ok(())
    }
}

impl Default for GitTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for GitTransport {
    fn name(&self) -> &'static str {
        "git"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        matches!(scheme, "git+https" | "https")
    }

    fn fetch(&self, url: &str) -> Result<FetchResult, TransportError> {
        let git_url = parse_git_url(url)?;
        tracing::debug!(
            "Cloning {} at {} {}",
            git_url.repo_url,
            git_url.ref_type,
            git_url.reference
        );

        // Removed when dropped, on success and on every error path below.
        let workdir = temp_checkout_dir()?;
        let checkout = workdir.path().join("checkout");
        let dest = checkout.to_string_lossy().into_owned();

        self.clone_into(&git_url, &dest)?;
        if git_url.ref_type == RefType::Commit {
            self.checkout(&git_url, &checkout)?;
        }

        let content = archive_directory(&checkout).map_err(|e| {
            TransportError::ContentNotFound(format!("{}: {e}", git_url.repo_url))
        })?;
        let content_id = hash_archive(&content);

        let mut metadata = BTreeMap::new();
        metadata.insert("transport".to_string(), self.name().to_string());
        metadata.insert("repo_url".to_string(), git_url.repo_url.clone());
        metadata.insert("ref".to_string(), git_url.reference.clone());
        metadata.insert("ref_type".to_string(), git_url.ref_type.to_string());

        Ok(FetchResult {
            content,
            content_id,
            metadata,
        })
    }
}

/// Uniquely named scratch directory: timestamp plus thread id.
fn temp_checkout_dir() -> Result<TempDir, TransportError> {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%f");
    let thread: String = format!("{:?}", std::thread::current().id())
        .chars()
        .filter(char::is_ascii_digit)
        .collect();

    tempfile::Builder::new()
        .prefix(&format!("janus-git-{stamp}-{thread}-"))
        .tempdir()
        .map_err(|e| TransportError::GitCommandFailed {
            command: "clone".to_string(),
            status: "tempdir".to_string(),
            stderr: e.to_string(),
        })
}

fn classify_clone_failure(repo_url: &str, output: &GitOutput) -> TransportError {
    let stderr = output.stderr_text();
    let lower = stderr.to_lowercase();

    if lower.contains("not found") || lower.contains("does not exist") {
        TransportError::ContentNotFound(format!("{repo_url}: {stderr}"))
    } else if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("permission denied")
    {
        TransportError::AuthenticationFailed(repo_url.to_string())
    } else if lower.contains("could not resolve host")
        || lower.contains("failed to connect")
        || lower.contains("connection timed out")
        || lower.contains("unable to access")
    {
        TransportError::Network(format!("{repo_url}: {stderr}"))
    } else if output.status.is_none() {
        TransportError::GitCommandFailed {
            command: "clone".to_string(),
            status: output.status_text(),
            stderr,
        }
    } else {
        TransportError::ContentNotFound(format!("{repo_url}: {stderr}"))
    }
}
