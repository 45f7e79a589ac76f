//! Transport registry: scheme-dispatched fetchers for dependency sources.
//!
//! Everything a transport returns comes from an untrusted origin. The bytes
//! are only identified by the content id computed here, after the fetch,
//! and [`TransportRegistry::fetch_with_verification`] is where a pinned id
//! is enforced.

pub mod file;
pub mod git;

pub use file::FileTransport;
pub use git::{GitOutput, GitRunner, GitTransport, GitUrl, SystemGit, parse_git_url};

use std::collections::BTreeMap;

use janus_schema::ContentId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No transport for URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed for {0}")]
    AuthenticationFailed(String),

    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        expected: ContentId,
        actual: ContentId,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid ref: {0}")]
    InvalidRef(String),

    #[error("git {command} failed ({status}): {stderr}")]
    GitCommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    // Declared for callers that impose deadlines; no transport enforces one yet.
    #[error("Timed out fetching {0}")]
    Timeout(String),
}

/// What a successful fetch produced.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Fetched bytes (a normalized archive for trees).
    pub content: Vec<u8>,
    /// Hash of `content` as the store computes it.
    pub content_id: ContentId,
    /// Transport-specific facts about the fetch, e.g. `repo_url`, `ref`.
    pub metadata: BTreeMap<String, String>,
}

/// A fetcher for one or more URL schemes.
pub trait Transport: Send + Sync {
    /// Short name recorded in fetch metadata.
    fn name(&self) -> &'static str;

    /// Whether this transport handles URLs with the given scheme.
    fn supports_scheme(&self, scheme: &str) -> bool;

    /// Fetch the content behind `url`.
    fn fetch(&self, url: &str) -> Result<FetchResult, TransportError>;
}

/// Text before `://`, if any.
pub fn extract_scheme(url: &str) -> Option<&str> {
    url.find("://").map(|idx| &url[..idx])
}

/// Ordered list of transports; the first one claiming a scheme wins.
pub struct TransportRegistry {
    transports: Vec<Box<dyn Transport>>,
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field(
                "transports",
                &self.transports.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl TransportRegistry {
    /// A registry with no transports.
    pub fn new() -> Self {
        Self {
            transports: Vec::new(),
        }
    }

    /// The built-in transports: git over HTTPS, then local files.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GitTransport::new()));
        registry.register(Box::new(FileTransport));
        registry
    }

    /// Append a transport. Earlier registrations take precedence.
    pub fn register(&mut self, transport: Box<dyn Transport>) {
        self.transports.push(transport);
    }

    /// Find the transport responsible for `url`.
    pub fn find_transport(&self, url: &str) -> Option<&dyn Transport> {
        let scheme = extract_scheme(url)?;
        self.transports
            .iter()
            .find(|t| t.supports_scheme(scheme))
            .map(|t| &**t)
    }

    /// Fetch `url` through the transport that claims its scheme.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if the URL has no scheme,
    /// [`TransportError::UnsupportedScheme`] if no transport claims it, or
    /// whatever the transport itself reports.
    pub fn fetch(&self, url: &str) -> Result<FetchResult, TransportError> {
        let scheme =
            extract_scheme(url).ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;
        let transport = self
            .find_transport(url)
            .ok_or_else(|| TransportError::UnsupportedScheme(scheme.to_string()))?;

        tracing::debug!("Fetching {} via {} transport", url, transport.name());
        transport.fetch(url)
    }

    /// Fetch `url` and, when `expected` is given, require the fetched content
    /// id to match it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::IntegrityCheckFailed`] on mismatch; the
    /// fetched bytes are dropped.
    pub fn fetch_with_verification(
        &self,
        url: &str,
        expected: Option<&ContentId>,
    ) -> Result<FetchResult, TransportError> {
        let result = self.fetch(url)?;

        if let Some(expected) = expected {
            if result.content_id != *expected {
                tracing::warn!(
                    "Integrity check failed for {}: expected {}, got {}",
                    url,
                    expected.short(),
                    result.content_id.short()
                );
                return Err(TransportError::IntegrityCheckFailed {
                    expected: *expected,
                    actual: result.content_id,
                });
            }
        }

        Ok(result)
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
