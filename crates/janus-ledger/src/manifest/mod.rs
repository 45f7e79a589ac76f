//! `janus.pkg` manifest format
//!
//! A small KDL subset:
//!
//! ```text
//! name "my-app"
//! version "0.1.0"
//!
//! dependency "json" {
//!     git "https://example.com/json.git" tag="v1.2.0"
//!     capability "fs" path="/tmp"
//! }
//!
//! dev-dependency "fixtures" {
//!     path "../fixtures"
//! }
//! ```
//!
//! Unknown nodes and directives are skipped so newer manifests still load.
//! Capability parameter names that are not bare identifiers are quoted
//! (`"read only"="yes"`). Edits go through [`upsert_dependency`], which
//! touches only the dependency block it replaces.

mod edit;
mod lexer;
mod parser;
mod render;

pub use edit::upsert_dependency;
pub use parser::parse_manifest;
pub use render::render_manifest;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("line {line}: invalid token '{text}'")]
    InvalidToken { line: usize, text: String },

    #[error("line {line}: invalid escape sequence '\\{ch}'")]
    InvalidEscape { line: usize, ch: char },

    #[error("line {line}: expected {expected}, found {found}")]
    Unexpected {
        line: usize,
        expected: &'static str,
        found: String,
    },

    #[error("unexpected end of manifest, expected {expected}")]
    UnexpectedEof { expected: &'static str },

    #[error("line {line}: dependency '{dependency}' has no source (git, tar or path)")]
    MissingSource { line: usize, dependency: String },

    #[error("line {line}: dependency '{dependency}' declares more than one source")]
    DuplicateSource { line: usize, dependency: String },

    #[error("line {line}: dependency '{dependency}' declares capability '{capability}' twice")]
    DuplicateCapability {
        line: usize,
        dependency: String,
        capability: String,
    },
}

impl ManifestError {
    /// 1-based line the error points at, if it has one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::InvalidToken { line, .. }
            | Self::InvalidEscape { line, .. }
            | Self::Unexpected { line, .. }
            | Self::MissingSource { line, .. }
            | Self::DuplicateSource { line, .. }
            | Self::DuplicateCapability { line, .. } => Some(*line),
            Self::UnexpectedEof { .. } => None,
        }
    }
}
