//! Local filesystem transport (`file://path`).

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use super::{FetchResult, Transport, TransportError};
use crate::cas::{archive_directory, hash_archive};

/// Reads a file's raw bytes, or a directory as a normalized archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl Transport for FileTransport {
    fn name(&self) -> &'static str {
        "file"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        scheme == "file"
    }

    fn fetch(&self, url: &str) -> Result<FetchResult, TransportError> {
        let raw = url
            .strip_prefix("file://")
            .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;
        if raw.is_empty() {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }
        let path = Path::new(raw);

        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TransportError::ContentNotFound(raw.to_string()));
            }
            Err(e) => return Err(TransportError::ContentNotFound(format!("{raw}: {e}"))),
        };

        let (content, kind) = if meta.is_dir() {
            let archive = archive_directory(path)
                .map_err(|e| TransportError::ContentNotFound(format!("{raw}: {e}")))?;
            (archive, "directory")
        } else {
            let bytes =
                fs::read(path).map_err(|e| TransportError::ContentNotFound(format!("{raw}: {e}")))?;
            (bytes, "file")
        };

        let content_id = hash_archive(&content);
        tracing::debug!("Read {} {} ({} bytes)", kind, raw, content.len());

        let mut metadata = BTreeMap::new();
        metadata.insert("transport".to_string(), self.name().to_string());
        metadata.insert("path".to_string(), raw.to_string());
        metadata.insert("kind".to_string(), kind.to_string());

        Ok(FetchResult {
            content,
            content_id,
            metadata,
        })
    }
}
