//! Content-Addressable Store (CAS)
//!
//! Stores blobs by the BLAKE3 hash of their bytes. Layout:
//!
//! ```text
//! <root>/
//! └── <64-hex-char content id>/
//!     └── archive
//! ```

mod archive;

pub use archive::{
    ArchiveEntry, archive_directory, collect_directory, create_normalized_archive, is_text,
    normalize,
};

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use janus_schema::ContentId;
use thiserror::Error;

/// Reads larger than this fail instead of buffering (100 MiB).
pub const DEFAULT_MAX_BLOB_SIZE: u64 = 100 * 1024 * 1024;

const BLOB_FILE: &str = "archive";

#[derive(Error, Debug)]
pub enum CasError {
    #[error("Invalid content id: {0}")]
    InvalidContentId(String),

    #[error("Content not found in CAS: {0}")]
    ContentNotFound(ContentId),

    #[error("Stored content does not hash to {0}")]
    CorruptedContent(ContentId),

    #[error("Normalization failed: {0}")]
    NormalizationFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),

    #[error("Blob {id} is {size} bytes, above the {limit} byte read limit")]
    TooLarge { id: ContentId, size: u64, limit: u64 },
}

/// Hash content the way the store identifies it.
///
/// The bytes are hashed exactly as given. Line endings are canonicalized
/// per text file when a tree is archived ([`create_normalized_archive`]),
/// never across archive framing or binary content.
pub fn hash_archive(data: &[u8]) -> ContentId {
    ContentId::digest(data)
}

/// Content-Addressable Store
#[derive(Debug, Clone)]
pub struct Cas {
    root: PathBuf,
    max_blob_size: u64,
}

impl Cas {
    /// Open the shared store under the Janus home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be resolved (set
    /// `JANUS_HOME`) or the store directory cannot be created.
    pub fn new() -> Result<Self, CasError> {
        let root = crate::paths::cas_path().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "could not determine home directory; set JANUS_HOME",
            )
        })?;
        Self::with_root(root)
    }

    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self, CasError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
        })
    }

    /// Override the read cap applied by [`Cas::retrieve`].
    pub fn with_max_blob_size(mut self, limit: u64) -> Self {
        self.max_blob_size = limit;
        self
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `data` under `id`.
    ///
    /// The caller is trusted to pass the id it computed for `data`;
    /// [`Cas::verify`] is the check. Writing an id that already exists
    /// rewrites the same bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CasError::Storage`] if the blob cannot be written.
    pub fn store(&self, id: &ContentId, data: &[u8]) -> Result<(), CasError> {
        let dir = self.root.join(id.to_hex());
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(BLOB_FILE), data)?;
        tracing::trace!("Stored {} ({} bytes)", id.short(), data.len());
        Ok(())
    }

    /// Read the blob stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CasError::ContentNotFound`] if nothing is stored under `id`,
    /// [`CasError::TooLarge`] if the blob exceeds the read cap.
    pub fn retrieve(&self, id: &ContentId) -> Result<Vec<u8>, CasError> {
        let path = self.blob_path(id);
        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CasError::ContentNotFound(*id));
            }
            Err(e) => return Err(e.into()),
        };

        if size > self.max_blob_size {
            return Err(CasError::TooLarge {
                id: *id,
                size,
                limit: self.max_blob_size,
            });
        }

        // Bounded even if the file grows between stat and read.
        let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
        File::open(&path)?
            .take(self.max_blob_size + 1)
            .read_to_end(&mut data)?;
        if data.len() as u64 > self.max_blob_size {
            return Err(CasError::TooLarge {
                id: *id,
                size: data.len() as u64,
                limit: self.max_blob_size,
            });
        }
        Ok(data)
    }

    /// Re-hash the stored blob and check it still matches `id`.
    ///
    /// # Errors
    ///
    /// Propagates [`Cas::retrieve`] failures, including a missing blob.
    pub fn verify(&self, id: &ContentId) -> Result<bool, CasError> {
        let data = self.retrieve(id)?;
        let actual = hash_archive(&data);
        if actual != *id {
            tracing::warn!("CAS blob {} re-hashed to {}", id.short(), actual.short());
        }
        Ok(actual == *id)
    }

    /// Check if content exists in the CAS
    pub fn exists(&self, id: &ContentId) -> bool {
        self.blob_path(id).is_file()
    }

    /// Get the path for a blob given its id: `<root>/<hex>/archive`.
    pub fn blob_path(&self, id: &ContentId) -> PathBuf {
        self.root.join(id.to_hex()).join(BLOB_FILE)
    }
}
