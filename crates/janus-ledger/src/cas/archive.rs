//! Deterministic normalization.
//!
//! Two trees that mean the same thing must produce the same bytes before
//! hashing. Trees are flattened into a sorted record stream that carries
//! only paths, contents and the executable bit, and text files get their
//! line endings canonicalized inside their own record. Binary files and the
//! framing itself are never rewritten.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use super::CasError;

/// A single file inside a directory tree being archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path relative to the tree root, `/`-separated on every platform.
    pub path: String,
    /// File contents.
    pub content: Vec<u8>,
    /// Whether any execute bit was set.
    pub executable: bool,
}

impl ArchiveEntry {
    /// Create an entry.
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>, executable: bool) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            executable,
        }
    }
}

/// Canonicalize line endings: CRLF and lone CR both become LF.
///
/// Borrows when the input has no carriage returns. Applying it twice is the
/// same as applying it once.
pub fn normalize(data: &[u8]) -> Cow<'_, [u8]> {
    if !data.contains(&b'\r') {
        return Cow::Borrowed(data);
    }

    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\r' => {
                out.push(b'\n');
                if data.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    Cow::Owned(out)
}

/// Whether `data` is text: valid UTF-8 without NUL bytes.
pub fn is_text(data: &[u8]) -> bool {
    !data.contains(&0) && std::str::from_utf8(data).is_ok()
}

/// Serialize a file set into the normalized archive format.
///
/// Entries are sorted by path first, so any permutation of the same set
/// yields identical bytes. Text contents are passed through [`normalize`];
/// binary contents are kept as they are. Each record is
/// `u32 path_len | path | u32 content_len | u8 executable | content`,
/// integers little-endian, with `content_len` counting the normalized bytes.
///
/// # Errors
///
/// Returns [`CasError::NormalizationFailed`] if a path or file is too large
/// for a `u32` length prefix.
pub fn create_normalized_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>, CasError> {
    let mut sorted: Vec<&ArchiveEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));

    let total: usize = sorted
        .iter()
        .map(|e| 9 + e.path.len() + e.content.len())
        .sum();
    let mut out = Vec::with_capacity(total);

    for entry in sorted {
        let content = if is_text(&entry.content) {
            normalize(&entry.content)
        } else {
            Cow::Borrowed(entry.content.as_slice())
        };
        let path_len = u32::try_from(entry.path.len()).map_err(|_| {
            CasError::NormalizationFailed(format!("path too long: {}", entry.path))
        })?;
        let content_len = u32::try_from(content.len()).map_err(|_| {
            CasError::NormalizationFailed(format!("file too large: {}", entry.path))
        })?;

        out.extend_from_slice(&path_len.to_le_bytes());
        out.extend_from_slice(entry.path.as_bytes());
        out.extend_from_slice(&content_len.to_le_bytes());
        out.push(u8::from(entry.executable));
        out.extend_from_slice(&content);
    }

    Ok(out)
}

/// Walk a directory tree and collect its regular files.
///
/// `.git` directories are skipped: their contents differ between clones of
/// the same commit. Symlinks are not followed and not archived.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked or a file cannot be read.
pub fn collect_directory(root: &Path) -> Result<Vec<ArchiveEntry>, CasError> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git")
    {
        let entry = entry.map_err(|e| CasError::NormalizationFailed(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| CasError::NormalizationFailed(e.to_string()))?;
        let path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let metadata = entry
            .metadata()
            .map_err(|e| CasError::NormalizationFailed(e.to_string()))?;
        let content = fs::read(entry.path())?;

        entries.push(ArchiveEntry {
            path,
            content,
            executable: is_executable(&metadata),
        });
    }

    Ok(entries)
}

/// Build the normalized archive of a directory in one step.
///
/// # Errors
///
/// See [`collect_directory`] and [`create_normalized_archive`].
pub fn archive_directory(root: &Path) -> Result<Vec<u8>, CasError> {
    let entries = collect_directory(root)?;
    create_normalized_archive(&entries)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
