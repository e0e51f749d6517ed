//! File handles: one readable byte sequence plus a display name.
//!
//! Members extracted out of a container point into a shared temporary
//! directory; the handles keep that directory alive through an `Arc`, so
//! cleanup is the scoped drop of the last clone. That makes cleanup
//! idempotent and guarantees it runs on early return, error, and
//! cancellation alike.

use crate::fuzzy::FuzzyDigest;
use crate::magic;
use crate::registry::FileFormat;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;
use tracing::debug;

/// Content below this size never gets a fuzzy digest; the digest is not
/// meaningful for it.
pub const FUZZY_MIN_SIZE: u64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Device,
    Other,
}

impl FileKind {
    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Regular => "regular file",
            FileKind::Directory => "directory",
            FileKind::Symlink => "symlink",
            FileKind::Device => "device",
            FileKind::Other => "special file",
        }
    }
}

pub struct FileHandle {
    path: PathBuf,
    /// Display name; for container members this is the in-archive name,
    /// not the extraction path.
    name: String,
    kind: FileKind,
    size: u64,
    /// Display name of the container this member came from. A naming
    /// hint, never an ownership edge.
    member_of: Option<String>,
    /// Keeps the extraction directory alive for extracted members.
    temp: Option<Arc<TempDir>>,
    header: OnceLock<Vec<u8>>,
    mime_type: OnceLock<&'static str>,
    fuzzy: OnceLock<Option<FuzzyDigest>>,
    pub(crate) format: OnceLock<FileFormat>,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .finish()
    }
}

impl FileHandle {
    /// Handle for a root path supplied by the caller.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = fs::symlink_metadata(path)?;
        Ok(Self::build(
            path.to_path_buf(),
            path.display().to_string(),
            kind_of(&meta.file_type()),
            meta.len(),
            None,
            None,
        ))
    }

    /// Handle for a member produced by a container. Metadata failures are
    /// not fatal here; the comparison layer treats unreadable content as
    /// "assume different".
    pub fn member(
        path: PathBuf,
        name: impl Into<String>,
        container_name: impl Into<String>,
        temp: Option<Arc<TempDir>>,
    ) -> Self {
        let (kind, size) = match fs::symlink_metadata(&path) {
            Ok(meta) => (kind_of(&meta.file_type()), meta.len()),
            Err(err) => {
                debug!("unreadable member {}: {}", path.display(), err);
                (FileKind::Other, 0)
            }
        };
        Self::build(
            path,
            name.into(),
            kind,
            size,
            Some(container_name.into()),
            temp,
        )
    }

    fn build(
        path: PathBuf,
        name: String,
        kind: FileKind,
        size: u64,
        member_of: Option<String>,
        temp: Option<Arc<TempDir>>,
    ) -> Self {
        Self {
            path,
            name,
            kind,
            size,
            member_of,
            temp,
            header: OnceLock::new(),
            mime_type: OnceLock::new(),
            fuzzy: OnceLock::new(),
            format: OnceLock::new(),
        }
    }

    /// A readable location for the content.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without a leading `./`, for progress output.
    pub fn progress_name(&self) -> &str {
        self.name.strip_prefix("./").unwrap_or(&self.name)
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn member_of(&self) -> Option<&str> {
        self.member_of.as_deref()
    }

    pub fn is_member(&self) -> bool {
        self.member_of.is_some()
    }

    /// File extension of the display name, lowercased.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    /// Leading header bytes, read once.
    pub fn header(&self) -> &[u8] {
        self.header.get_or_init(|| {
            let mut buf = vec![0u8; magic::HEADER_LEN];
            let n = fs::File::open(&self.path)
                .and_then(|mut f| f.read(&mut buf))
                .unwrap_or(0);
            buf.truncate(n);
            buf
        })
    }

    /// Magic-based file type label, computed once.
    pub fn mime_type(&self) -> &'static str {
        self.mime_type
            .get_or_init(|| magic::guess_file_type(self.header()))
    }

    /// Locality-sensitive content digest, computed once; `None` for
    /// non-regular files and content below [`FUZZY_MIN_SIZE`].
    pub fn fuzzy_digest(&self) -> Option<&FuzzyDigest> {
        self.fuzzy
            .get_or_init(|| {
                if self.kind != FileKind::Regular || self.size < FUZZY_MIN_SIZE {
                    return None;
                }
                match FuzzyDigest::from_path(&self.path) {
                    Ok(digest) => digest,
                    Err(err) => {
                        debug!("fuzzy digest failed for {}: {}", self.name, err);
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Target of a symlink; `None` when unreadable.
    pub fn link_target(&self) -> Option<String> {
        fs::read_link(&self.path)
            .ok()
            .map(|t| t.to_string_lossy().into_owned())
    }

    /// Short description of a device node, for metadata diffing.
    pub fn device_description(&self) -> String {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if let Ok(meta) = fs::symlink_metadata(&self.path) {
                return format!("device:{:#x} mode:{:o}", meta.rdev(), meta.mode());
            }
        }
        "device".to_string()
    }

}

fn kind_of(ft: &fs::FileType) -> FileKind {
    if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_dir() {
        FileKind::Directory
    } else if is_device(ft) {
        FileKind::Device
    } else if ft.is_file() {
        FileKind::Regular
    } else {
        FileKind::Other
    }
}

#[cfg(unix)]
fn is_device(ft: &fs::FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    ft.is_block_device() || ft.is_char_device()
}

#[cfg(not(unix))]
fn is_device(_ft: &fs::FileType) -> bool {
    false
}
