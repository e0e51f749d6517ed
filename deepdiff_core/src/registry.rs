//! File-type specialization.
//!
//! The registry is process-wide state: populated once on first use,
//! read-only for the rest of the run. Specialization resolves a generic
//! handle to its most specific recognized format, checking the container
//! membership hint (name/extension rule first for files that arrived as
//! archive members), then magic bytes, then the plain extension. The
//! result is cached on the handle, making re-specialization idempotent.

use crate::container::{Container, GzContainer, TarContainer, XzContainer, ZipContainer};
use crate::elf_diff::ELF_COMPARATOR;
use crate::handle::{FileHandle, FileKind};
use crate::magic;
use deepdiff_common::{ComparatorFailure, ContainerError, Difference, Limits};
use std::sync::atomic::AtomicBool;
use std::sync::OnceLock;
use tracing::debug;

/// Format-aware structural comparison between two same-typed files.
///
/// Exactly one of four things may come back: a difference (or its
/// absence), or one of the three tagged [`ComparatorFailure`] shapes.
/// Anything else is a broken collaborator.
pub trait StructuralComparator: Send + Sync {
    fn describe(&self) -> &'static str;

    /// A set `cancel` flag aborts in-flight external tools; the engine
    /// turns the abort into a cancellation error through its own check.
    fn compare_structure(
        &self,
        a: &FileHandle,
        b: &FileHandle,
        limits: &Limits,
        cancel: Option<&AtomicBool>,
    ) -> Result<Option<Difference>, ComparatorFailure>;
}

/// The most specific recognized format of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    GzipArchive,
    XzArchive,
    TarArchive,
    ZipArchive,
    Elf,
    PlainText,
    Binary,
}

impl FileFormat {
    /// Container capability, when this format has one. The outer `Option`
    /// is the capability check; the inner `Result` is the extraction.
    pub fn open_container(
        &self,
        handle: &FileHandle,
    ) -> Option<Result<Box<dyn Container>, ContainerError>> {
        match self {
            FileFormat::GzipArchive => {
                Some(GzContainer::open(handle).map(|c| Box::new(c) as Box<dyn Container>))
            }
            FileFormat::XzArchive => {
                Some(XzContainer::open(handle).map(|c| Box::new(c) as Box<dyn Container>))
            }
            FileFormat::TarArchive => {
                Some(TarContainer::open(handle).map(|c| Box::new(c) as Box<dyn Container>))
            }
            FileFormat::ZipArchive => {
                Some(ZipContainer::open(handle).map(|c| Box::new(c) as Box<dyn Container>))
            }
            FileFormat::Elf | FileFormat::PlainText | FileFormat::Binary => None,
        }
    }

    /// Structural comparator capability, when this format has one.
    pub fn structural(&self) -> Option<&'static dyn StructuralComparator> {
        match self {
            FileFormat::Elf => Some(&ELF_COMPARATOR),
            _ => None,
        }
    }
}

struct FormatRule {
    format: FileFormat,
    extensions: &'static [&'static str],
    matches_magic: fn(&[u8]) -> bool,
}

pub struct ComparatorRegistry {
    rules: Vec<FormatRule>,
}

static REGISTRY: OnceLock<ComparatorRegistry> = OnceLock::new();

impl ComparatorRegistry {
    pub fn global() -> &'static Self {
        REGISTRY.get_or_init(|| Self {
            rules: vec![
                FormatRule {
                    format: FileFormat::GzipArchive,
                    extensions: &["gz", "tgz"],
                    matches_magic: magic::is_gzip,
                },
                FormatRule {
                    format: FileFormat::XzArchive,
                    extensions: &["xz", "txz"],
                    matches_magic: magic::is_xz,
                },
                FormatRule {
                    format: FileFormat::TarArchive,
                    extensions: &["tar"],
                    matches_magic: magic::is_tar,
                },
                FormatRule {
                    format: FileFormat::ZipArchive,
                    extensions: &["zip", "jar", "apk"],
                    matches_magic: magic::is_zip,
                },
                FormatRule {
                    format: FileFormat::Elf,
                    extensions: &["so"],
                    matches_magic: magic::is_elf,
                },
            ],
        })
    }

    /// Resolve the handle's format, caching the answer on the handle.
    pub fn specialize(&self, handle: &FileHandle) -> FileFormat {
        *handle.format.get_or_init(|| {
            let format = self.identify(handle);
            debug!("specialized {} as {:?}", handle.progress_name(), format);
            format
        })
    }

    fn identify(&self, handle: &FileHandle) -> FileFormat {
        if handle.kind() != FileKind::Regular {
            return FileFormat::Binary;
        }

        // Files that arrived as named members of a container prefer the
        // name/extension rule over the magic bytes.
        if handle.is_member() {
            if let Some(format) = self.by_extension(handle) {
                return format;
            }
        }
        if let Some(format) = self.by_magic(handle.header()) {
            return format;
        }
        if let Some(format) = self.by_extension(handle) {
            return format;
        }
        if magic::looks_text(handle.header()) {
            FileFormat::PlainText
        } else {
            FileFormat::Binary
        }
    }

    fn by_magic(&self, header: &[u8]) -> Option<FileFormat> {
        self.rules
            .iter()
            .find(|rule| (rule.matches_magic)(header))
            .map(|rule| rule.format)
    }

    fn by_extension(&self, handle: &FileHandle) -> Option<FileFormat> {
        let ext = handle.extension()?;
        self.rules
            .iter()
            .find(|rule| rule.extensions.contains(&ext.as_str()))
            .map(|rule| rule.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_magic_wins_over_misleading_extension() {
        let temp = TempDir::new().unwrap();
        // gzip content named .txt still specializes as gzip
        let path = temp.path().join("data.txt");
        let f = fs::File::create(&path).unwrap();
        let mut gz = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        gz.write_all(b"payload").unwrap();
        gz.finish().unwrap();

        let handle = FileHandle::from_path(&path).unwrap();
        assert_eq!(
            ComparatorRegistry::global().specialize(&handle),
            FileFormat::GzipArchive
        );
    }

    #[test]
    fn test_specialization_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plain.txt");
        fs::write(&path, "just text\n").unwrap();

        let handle = FileHandle::from_path(&path).unwrap();
        let registry = ComparatorRegistry::global();
        let first = registry.specialize(&handle);
        let second = registry.specialize(&handle);
        assert_eq!(first, FileFormat::PlainText);
        assert_eq!(first, second);
    }

    #[test]
    fn test_member_hint_prefers_extension_rule() {
        let temp = TempDir::new().unwrap();
        // empty file: no magic signature at all
        let path = temp.path().join("extracted");
        fs::write(&path, b"").unwrap();

        let member = FileHandle::member(path, "inner.tar", "outer.gz", None);
        assert_eq!(
            ComparatorRegistry::global().specialize(&member),
            FileFormat::TarArchive
        );
    }

    #[test]
    fn test_unrecognized_defaults_to_binary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob");
        fs::write(&path, [0u8, 159, 146, 150]).unwrap();

        let handle = FileHandle::from_path(&path).unwrap();
        assert_eq!(
            ComparatorRegistry::global().specialize(&handle),
            FileFormat::Binary
        );
    }
}
