use super::{Container, MemberSet};
use crate::handle::FileHandle;
use deepdiff_common::ContainerError;
use std::fs::File;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;

/// Tar archive container. The whole archive is unpacked into a temporary
/// directory at open time; member order is archive entry order and stays
/// stable across repeated enumeration. Symlink entries are preserved as
/// symlinks on disk.
pub struct TarContainer {
    name: String,
    members: MemberSet,
    _temp: Arc<TempDir>,
}

impl TarContainer {
    pub fn open(handle: &FileHandle) -> Result<Self, ContainerError> {
        let temp = Arc::new(TempDir::new()?);
        let file = File::open(handle.path())?;
        let mut archive = tar::Archive::new(file);

        let name = handle.progress_name().to_string();
        let mut members = MemberSet::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let entry_path = entry.path()?.into_owned();
            // unpack_in rejects traversal outside the extraction root
            if !entry.unpack_in(temp.path())? {
                debug!("skipping unsafe tar entry {}", entry_path.display());
                continue;
            }
            let raw = entry_path.to_string_lossy().into_owned();
            let member_name = raw.strip_prefix("./").unwrap_or(&raw).to_string();
            members.insert(
                member_name.clone(),
                FileHandle::member(
                    temp.path().join(&entry_path),
                    member_name,
                    name.clone(),
                    Some(Arc::clone(&temp)),
                ),
            );
        }

        debug!("extracted {} members from {}", members.names().len(), name);
        Ok(Self {
            name,
            members,
            _temp: temp,
        })
    }
}

impl Container for TarContainer {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn member_names(&self) -> &[String] {
        self.members.names()
    }

    fn member(&self, name: &str) -> Option<&FileHandle> {
        self.members.get(name)
    }
}
