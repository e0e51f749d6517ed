use super::{Container, MemberSet};
use crate::handle::FileHandle;
use deepdiff_common::ContainerError;
use std::fs::File;
use std::io;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

/// Zip archive container; member order is central-directory index order.
pub struct ZipContainer {
    name: String,
    members: MemberSet,
    _temp: Arc<TempDir>,
}

impl ZipContainer {
    pub fn open(handle: &FileHandle) -> Result<Self, ContainerError> {
        let temp = Arc::new(TempDir::new()?);
        let file = File::open(handle.path())?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| ContainerError::Extraction(e.to_string()))?;

        let name = handle.progress_name().to_string();
        let mut members = MemberSet::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| ContainerError::Extraction(e.to_string()))?;
            if entry.is_dir() {
                continue;
            }
            let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
                debug!("skipping unsafe zip entry {}", entry.name());
                continue;
            };

            let dest = temp.path().join(&relative);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            io::copy(&mut entry, &mut File::create(&dest)?)?;

            let member_name = relative.to_string_lossy().into_owned();
            members.insert(
                member_name.clone(),
                FileHandle::member(dest, member_name, name.clone(), Some(Arc::clone(&temp))),
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

impl Container for ZipContainer {
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
