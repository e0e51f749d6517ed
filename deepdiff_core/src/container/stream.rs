use super::{Container, MemberSet};
use crate::handle::FileHandle;
use deepdiff_common::ContainerError;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use xz2::read::XzDecoder;

/// Single-member container over a compressed stream (gzip, xz). The
/// member is named by stripping the compression extension, so a
/// `foo.tar.gz` exposes one member `foo.tar` that specializes further.
struct StreamContainer {
    name: String,
    members: MemberSet,
    _temp: Arc<TempDir>,
}

fn member_name_for(archive_name: &str) -> String {
    let base = Path::new(archive_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive_name.to_string());

    if let Some(stem) = base.strip_suffix(".tgz").or_else(|| base.strip_suffix(".txz")) {
        return format!("{stem}.tar");
    }
    for ext in [".gz", ".xz"] {
        if let Some(stem) = base.strip_suffix(ext) {
            return stem.to_string();
        }
    }
    format!("{base}-content")
}

fn open_stream(
    handle: &FileHandle,
    decoder: impl FnOnce(File) -> Box<dyn Read>,
) -> Result<StreamContainer, ContainerError> {
    let temp = Arc::new(TempDir::new()?);
    let name = handle.progress_name().to_string();
    let member_name = member_name_for(&name);

    let dest = temp.path().join("decompressed");
    let mut reader = decoder(File::open(handle.path())?);
    io::copy(&mut reader, &mut File::create(&dest)?)
        .map_err(|e| ContainerError::Extraction(format!("{name}: {e}")))?;

    let mut members = MemberSet::new();
    members.insert(
        member_name.clone(),
        FileHandle::member(dest, member_name, name.clone(), Some(Arc::clone(&temp))),
    );

    Ok(StreamContainer {
        name,
        members,
        _temp: temp,
    })
}

impl Container for StreamContainer {
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

pub struct GzContainer(StreamContainer);

impl GzContainer {
    pub fn open(handle: &FileHandle) -> Result<Self, ContainerError> {
        open_stream(handle, |f| Box::new(GzDecoder::new(f))).map(Self)
    }
}

impl Container for GzContainer {
    fn display_name(&self) -> &str {
        self.0.display_name()
    }

    fn member_names(&self) -> &[String] {
        self.0.member_names()
    }

    fn member(&self, name: &str) -> Option<&FileHandle> {
        self.0.member(name)
    }
}

pub struct XzContainer(StreamContainer);

impl XzContainer {
    pub fn open(handle: &FileHandle) -> Result<Self, ContainerError> {
        open_stream(handle, |f| Box::new(XzDecoder::new(f))).map(Self)
    }
}

impl Container for XzContainer {
    fn display_name(&self) -> &str {
        self.0.display_name()
    }

    fn member_names(&self) -> &[String] {
        self.0.member_names()
    }

    fn member(&self, name: &str) -> Option<&FileHandle> {
        self.0.member(name)
    }
}
