use super::{Container, MemberSet};
use crate::handle::FileHandle;
use deepdiff_common::ContainerError;
use std::fs;

/// Directory tree as a container: members are the immediate children in
/// lexicographic order. Nested directories appear as directory-kind
/// members and are descended into by the engine's recursion.
pub struct DirContainer {
    name: String,
    members: MemberSet,
}

impl DirContainer {
    pub fn open(handle: &FileHandle) -> Result<Self, ContainerError> {
        let mut entries: Vec<_> = fs::read_dir(handle.path())?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        let name = handle.progress_name().to_string();
        let mut members = MemberSet::new();
        for entry in entries {
            let member_name = entry.file_name().to_string_lossy().into_owned();
            members.insert(
                member_name.clone(),
                FileHandle::member(entry.path(), member_name, name.clone(), None),
            );
        }

        Ok(Self { name, members })
    }
}

impl Container for DirContainer {
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
