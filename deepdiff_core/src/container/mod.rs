//! Container capability: archives and directory trees that expose named
//! member files.
//!
//! Enumerating members twice yields the same ordered sequence; archive
//! containers extract their members eagerly into one temporary directory
//! shared by the member handles, so the extraction disappears exactly
//! when the last handle referencing it is dropped.

pub mod dir;
pub mod stream;
pub mod tar;
pub mod zip;

#[cfg(test)]
mod tests_container;

pub use dir::DirContainer;
pub use stream::{GzContainer, XzContainer};
pub use tar::TarContainer;
pub use zip::ZipContainer;

use crate::handle::FileHandle;
use std::collections::HashMap;

pub trait Container: Send + Sync {
    /// Display name of the container itself (e.g. the archive name).
    fn display_name(&self) -> &str;

    /// Member names in deterministic container order.
    fn member_names(&self) -> &[String];

    /// Member by name; `None` only for names never returned by
    /// [`Container::member_names`].
    fn member(&self, name: &str) -> Option<&FileHandle>;
}

/// Ordered member storage shared by the container implementations.
/// Duplicate names keep their first position; the handle is replaced
/// (archive semantics: the last entry wins).
pub(crate) struct MemberSet {
    names: Vec<String>,
    members: HashMap<String, FileHandle>,
}

impl MemberSet {
    pub(crate) fn new() -> Self {
        Self {
            names: Vec::new(),
            members: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: String, handle: FileHandle) {
        if !self.members.contains_key(&name) {
            self.names.push(name.clone());
        }
        self.members.insert(name, handle);
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn get(&self, name: &str) -> Option<&FileHandle> {
        self.members.get(name)
    }
}
