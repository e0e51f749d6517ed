pub mod container;
pub mod elf_diff;
pub mod engine;
pub mod fuzzy;
pub mod handle;
pub mod magic;
pub mod registry;
pub mod text_diff;
pub mod tools;

pub use engine::DiffEngine;
pub use fuzzy::{FuzzyDigest, FuzzyMatcher};
pub use handle::{FileHandle, FileKind};
pub use registry::{ComparatorRegistry, FileFormat, StructuralComparator};
