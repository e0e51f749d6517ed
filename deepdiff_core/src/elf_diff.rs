//! Structural comparison of ELF objects through `readelf`.

use crate::handle::FileHandle;
use crate::registry::StructuralComparator;
use crate::text_diff;
use crate::tools;
use deepdiff_common::{ComparatorFailure, Difference, Limits};
use std::ffi::OsStr;
use std::sync::atomic::AtomicBool;

pub struct ElfComparator;

pub static ELF_COMPARATOR: ElfComparator = ElfComparator;

const SOURCE: &str = "readelf --all";

fn readelf_all(
    handle: &FileHandle,
    cancel: Option<&AtomicBool>,
) -> Result<String, ComparatorFailure> {
    let args: &[&OsStr] = &[OsStr::new("--all"), handle.path().as_os_str()];
    let output = tools::run("readelf", args, cancel)?;
    // strip the input path so the two outputs stay comparable
    let text = tools::stdout_text(SOURCE, output)?;
    Ok(text.replace(&handle.path().display().to_string(), handle.progress_name()))
}

impl StructuralComparator for ElfComparator {
    fn describe(&self) -> &'static str {
        SOURCE
    }

    fn compare_structure(
        &self,
        a: &FileHandle,
        b: &FileHandle,
        limits: &Limits,
        cancel: Option<&AtomicBool>,
    ) -> Result<Option<Difference>, ComparatorFailure> {
        let text1 = readelf_all(a, cancel)?;
        let text2 = readelf_all(b, cancel)?;
        if text1 == text2 {
            return Ok(None);
        }

        let outcome = text_diff::diff_strings(&text1, &text2, SOURCE, SOURCE, limits);
        let mut node = Difference::new(SOURCE, SOURCE);
        node.unified_diff = outcome.unified;
        for comment in outcome.comments {
            node.add_comment(comment);
        }
        if node.is_empty() {
            return Ok(None);
        }
        Ok(Some(node))
    }
}
