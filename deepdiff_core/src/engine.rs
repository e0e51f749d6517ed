//! The comparison engine.
//!
//! `compare` either returns one fully populated, finite `Difference`
//! tree or nothing at all; recoverable failures along the way degrade to
//! weaker comparisons and leave an explanatory comment on the nearest
//! node. Temporary extractions are owned by the handles that reference
//! them, so they are released on every exit path, including early
//! returns, errors, and cancellation.

use crate::container::{Container, DirContainer};
use crate::fuzzy::{FuzzyCandidate, FuzzyMatcher};
use crate::handle::{FileHandle, FileKind};
use crate::registry::{ComparatorRegistry, StructuralComparator};
use crate::text_diff;
use crate::tools;
use deepdiff_common::{
    ComparatorFailure, Difference, DeepDiffError, Limits, Result, SMALL_FILE_THRESHOLD,
};
use rayon::prelude::*;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct DiffEngine {
    limits: Limits,
    cancel: Option<Arc<AtomicBool>>,
}

impl DiffEngine {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            cancel: None,
        }
    }

    /// Attach a shared cancellation flag. It is checked at every
    /// recursion entry and before any external tool is spawned.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Compare two root paths supplied by the caller.
    pub fn compare_paths(&self, path1: &Path, path2: &Path) -> Result<Option<Difference>> {
        let a = FileHandle::from_path(path1)?;
        let b = FileHandle::from_path(path2)?;
        info!(
            "comparing {} ({} bytes) with {} ({} bytes)",
            a.progress_name(),
            a.size(),
            b.progress_name(),
            b.size()
        );
        self.compare(&a, &b, None)
    }

    /// Central recursive comparison. `source` overrides the display
    /// sources of the resulting node (used for same-named container
    /// members).
    pub fn compare(
        &self,
        a: &FileHandle,
        b: &FileHandle,
        source: Option<&str>,
    ) -> Result<Option<Difference>> {
        self.check_cancelled()?;

        match (a.kind(), b.kind()) {
            (FileKind::Regular, FileKind::Regular) => self.compare_regular(a, b, source),
            (FileKind::Directory, FileKind::Directory) => self.compare_directories(a, b, source),
            (FileKind::Symlink, FileKind::Symlink) => Ok(self.compare_symlinks(a, b, source)),
            (FileKind::Device, FileKind::Device) => Ok(self.compare_devices(a, b, source)),
            _ => Ok(self.compare_kind_mismatch(a, b, source)),
        }
    }

    fn compare_regular(
        &self,
        a: &FileHandle,
        b: &FileHandle,
        source: Option<&str>,
    ) -> Result<Option<Difference>> {
        if self.has_same_content(a, b)? {
            return Ok(None);
        }

        let registry = ComparatorRegistry::global();
        let format1 = registry.specialize(a);
        let format2 = registry.specialize(b);
        let structural = if format1 == format2 {
            format1.structural()
        } else {
            None
        };
        self.compare_regular_with(a, b, source, structural)
    }

    /// Separated from `compare_regular` so tests can inject a comparator
    /// without going through the process-wide registry.
    pub(crate) fn compare_regular_with(
        &self,
        a: &FileHandle,
        b: &FileHandle,
        source: Option<&str>,
        structural: Option<&dyn StructuralComparator>,
    ) -> Result<Option<Difference>> {
        let registry = ComparatorRegistry::global();
        let format1 = registry.specialize(a);
        let format2 = registry.specialize(b);

        let mut details: Vec<Difference> = Vec::new();
        let mut comments: Vec<String> = Vec::new();
        let mut had_capability = structural.is_some();

        if let Some(comparator) = structural {
            self.check_cancelled()?;
            match comparator.compare_structure(a, b, &self.limits, self.cancel.as_deref()) {
                Ok(Some(node)) => details.push(node),
                Ok(None) => {}
                Err(failure) => {
                    debug!(
                        "{} failed for {}: {}",
                        comparator.describe(),
                        a.progress_name(),
                        failure
                    );
                    comments.extend(failure_comments(&failure));
                }
            }
            // a tool killed by cancellation surfaces here, not as a comment
            self.check_cancelled()?;
        }

        let container1 = format1.open_container(a);
        let container2 = format2.open_container(b);
        had_capability |= container1.is_some() || container2.is_some();
        match (container1, container2) {
            (Some(Ok(c1)), Some(Ok(c2))) => {
                details.extend(self.compare_containers(c1.as_ref(), c2.as_ref())?);
            }
            (Some(Err(err)), _) | (_, Some(Err(err))) => {
                comments.push(format!(
                    "container extraction failed ({err}); falling back to binary comparison"
                ));
            }
            _ => {}
        }

        if !details.is_empty() {
            let (source1, source2) = node_sources(a, b, source);
            let mut node = Difference::new(source1, source2);
            node.comments = comments;
            node.add_details(details);
            return Ok(Some(node));
        }

        match self.fallback_diff(a, b, source) {
            Some(mut node) => {
                if had_capability && comments.is_empty() {
                    node.add_comment(format!(
                        "No file format specific differences found inside, yet data differs ({})",
                        a.mime_type()
                    ));
                }
                for comment in comments {
                    node.add_comment(comment);
                }
                Ok(Some(node))
            }
            None if comments.is_empty() => Ok(None),
            None => {
                // failures must never be silently swallowed
                let (source1, source2) = node_sources(a, b, source);
                let mut node = Difference::new(source1, source2);
                node.comments = comments;
                Ok(Some(node))
            }
        }
    }

    fn compare_directories(
        &self,
        a: &FileHandle,
        b: &FileHandle,
        source: Option<&str>,
    ) -> Result<Option<Difference>> {
        let (source1, source2) = node_sources(a, b, source);
        let mut node = Difference::new(source1, source2);

        match (DirContainer::open(a), DirContainer::open(b)) {
            (Ok(c1), Ok(c2)) => {
                let details = self.compare_containers(&c1, &c2)?;
                if details.is_empty() {
                    return Ok(None);
                }
                node.add_details(details);
            }
            (Err(err), _) | (_, Err(err)) => {
                node.add_comment(format!(
                    "error reading directory ({err}); assuming contents differ"
                ));
            }
        }
        Ok(Some(node))
    }

    fn compare_symlinks(
        &self,
        a: &FileHandle,
        b: &FileHandle,
        source: Option<&str>,
    ) -> Option<Difference> {
        let target1 = a.link_target();
        let target2 = b.link_target();
        if target1.is_some() && target1 == target2 {
            return None;
        }

        let (source1, source2) = node_sources(a, b, source);
        let mut node = Difference::new(source1, source2);
        node.add_comment("symlink");

        match (target1, target2) {
            (Some(t1), Some(t2)) => {
                let outcome = text_diff::diff_strings(
                    &format!("destination: {t1}\n"),
                    &format!("destination: {t2}\n"),
                    a.progress_name(),
                    b.progress_name(),
                    &self.limits,
                );
                node.unified_diff = outcome.unified;
            }
            _ => node.add_comment("unable to read symlink target; assuming targets differ"),
        }
        Some(node)
    }

    fn compare_devices(
        &self,
        a: &FileHandle,
        b: &FileHandle,
        source: Option<&str>,
    ) -> Option<Difference> {
        let desc1 = a.device_description();
        let desc2 = b.device_description();
        if desc1 == desc2 {
            return None;
        }

        let (source1, source2) = node_sources(a, b, source);
        let mut node = Difference::new(source1, source2);
        node.add_comment("device");
        let outcome = text_diff::diff_strings(
            &format!("{desc1}\n"),
            &format!("{desc2}\n"),
            a.progress_name(),
            b.progress_name(),
            &self.limits,
        );
        node.unified_diff = outcome.unified;
        Some(node)
    }

    fn compare_kind_mismatch(
        &self,
        a: &FileHandle,
        b: &FileHandle,
        source: Option<&str>,
    ) -> Option<Difference> {
        let (source1, source2) = node_sources(a, b, source);
        let label1 = a.kind().label();
        let label2 = b.kind().label();

        let mut node = Difference::new(source1, source2);
        if label1 == label2 {
            // both are unsupported special files; content is opaque here
            node.add_comment(format!("unsupported {label1}; assuming inputs differ"));
        } else {
            node.add_comment(format!("file type changed from {label1} to {label2}"));
            let outcome = text_diff::diff_strings(
                &format!("{label1}\n"),
                &format!("{label2}\n"),
                a.progress_name(),
                b.progress_name(),
                &self.limits,
            );
            node.unified_diff = outcome.unified;
        }
        Some(node)
    }

    /// Compare members of two containers: same-named members pairwise (in
    /// parallel, results re-ordered into container iteration order),
    /// one-sided members through the fuzzy matcher, leftovers as
    /// added/removed nodes.
    fn compare_containers(
        &self,
        c1: &dyn Container,
        c2: &dyn Container,
    ) -> Result<Vec<Difference>> {
        let names1 = c1.member_names();
        let names2 = c2.member_names();
        let set1: HashSet<&str> = names1.iter().map(String::as_str).collect();
        let set2: HashSet<&str> = names2.iter().map(String::as_str).collect();

        let common: Vec<&str> = names1
            .iter()
            .map(String::as_str)
            .filter(|n| set2.contains(n))
            .collect();
        let only1: Vec<&str> = names1
            .iter()
            .map(String::as_str)
            .filter(|n| !set2.contains(n))
            .collect();
        let only2: Vec<&str> = names2
            .iter()
            .map(String::as_str)
            .filter(|n| !set1.contains(n))
            .collect();

        // Sibling members are independent; compare them on the worker
        // pool and keep container order by collecting indexed results.
        let compared: Vec<Option<Difference>> = common
            .par_iter()
            .map(|name| {
                let m1 = self.expect_member(c1, name)?;
                let m2 = self.expect_member(c2, name)?;
                self.compare(m1, m2, Some(name))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut details: Vec<Difference> = compared.into_iter().flatten().collect();

        let removed: Vec<&FileHandle> = only1
            .iter()
            .map(|n| self.expect_member(c1, n))
            .collect::<Result<_>>()?;
        let added: Vec<&FileHandle> = only2
            .iter()
            .map(|n| self.expect_member(c2, n))
            .collect::<Result<_>>()?;

        let removed_candidates: Vec<FuzzyCandidate> = removed
            .iter()
            .map(|h| FuzzyCandidate {
                name: h.name(),
                digest: h.fuzzy_digest(),
            })
            .collect();
        let added_candidates: Vec<FuzzyCandidate> = added
            .iter()
            .map(|h| FuzzyCandidate {
                name: h.name(),
                digest: h.fuzzy_digest(),
            })
            .collect();

        let matcher = FuzzyMatcher::new(self.limits.fuzzy_threshold);
        let mut pairs = matcher.pair(&removed_candidates, &added_candidates);
        pairs.sort_by_key(|p| p.removed);

        let mut removed_matched = vec![false; removed.len()];
        let mut added_matched = vec![false; added.len()];
        for pair in &pairs {
            removed_matched[pair.removed] = true;
            added_matched[pair.added] = true;
            let m1 = removed[pair.removed];
            let m2 = added[pair.added];
            debug!(
                "fuzzy-paired {} with {} (score {})",
                m1.progress_name(),
                m2.progress_name(),
                pair.score
            );
            if let Some(mut node) = self.compare(m1, m2, None)? {
                node.add_comment(format!(
                    "Files similar despite different names (difference score: {})",
                    pair.score
                ));
                details.push(node);
            }
        }

        for (i, member) in removed.iter().enumerate() {
            if !removed_matched[i] {
                details.push(Difference::comment_only(
                    member.name(),
                    member.name(),
                    "member only present in the first container",
                ));
            }
        }
        for (i, member) in added.iter().enumerate() {
            if !added_matched[i] {
                details.push(Difference::comment_only(
                    member.name(),
                    member.name(),
                    "member only present in the second container",
                ));
            }
        }

        Ok(details)
    }

    fn expect_member<'c>(
        &self,
        container: &'c dyn Container,
        name: &str,
    ) -> Result<&'c FileHandle> {
        container.member(name).ok_or_else(|| {
            DeepDiffError::Contract(format!(
                "container {} listed member '{name}' but cannot produce it",
                container.display_name()
            ))
        })
    }

    /// Byte-level equality check. Small pairs are compared in process;
    /// larger pairs go through `cmp`, and a missing `cmp` degrades to a
    /// streaming hash comparison. Unreadable content means "assume
    /// different" at this layer; the only error is cancellation, which
    /// also kills an in-flight `cmp`.
    fn has_same_content(&self, a: &FileHandle, b: &FileHandle) -> Result<bool> {
        if a.size() != b.size() {
            return Ok(false);
        }
        if a.size() <= SMALL_FILE_THRESHOLD {
            return Ok(match (fs::read(a.path()), fs::read(b.path())) {
                (Ok(bytes1), Ok(bytes2)) => bytes1 == bytes2,
                _ => false,
            });
        }

        self.check_cancelled()?;
        let args: &[&OsStr] = &[
            OsStr::new("-s"),
            a.path().as_os_str(),
            b.path().as_os_str(),
        ];
        match tools::run_with_status("cmp", args, self.cancel.as_deref()) {
            Ok(output) => {
                self.check_cancelled()?;
                Ok(output.status.success())
            }
            Err(ComparatorFailure::ToolNotFound { .. }) => {
                debug!("cmp not available; comparing content hashes in process");
                let h1 = self.hash_file(a.path());
                let h2 = self.hash_file(b.path());
                match (h1, h2) {
                    (Ok(h1), Ok(h2)) => Ok(h1 == h2),
                    (Err(DeepDiffError::Cancelled), _) | (_, Err(DeepDiffError::Cancelled)) => {
                        Err(DeepDiffError::Cancelled)
                    }
                    _ => Ok(false),
                }
            }
            Err(_) => Ok(false),
        }
    }

    fn hash_file(&self, path: &Path) -> Result<blake3::Hash> {
        let mut file = fs::File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            self.check_cancelled()?;
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }

    fn fallback_diff(
        &self,
        a: &FileHandle,
        b: &FileHandle,
        source: Option<&str>,
    ) -> Option<Difference> {
        let (source1, source2) = node_sources(a, b, source);
        match text_diff::diff_files(
            a.path(),
            b.path(),
            a.progress_name(),
            b.progress_name(),
            &self.limits,
        ) {
            Ok(outcome) if outcome.is_empty() => None,
            Ok(outcome) => {
                let mut node = Difference::new(source1, source2);
                node.unified_diff = outcome.unified;
                node.comments = outcome.comments;
                Some(node)
            }
            Err(err) => Some(Difference::comment_only(
                source1,
                source2,
                format!("unable to read file content ({err}); assuming inputs differ"),
            )),
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(DeepDiffError::Cancelled),
            _ => Ok(()),
        }
    }
}

fn node_sources(a: &FileHandle, b: &FileHandle, source: Option<&str>) -> (String, String) {
    match source {
        Some(s) => (s.to_string(), s.to_string()),
        None => (
            a.progress_name().to_string(),
            b.progress_name().to_string(),
        ),
    }
}

/// Render one recoverable comparator failure as explanatory comments for
/// the nearest difference node.
pub(crate) fn failure_comments(failure: &ComparatorFailure) -> Vec<String> {
    match failure {
        ComparatorFailure::ToolNotFound { tool, package } => {
            let mut comments = vec![format!(
                "'{tool}' not available in path. Falling back to binary comparison."
            )];
            if let Some(package) = package {
                comments.push(format!("Install '{package}' to get a better output."));
            }
            comments
        }
        ComparatorFailure::ToolFailed {
            command,
            code,
            output,
        } => {
            let text = String::from_utf8_lossy(output);
            let body = if text.is_empty() {
                "<none>".to_string()
            } else {
                indent(&text)
            };
            vec![format!(
                "Command `{command}` exited with {code}. Output:\n{body}"
            )]
        }
        ComparatorFailure::UnparseableOutput { command } => {
            vec![format!("Error parsing output of `{command}`")]
        }
    }
}

fn indent(text: &str) -> String {
    static LINE_START: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = LINE_START.get_or_init(|| regex::Regex::new(r"(?m)^").unwrap());
    re.replace_all(text, "    ").into_owned()
}
