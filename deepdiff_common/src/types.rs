use serde::{Deserialize, Serialize};

/// Small files are byte-compared in process; anything larger goes through
/// an external byte comparison (64 KiB, matching the original tool).
pub const SMALL_FILE_THRESHOLD: u64 = 65536;

/// One found discrepancy plus its nested discrepancies.
///
/// A node exists only when a material difference was found; "no
/// difference" is represented by the absence of a node, never by an empty
/// one. `details` is ordered by the deterministic iteration order of the
/// comparison that produced it (container member order, structural record
/// order), so output is reproducible across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Difference {
    pub source1: String,
    pub source2: String,
    /// Human-readable annotations, e.g. fallback explanations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    /// Unified line-diff payload; absent for pure grouping nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unified_diff: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Difference>,
}

/// Visitor verdict for [`Difference::walk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    /// Keep walking siblings but do not descend into this node.
    SkipChildren,
    /// Abort the whole walk, e.g. because an output budget is exhausted.
    Stop,
}

impl Difference {
    pub fn new(source1: impl Into<String>, source2: impl Into<String>) -> Self {
        Self {
            source1: source1.into(),
            source2: source2.into(),
            comments: Vec::new(),
            unified_diff: None,
            details: Vec::new(),
        }
    }

    /// A node whose sole content is an explanatory comment. Used when a
    /// recoverable failure occurs and no other payload can be produced,
    /// so that failures are never silently swallowed.
    pub fn comment_only(
        source1: impl Into<String>,
        source2: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        let mut d = Self::new(source1, source2);
        d.add_comment(comment);
        d
    }

    pub fn add_comment(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    pub fn add_details(&mut self, details: impl IntoIterator<Item = Difference>) {
        self.details.extend(details);
    }

    /// True when the node carries neither payload, nor comments, nor
    /// children. Such nodes must not be attached to a tree.
    pub fn is_empty(&self) -> bool {
        self.unified_diff.is_none() && self.comments.is_empty() && self.details.is_empty()
    }

    /// Depth-first traversal, parent before children. Returns `false` if
    /// the visitor stopped the walk early. The walk is a pure function of
    /// the tree and may be restarted from scratch at any time. Presenters
    /// enforce their byte budgets by returning [`WalkControl::Stop`].
    pub fn walk<F>(&self, visitor: &mut F) -> bool
    where
        F: FnMut(&Difference, usize) -> WalkControl,
    {
        self.walk_at(visitor, 0)
    }

    fn walk_at<F>(&self, visitor: &mut F, depth: usize) -> bool
    where
        F: FnMut(&Difference, usize) -> WalkControl,
    {
        match visitor(self, depth) {
            WalkControl::Stop => return false,
            WalkControl::SkipChildren => return true,
            WalkControl::Continue => {}
        }
        for child in &self.details {
            if !child.walk_at(visitor, depth + 1) {
                return false;
            }
        }
        true
    }
}

/// Size-limit configuration honored by the engine and the presenters.
///
/// A value of 0 disables the corresponding limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum number of lines fed into one line-diff invocation.
    #[serde(default = "default_max_diff_input_lines")]
    pub max_diff_input_lines: usize,

    /// Maximum number of diff lines retained per block. Default 0
    /// (disabled); mostly useful to bound memory on degenerate inputs.
    #[serde(default)]
    pub max_diff_block_lines_saved: usize,

    /// Fuzzy-matching threshold: 0 disables rename detection, 60 is the
    /// default, 400 is high fuzziness.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: u32,

    /// Presenter byte budget for one report.
    #[serde(default = "default_max_report_size")]
    pub max_report_size: usize,

    /// Presenter byte budget for one child page in paginated output.
    #[serde(default = "default_max_page_size_child")]
    pub max_page_size_child: usize,

    /// Paginated presenters multiply their per-block line limit by this
    /// ratio on the parent page. The engine never interprets it.
    #[serde(default = "default_parent_block_lines_ratio")]
    pub parent_block_lines_ratio: u32,
}

fn default_max_diff_input_lines() -> usize {
    1_048_576
}

fn default_fuzzy_threshold() -> u32 {
    60
}

fn default_max_report_size() -> usize {
    2_000_000
}

fn default_max_page_size_child() -> usize {
    200_000
}

fn default_parent_block_lines_ratio() -> u32 {
    1
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_diff_input_lines: default_max_diff_input_lines(),
            max_diff_block_lines_saved: 0,
            fuzzy_threshold: default_fuzzy_threshold(),
            max_report_size: default_max_report_size(),
            max_page_size_child: default_max_page_size_child(),
            parent_block_lines_ratio: default_parent_block_lines_ratio(),
        }
    }
}

impl Limits {
    /// Lift every limit that the caller has not pinned explicitly.
    pub fn without_default_limits(mut self) -> Self {
        self.max_diff_input_lines = 0;
        self.max_report_size = 0;
        self
    }
}
