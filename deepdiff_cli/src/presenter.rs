//! Renders a difference tree as text or JSON.
//!
//! The text renderer walks the tree with a byte budget; when the budget
//! runs out it emits one truncation marker and stops the walk. The
//! rendered report is a pure function of the tree, so re-rendering with
//! a larger budget yields a superset of the truncated output.

use deepdiff_common::{Difference, Limits, WalkControl};

const TRUNCATION_MARKER: &str = "[ report truncated; raise --max-report-size to see more ]";

pub fn render_json(diff: &Difference) -> serde_json::Result<String> {
    serde_json::to_string_pretty(diff)
}

pub fn render_text(diff: &Difference, limits: &Limits) -> String {
    let mut out = String::new();
    let budget = limits.max_report_size;
    let mut truncated = false;

    diff.walk(&mut |node, depth| {
        let rendered = render_node(node, depth, limits);
        if budget > 0 && out.len() + rendered.len() > budget {
            truncated = true;
            return WalkControl::Stop;
        }
        out.push_str(&rendered);
        WalkControl::Continue
    });

    if truncated {
        out.push_str(TRUNCATION_MARKER);
        out.push('\n');
    }
    out
}

fn render_node(node: &Difference, depth: usize, limits: &Limits) -> String {
    let mut out = String::new();
    let pipes = "│ ".repeat(depth.saturating_sub(1));

    if depth == 0 {
        out.push_str(&format!("--- {}\n", node.source1));
        out.push_str(&format!("+++ {}\n", node.source2));
    } else if node.source1 == node.source2 {
        out.push_str(&format!("{pipes}├── {}\n", node.source1));
    } else {
        out.push_str(&format!("{pipes}├── {} -> {}\n", node.source1, node.source2));
    }

    for comment in &node.comments {
        for line in comment.lines() {
            out.push_str(&format!("{pipes}│┄ {line}\n"));
        }
    }

    if let Some(unified) = &node.unified_diff {
        let block_budget = block_budget(depth, limits);
        let mut written = 0usize;
        for line in unified.lines() {
            if block_budget > 0 && written + line.len() + 1 > block_budget {
                out.push_str(&format!("{pipes}│ [ diff block truncated ]\n"));
                break;
            }
            written += line.len() + 1;
            out.push_str(&format!("{pipes}│ {line}\n"));
        }
    }
    out
}

// Children share the page budget; the root block gets it scaled by the
// parent ratio.
fn block_budget(depth: usize, limits: &Limits) -> usize {
    if depth == 0 {
        limits.max_page_size_child * limits.parent_block_lines_ratio as usize
    } else {
        limits.max_page_size_child
    }
}
