//! Bounded byte/line diff generation, the engine's final fallback.
//!
//! Text inputs get a unified line diff; binary inputs are rendered as a
//! hex dump first and the dumps are line-diffed. Both directions honor
//! the configured input and output line ceilings, so a pathological pair
//! of inputs cannot blow up CPU, memory, or report size.

use deepdiff_common::Limits;
use similar::TextDiff;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// Result of one fallback diff invocation.
#[derive(Debug, Default)]
pub struct DiffOutcome {
    pub unified: Option<String>,
    pub comments: Vec<String>,
}

impl DiffOutcome {
    pub fn is_empty(&self) -> bool {
        self.unified.is_none() && self.comments.is_empty()
    }
}

/// Line-diff two files, falling back to a hex-dump diff when either side
/// is not text. Callers invoke this only for content already known to be
/// unequal, so a read cap that hides the difference still yields a
/// non-empty outcome. IO errors bubble up so the caller can apply its
/// "unreadable means different" policy.
pub fn diff_files(
    path1: &Path,
    path2: &Path,
    name1: &str,
    name2: &str,
    limits: &Limits,
) -> io::Result<DiffOutcome> {
    // Binary content is dumped at 16 bytes per line, so the input line
    // ceiling doubles as a read ceiling.
    let byte_cap = limits
        .max_diff_input_lines
        .checked_mul(16)
        .filter(|_| limits.max_diff_input_lines > 0);
    let (bytes1, capped1) = read_capped(path1, byte_cap)?;
    let (bytes2, capped2) = read_capped(path2, byte_cap)?;
    let capped = capped1 || capped2;

    let mut outcome = match (String::from_utf8(bytes1), String::from_utf8(bytes2)) {
        (Ok(text1), Ok(text2)) if !text1.contains('\0') && !text2.contains('\0') => {
            diff_strings(&text1, &text2, name1, name2, limits)
        }
        (text1, text2) => {
            let bytes1 = text1.map(String::into_bytes).unwrap_or_else(|e| e.into_bytes());
            let bytes2 = text2.map(String::into_bytes).unwrap_or_else(|e| e.into_bytes());
            let mut outcome = diff_strings(
                &hexdump(&bytes1),
                &hexdump(&bytes2),
                name1,
                name2,
                limits,
            );
            if outcome.unified.is_some() {
                outcome.comments.push("binary data, hex dump shown".to_string());
            }
            outcome
        }
    };

    // A hit read cap must never turn into a silent "no difference":
    // equal prefixes say nothing about the bytes past the cap.
    if capped {
        let cap = byte_cap.unwrap_or(usize::MAX);
        outcome.comments.push(format!("diff input truncated after {cap} bytes"));
        if outcome.unified.is_none() {
            outcome.comments.push(
                "compared prefixes match; differences lie beyond the truncation point".to_string(),
            );
        }
    }
    Ok(outcome)
}

/// Unified line diff between two strings, bounded by
/// `max_diff_input_lines` (lines fed in) and `max_diff_block_lines_saved`
/// (lines retained). Equal inputs produce an empty outcome.
pub fn diff_strings(
    text1: &str,
    text2: &str,
    name1: &str,
    name2: &str,
    limits: &Limits,
) -> DiffOutcome {
    let mut outcome = DiffOutcome::default();

    let (input1, truncated1) = truncate_lines(text1, limits.max_diff_input_lines);
    let (input2, truncated2) = truncate_lines(text2, limits.max_diff_input_lines);
    if truncated1 || truncated2 {
        outcome.comments.push(format!(
            "diff input truncated after {} lines",
            limits.max_diff_input_lines
        ));
    }

    if input1 == input2 {
        return outcome;
    }

    let diff = TextDiff::from_lines(input1.as_ref(), input2.as_ref());
    let mut unified = diff
        .unified_diff()
        .context_radius(3)
        .header(name1, name2)
        .to_string();

    let saved_limit = limits.max_diff_block_lines_saved;
    if saved_limit > 0 {
        let line_count = unified.lines().count();
        if line_count > saved_limit {
            unified = unified
                .lines()
                .take(saved_limit)
                .collect::<Vec<_>>()
                .join("\n");
            unified.push('\n');
            outcome.comments.push(format!(
                "diff output truncated after {saved_limit} lines"
            ));
        }
    }

    outcome.unified = Some(unified);
    outcome
}

/// Keep at most `limit` lines (0 disables). Returns borrowed input when
/// nothing was cut.
fn truncate_lines(text: &str, limit: usize) -> (std::borrow::Cow<'_, str>, bool) {
    if limit == 0 {
        return (text.into(), false);
    }
    let mut end = 0;
    let mut lines = 0;
    for (idx, b) in text.bytes().enumerate() {
        if b == b'\n' {
            lines += 1;
            if lines == limit {
                end = idx + 1;
                break;
            }
        }
    }
    if lines < limit {
        (text.into(), false)
    } else {
        (text[..end].into(), end < text.len())
    }
}

/// Reads at most `cap` bytes; the flag reports whether content was left
/// unread.
fn read_capped(path: &Path, cap: Option<usize>) -> io::Result<(Vec<u8>, bool)> {
    match cap {
        None => Ok((fs::read(path)?, false)),
        Some(cap) => {
            let mut buf = Vec::new();
            fs::File::open(path)?
                .take(cap as u64 + 1)
                .read_to_end(&mut buf)?;
            let capped = buf.len() > cap;
            buf.truncate(cap);
            Ok((buf, capped))
        }
    }
}

/// Classic offset/hex/ascii dump, 16 bytes per line.
pub fn hexdump(data: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(16).enumerate() {
        out.push_str(&format!("{:08x}  ", row * 16));
        for (i, byte) in chunk.iter().enumerate() {
            if i == 8 {
                out.push(' ');
            }
            out.push_str(&format!("{byte:02x} "));
        }
        for i in chunk.len()..16 {
            if i == 8 {
                out.push(' ');
            }
            out.push_str("   ");
        }
        out.push_str(" |");
        for byte in chunk {
            let ch = if byte.is_ascii_graphic() || *byte == b' ' {
                *byte as char
            } else {
                '.'
            };
            out.push(ch);
        }
        out.push_str("|\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unlimited() -> Limits {
        Limits {
            max_diff_input_lines: 0,
            max_diff_block_lines_saved: 0,
            ..Limits::default()
        }
    }

    #[test]
    fn test_equal_text_yields_empty_outcome() {
        let outcome = diff_strings("a\nb\n", "a\nb\n", "x", "y", &unlimited());
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_single_line_change() {
        let outcome = diff_strings("a\nb\nc\n", "a\nB\nc\n", "left", "right", &unlimited());
        let unified = outcome.unified.unwrap();
        assert!(unified.contains("--- left"));
        assert!(unified.contains("+++ right"));
        assert!(unified.contains("-b"));
        assert!(unified.contains("+B"));
    }

    #[test]
    fn test_input_truncation_commented() {
        let left: String = (0..100).map(|i| format!("line {i}\n")).collect();
        let right: String = (0..100).map(|i| format!("LINE {i}\n")).collect();
        let limits = Limits {
            max_diff_input_lines: 10,
            ..unlimited()
        };
        let outcome = diff_strings(&left, &right, "l", "r", &limits);
        assert!(outcome
            .comments
            .iter()
            .any(|c| c.contains("truncated after 10 lines")));
        // nothing beyond line 9 survives truncation
        assert!(!outcome.unified.unwrap().contains("line 50"));
    }

    #[test]
    fn test_zero_limit_disables_truncation() {
        let left: String = (0..100).map(|i| format!("line {i}\n")).collect();
        let right = format!("{left}trailing\n");
        let outcome = diff_strings(&left, &right, "l", "r", &unlimited());
        assert!(outcome.comments.is_empty());
        assert!(outcome.unified.unwrap().contains("+trailing"));
    }

    #[test]
    fn test_output_truncation_commented() {
        let left: String = (0..50).map(|i| format!("a {i}\n")).collect();
        let right: String = (0..50).map(|i| format!("b {i}\n")).collect();
        let limits = Limits {
            max_diff_block_lines_saved: 5,
            ..unlimited()
        };
        let outcome = diff_strings(&left, &right, "l", "r", &limits);
        assert_eq!(outcome.unified.unwrap().lines().count(), 5);
        assert!(outcome
            .comments
            .iter()
            .any(|c| c.contains("output truncated after 5 lines")));
    }

    #[test]
    fn test_binary_inputs_get_hexdump_diff() {
        let temp = tempfile::TempDir::new().unwrap();
        let p1 = temp.path().join("a.bin");
        let p2 = temp.path().join("b.bin");
        fs::write(&p1, [0u8, 1, 2, 3, 0xff]).unwrap();
        fs::write(&p2, [0u8, 1, 2, 4, 0xff]).unwrap();

        let outcome = diff_files(&p1, &p2, "a.bin", "b.bin", &unlimited()).unwrap();
        assert!(outcome.comments.iter().any(|c| c.contains("hex dump")));
        assert!(outcome.unified.unwrap().contains("00000000"));
    }

    #[test]
    fn test_read_cap_hit_is_commented() {
        let temp = tempfile::TempDir::new().unwrap();
        let p1 = temp.path().join("a.bin");
        let p2 = temp.path().join("b.bin");
        let mut data1 = vec![0u8; 100];
        let mut data2 = vec![0u8; 100];
        data1[50] = 0xaa;
        data2[50] = 0xbb;
        fs::write(&p1, &data1).unwrap();
        fs::write(&p2, &data2).unwrap();

        // 2 nominal lines cap the read at 32 bytes, before the change
        let limits = Limits {
            max_diff_input_lines: 2,
            ..unlimited()
        };
        let outcome = diff_files(&p1, &p2, "a.bin", "b.bin", &limits).unwrap();
        assert!(!outcome.is_empty(), "capped equal prefixes must still report");
        assert!(outcome.unified.is_none());
        assert!(outcome
            .comments
            .iter()
            .any(|c| c.contains("truncated after 32 bytes")));
        assert!(outcome
            .comments
            .iter()
            .any(|c| c.contains("beyond the truncation point")));
    }

    #[test]
    fn test_read_cap_with_visible_difference_keeps_diff() {
        let temp = tempfile::TempDir::new().unwrap();
        let p1 = temp.path().join("a.bin");
        let p2 = temp.path().join("b.bin");
        let mut data1 = vec![0u8; 100];
        let mut data2 = vec![0u8; 100];
        data1[4] = 0xaa;
        data2[4] = 0xbb;
        fs::write(&p1, &data1).unwrap();
        fs::write(&p2, &data2).unwrap();

        let limits = Limits {
            max_diff_input_lines: 2,
            ..unlimited()
        };
        let outcome = diff_files(&p1, &p2, "a.bin", "b.bin", &limits).unwrap();
        assert!(outcome.unified.is_some());
        assert!(outcome
            .comments
            .iter()
            .any(|c| c.contains("truncated after 32 bytes")));
        assert!(!outcome
            .comments
            .iter()
            .any(|c| c.contains("beyond the truncation point")));
    }

    #[test]
    fn test_exact_cap_size_is_not_truncation() {
        let temp = tempfile::TempDir::new().unwrap();
        let p1 = temp.path().join("a.bin");
        let p2 = temp.path().join("b.bin");
        fs::write(&p1, vec![0u8; 32]).unwrap();
        fs::write(&p2, vec![1u8; 32]).unwrap();

        let limits = Limits {
            max_diff_input_lines: 2,
            ..unlimited()
        };
        let outcome = diff_files(&p1, &p2, "a.bin", "b.bin", &limits).unwrap();
        assert!(!outcome
            .comments
            .iter()
            .any(|c| c.contains("truncated after")));
    }

    #[test]
    fn test_hexdump_format() {
        let dump = hexdump(b"Hello");
        assert!(dump.contains("48 65 6c 6c 6f"));
        assert!(dump.contains("|Hello|"));
    }
}
