//! Unified-diff parser (Diff Normalizer core).
//!
//! Features:
//! - Works even if file headers (---/+++) are missing (hunks-only input).
//! - Ignores `\ No newline at end of file` marker lines.
//! - Binary patch heuristics (`GIT binary patch`, `Binary files ... differ`).
//! - Strict about `@@` headers: a bad header is `MalformedDiff` for the file,
//!   never a silently empty hunk list.
//!
//! Produces provider-agnostic hunks/lines for later position mapping.

use crate::errors::ParseError;
use crate::provider::types::{Hunk, HunkLine};

/// Parses unified diff text into hunks/lines.
///
/// Robust to missing file headers; only `@@` headers are required. Returns
/// `ParseError::InvalidHunkHeader` when a header cannot be read, which the
/// normalizer records as `MalformedDiff` for the affected file only.
pub fn parse_unified_diff(s: &str) -> Result<Vec<Hunk>, ParseError> {
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut cur: Option<Hunk> = None;
    let mut old_line = 0u32;
    let mut new_line = 0u32;

    for line in s.lines() {
        if line.starts_with("@@") {
            if let Some(h) = cur.take() {
                if !h.lines.is_empty() {
                    hunks.push(h);
                }
            }
            let (old_start, old_lines, new_start, new_lines) = parse_hunk_header(line)?;
            old_line = old_start;
            new_line = new_start;
            cur = Some(Hunk {
                old_start,
                old_lines,
                new_start,
                new_lines,
                lines: Vec::new(),
            });
            continue;
        }

        // "\ No newline at end of file" — not part of diff content.
        if line.starts_with('\\') {
            continue;
        }

        let Some(h) = cur.as_mut() else {
            // Prelude before the first '@@' (diff/index/---/+++ headers).
            continue;
        };

        if let Some(rest) = line.strip_prefix('+') {
            h.lines.push(HunkLine::Added {
                new_line,
                content: rest.to_string(),
            });
            new_line += 1;
        } else if let Some(rest) = line.strip_prefix('-') {
            h.lines.push(HunkLine::Removed {
                old_line,
                content: rest.to_string(),
            });
            old_line += 1;
        } else {
            // ' '-prefixed context, or a bare line some providers emit.
            let content = line.strip_prefix(' ').unwrap_or(line);
            h.lines.push(HunkLine::Context {
                old_line,
                new_line,
                content: content.to_string(),
            });
            old_line += 1;
            new_line += 1;
        }
    }

    if let Some(h) = cur.take() {
        if !h.lines.is_empty() {
            hunks.push(h);
        }
    }
    Ok(hunks)
}

/// Parses "@@ -12,7 +12,9 @@ optional section" into (12, 7, 12, 9).
fn parse_hunk_header(line: &str) -> Result<(u32, u32, u32, u32), ParseError> {
    let bad = || ParseError::InvalidHunkHeader(line.to_string());

    // Strip leading "@@" and everything after the closing "@@".
    let inner = line
        .strip_prefix("@@")
        .and_then(|rest| rest.split("@@").next())
        .ok_or_else(bad)?
        .trim();

    let mut parts = inner.split_whitespace();
    let old = parts.next().ok_or_else(bad)?;
    let new = parts.next().ok_or_else(bad)?;

    let old = old.strip_prefix('-').ok_or_else(bad)?;
    let new = new.strip_prefix('+').ok_or_else(bad)?;

    let (old_start, old_lines) = split_nums(old).ok_or_else(bad)?;
    let (new_start, new_lines) = split_nums(new).ok_or_else(bad)?;
    Ok((old_start, old_lines, new_start, new_lines))
}

/// Splits "12,7" or "12" into (start, len). Len defaults to 1 per the
/// unified diff format.
fn split_nums(s: &str) -> Option<(u32, u32)> {
    if let Some((a, b)) = s.split_once(',') {
        Some((a.parse().ok()?, b.parse().ok()?))
    } else {
        Some((s.parse().ok()?, 1))
    }
}

/// Simple heuristic to detect binary patches or messages in unified diff.
pub fn looks_like_binary_patch(s: &str) -> bool {
    s.contains("GIT binary patch")
        || s.starts_with("Binary files ")
        || (s.starts_with("Files ") && s.contains(" differ"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "\
@@ -1,3 +1,4 @@
 fn main() {
-    println!(\"hi\");
+    println!(\"hello\");
+    run();
 }
";

    #[test]
    fn basic_hunk() {
        let hunks = parse_unified_diff(SIMPLE).unwrap();
        assert_eq!(hunks.len(), 1);
        let h = &hunks[0];
        assert_eq!((h.old_start, h.old_lines, h.new_start, h.new_lines), (1, 3, 1, 4));
        assert_eq!(h.lines.len(), 5);
        match &h.lines[1] {
            HunkLine::Removed { old_line, .. } => assert_eq!(*old_line, 2),
            other => panic!("expected removed line, got {other:?}"),
        }
        match &h.lines[3] {
            HunkLine::Added { new_line, content } => {
                assert_eq!(*new_line, 3);
                assert_eq!(content, "    run();");
            }
            other => panic!("expected added line, got {other:?}"),
        }
    }

    #[test]
    fn line_numbers_strictly_increase_per_side() {
        let hunks = parse_unified_diff(SIMPLE).unwrap();
        let mut last_new = 0u32;
        let mut last_old = 0u32;
        for l in &hunks[0].lines {
            if let Some(n) = l.new_line() {
                assert!(n > last_new, "new side must increase");
                last_new = n;
            }
            if let HunkLine::Removed { old_line, .. } | HunkLine::Context { old_line, .. } = l {
                assert!(*old_line > last_old, "old side must increase");
                last_old = *old_line;
            }
        }
    }

    #[test]
    fn missing_file_headers_is_fine() {
        let s = "@@ -5 +5 @@\n-a\n+b\n";
        let hunks = parse_unified_diff(s).unwrap();
        assert_eq!(hunks.len(), 1);
        // Single-line shorthand: len defaults to 1.
        assert_eq!(hunks[0].old_lines, 1);
        assert_eq!(hunks[0].new_lines, 1);
    }

    #[test]
    fn malformed_header_is_an_error() {
        let s = "@@ this is not a header @@\n+x\n";
        assert!(matches!(
            parse_unified_diff(s),
            Err(ParseError::InvalidHunkHeader(_))
        ));
    }

    #[test]
    fn no_newline_marker_is_skipped() {
        let s = "@@ -1 +1 @@\n-a\n+b\n\\ No newline at end of file\n";
        let hunks = parse_unified_diff(s).unwrap();
        assert_eq!(hunks[0].lines.len(), 2);
    }

    #[test]
    fn empty_input_yields_zero_hunks() {
        assert!(parse_unified_diff("").unwrap().is_empty());
    }

    #[test]
    fn binary_heuristics() {
        assert!(looks_like_binary_patch("Binary files a/x.png and b/x.png differ"));
        assert!(looks_like_binary_patch("literal 1234\nGIT binary patch\n"));
        assert!(!looks_like_binary_patch(SIMPLE));
    }
}
