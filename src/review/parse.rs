//! Result Parser: model output → typed findings.
//!
//! This is a hostile-input boundary. The model's answer is untrusted text;
//! we decode against a closed schema (tagged category enum), verify every
//! location against what the originating unit actually covers, and drop —
//! with a count, never silently — anything the model hallucinated.

use serde::Deserialize;

use crate::chunk::ReviewUnit;
use crate::errors::ParseError;

/// Closed severity set. Anything else fails decoding (`SchemaInvalid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Critical,
    High,
    Suggestion,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Critical => "critical",
            Category::High => "high",
            Category::Suggestion => "suggestion",
        }
    }
}

/// One validated finding, located on the new-file side.
#[derive(Debug, Clone)]
pub struct ReviewFinding {
    pub category: Category,
    pub path: String,
    pub line: u32,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Findings that survived validation, plus the count of locations dropped
/// because the unit does not cover them (wrong file or out-of-range line).
#[derive(Debug, Clone, Default)]
pub struct ParsedFindings {
    pub findings: Vec<ReviewFinding>,
    pub dropped_out_of_unit: usize,
}

/// Raw wire shape. `suggestion` is genuinely optional.
#[derive(Debug, Deserialize)]
struct RawFinding {
    category: Category,
    file: String,
    line: u32,
    message: String,
    #[serde(default)]
    suggestion: Option<String>,
}

/// Some models wrap the list in an object; accept both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOutput {
    List(Vec<RawFinding>),
    Wrapped { findings: Vec<RawFinding> },
}

/// Decode and validate raw model output for one unit.
///
/// Returns `SchemaInvalid` when the text is not the required JSON shape at
/// all; the invoker then gets one repair attempt. Locations the unit does
/// not cover are dropped and counted, not errors.
pub fn parse_findings(raw: &str, unit: &ReviewUnit) -> Result<ParsedFindings, ParseError> {
    let stripped = strip_code_fences(raw);
    let decoded: RawOutput = serde_json::from_str(stripped)
        .map_err(|e| ParseError::SchemaInvalid(e.to_string()))?;
    let list = match decoded {
        RawOutput::List(l) => l,
        RawOutput::Wrapped { findings } => findings,
    };

    let mut out = ParsedFindings::default();
    for f in list {
        if f.message.trim().is_empty() {
            return Err(ParseError::SchemaInvalid("empty message".into()));
        }
        // The model sometimes prefixes the path with '/'.
        let path_ok = f.file.trim_start_matches('/') == unit.path;
        if !path_ok || !unit.covers(f.line) {
            out.dropped_out_of_unit += 1;
            continue;
        }
        out.findings.push(ReviewFinding {
            category: f.category,
            path: unit.path.clone(),
            line: f.line,
            message: f.message,
            suggestion: f.suggestion.filter(|s| !s.trim().is_empty()),
        });
    }
    Ok(out)
}

/// Strip a surrounding markdown code fence (```json … ```), if present.
fn strip_code_fences(raw: &str) -> &str {
    let t = raw.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // Drop the info string ("json") up to the first newline.
    let rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{LineRange, ReviewUnit};
    use crate::provider::types::ChangeKind;

    fn unit() -> ReviewUnit {
        ReviewUnit {
            id: 0,
            path: "src/db.py".into(),
            kind: ChangeKind::Modified,
            language: "python",
            excerpt: String::new(),
            covered: vec![LineRange { start: 40, end: 45 }],
            line_count: 6,
            oversized: false,
        }
    }

    #[test]
    fn valid_list_decodes() {
        let raw = r#"[{"category":"critical","file":"src/db.py","line":42,"message":"SQL injection via string formatting","suggestion":"use bound parameters"}]"#;
        let parsed = parse_findings(raw, &unit()).unwrap();
        assert_eq!(parsed.findings.len(), 1);
        assert_eq!(parsed.findings[0].category, Category::Critical);
        assert_eq!(parsed.findings[0].line, 42);
        assert_eq!(parsed.dropped_out_of_unit, 0);
    }

    #[test]
    fn fenced_output_is_tolerated() {
        let raw = "```json\n[{\"category\":\"high\",\"file\":\"/src/db.py\",\"line\":41,\"message\":\"m\"}]\n```";
        let parsed = parse_findings(raw, &unit()).unwrap();
        assert_eq!(parsed.findings.len(), 1);
        // Leading slash normalized away.
        assert_eq!(parsed.findings[0].path, "src/db.py");
    }

    #[test]
    fn wrapped_object_is_tolerated() {
        let raw = r#"{"findings":[{"category":"suggestion","file":"src/db.py","line":40,"message":"m"}]}"#;
        let parsed = parse_findings(raw, &unit()).unwrap();
        assert_eq!(parsed.findings.len(), 1);
    }

    #[test]
    fn unknown_category_is_schema_invalid() {
        let raw = r#"[{"category":"blocker","file":"src/db.py","line":42,"message":"m"}]"#;
        assert!(matches!(
            parse_findings(raw, &unit()),
            Err(ParseError::SchemaInvalid(_))
        ));
    }

    #[test]
    fn prose_is_schema_invalid() {
        assert!(matches!(
            parse_findings("Looks good to me!", &unit()),
            Err(ParseError::SchemaInvalid(_))
        ));
    }

    #[test]
    fn out_of_range_line_is_dropped_and_counted() {
        let raw = r#"[{"category":"high","file":"src/db.py","line":999,"message":"m"}]"#;
        let parsed = parse_findings(raw, &unit()).unwrap();
        assert!(parsed.findings.is_empty());
        assert_eq!(parsed.dropped_out_of_unit, 1);
    }

    #[test]
    fn wrong_file_is_dropped_and_counted() {
        let raw = r#"[{"category":"high","file":"other.py","line":42,"message":"m"}]"#;
        let parsed = parse_findings(raw, &unit()).unwrap();
        assert!(parsed.findings.is_empty());
        assert_eq!(parsed.dropped_out_of_unit, 1);
    }

    #[test]
    fn empty_array_is_zero_findings() {
        let parsed = parse_findings("[]", &unit()).unwrap();
        assert!(parsed.findings.is_empty());
    }
}
