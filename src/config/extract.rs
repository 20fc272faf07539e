//! Assignment extraction from shell-style configuration text.
//!
//! Only flat `[export ]NAME=VALUE` lines are recognized. Values are literal:
//! one layer of surrounding double quotes is removed, nothing is expanded.
use crate::error::MergeError;

/// A single variable assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigVariable {
    /// Identifier on the left of `=`.
    pub name: String,
    /// Literal value with one layer of double quotes removed.
    pub value: String,
    /// Whether the line was written with `export`.
    pub exported: bool,
}

/// An assignment together with the exact text needed to re-render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// The parsed variable.
    pub var: ConfigVariable,
    /// Leading whitespace of the original line.
    pub indent: String,
    /// Right-hand side exactly as written (quotes included).
    pub raw_value: String,
}

impl Assignment {
    /// Render this assignment back to a single line.
    #[must_use]
    pub fn render(&self) -> String {
        render_line(
            &self.indent,
            self.var.exported,
            &self.var.name,
            &self.raw_value,
        )
    }

    /// Copy of this assignment with another right-hand side, keeping the
    /// indentation and export style of `self`.
    #[must_use]
    pub fn with_value_of(&self, other: &Self) -> Self {
        Self {
            var: ConfigVariable {
                name: self.var.name.clone(),
                value: other.var.value.clone(),
                exported: self.var.exported,
            },
            indent: self.indent.clone(),
            raw_value: other.raw_value.clone(),
        }
    }
}

/// Classification of one line of configuration text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Empty or whitespace-only.
    Blank,
    /// A `#` comment.
    Comment,
    /// A well-formed assignment.
    Assignment(Assignment),
    /// Any other shell statement; never a candidate.
    Other,
    /// Looks like an assignment but cannot be used.
    Malformed(MergeError),
}

/// Result of [`extract`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Assignments in file order, duplicates included.
    pub variables: Vec<ConfigVariable>,
    /// One entry per rejected line.
    pub diagnostics: Vec<MergeError>,
}

/// Extract every assignment from `text`, in order.
///
/// Malformed candidates are reported in [`Extraction::diagnostics`] and
/// otherwise skipped.
#[must_use]
pub fn extract(text: &str) -> Extraction {
    let mut out = Extraction::default();
    for (idx, line) in text.lines().enumerate() {
        match parse_line(line, idx + 1) {
            ParsedLine::Assignment(a) => out.variables.push(a.var),
            ParsedLine::Malformed(e) => out.diagnostics.push(e),
            ParsedLine::Blank | ParsedLine::Comment | ParsedLine::Other => {}
        }
    }
    out
}

/// Classify a single line. `line_no` is 1-based and only used in diagnostics.
#[must_use]
pub fn parse_line(line: &str, line_no: usize) -> ParsedLine {
    let body = line.trim_start();
    if body.trim().is_empty() {
        return ParsedLine::Blank;
    }
    if body.starts_with('#') {
        return ParsedLine::Comment;
    }
    let indent = line.strip_suffix(body).unwrap_or_default();

    let (exported, rest) = match strip_export(body) {
        Some(rest) => (true, rest),
        None => (false, body),
    };

    let Some((name, raw)) = rest.split_once('=') else {
        if exported {
            return ParsedLine::Malformed(MergeError::ExportWithoutValue {
                line: line_no,
                text: line.trim().to_string(),
            });
        }
        return ParsedLine::Other;
    };

    // `echo a=b`, `[ "$x" = y ]` and friends are statements, not assignments.
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        if exported {
            return ParsedLine::Malformed(MergeError::ExportWithoutValue {
                line: line_no,
                text: line.trim().to_string(),
            });
        }
        return ParsedLine::Other;
    }

    if !is_valid_name(name) {
        return ParsedLine::Malformed(MergeError::InvalidName {
            line: line_no,
            name: name.to_string(),
        });
    }

    let raw_value = raw.trim_end().to_string();
    ParsedLine::Assignment(Assignment {
        var: ConfigVariable {
            name: name.to_string(),
            value: unquote(&raw_value).to_string(),
            exported,
        },
        indent: indent.to_string(),
        raw_value,
    })
}

/// Whether `name` matches `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Render an assignment line.
#[must_use]
pub fn render_line(indent: &str, exported: bool, name: &str, raw_value: &str) -> String {
    if exported {
        format!("{indent}export {name}={raw_value}")
    } else {
        format!("{indent}{name}={raw_value}")
    }
}

/// Quote a literal value for writing into a config file.
#[must_use]
pub fn quote(value: &str) -> String {
    format!("\"{value}\"")
}

fn strip_export(body: &str) -> Option<&str> {
    let rest = body.strip_prefix("export")?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw)
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    fn assignment(line: &str) -> Assignment {
        match parse_line(line, 1) {
            ParsedLine::Assignment(a) => a,
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn plain_and_exported_assignments() {
        let a = assignment("MWAN_IFACE=\"wan\"");
        assert_eq!(a.var.name, "MWAN_IFACE");
        assert_eq!(a.var.value, "wan");
        assert!(!a.var.exported);

        let b = assignment("export STARLINK_IP=\"192.168.100.1\"");
        assert_eq!(b.var.value, "192.168.100.1");
        assert!(b.var.exported);
    }

    #[test]
    fn strips_exactly_one_layer_of_quotes() {
        assert_eq!(assignment("A=\"\"x\"\"").var.value, "\"x\"");
        assert_eq!(assignment("A=unquoted").var.value, "unquoted");
        assert_eq!(assignment("A=\"half").var.value, "\"half");
        assert_eq!(assignment("A=\"").var.value, "\"");
    }

    #[test]
    fn empty_value_is_an_assignment() {
        let a = assignment("EMPTY=");
        assert_eq!(a.var.value, "");
        assert_eq!(a.raw_value, "");
    }

    #[test]
    fn single_quotes_are_kept_literally() {
        assert_eq!(assignment("A='x'").var.value, "'x'");
    }

    #[test]
    fn keeps_indent_and_raw_value_for_rendering() {
        let a = assignment("  export TOKEN=\"abc\"   ");
        assert_eq!(a.indent, "  ");
        assert_eq!(a.raw_value, "\"abc\"");
        assert_eq!(a.render(), "  export TOKEN=\"abc\"");
    }

    #[test]
    fn export_without_assignment_is_malformed() {
        let parsed = parse_line("export LONELY", 4);
        assert_eq!(
            parsed,
            ParsedLine::Malformed(MergeError::ExportWithoutValue {
                line: 4,
                text: "export LONELY".to_string(),
            })
        );
    }

    #[test]
    fn bad_identifier_is_malformed() {
        let parsed = parse_line("9LIVES=cat", 2);
        assert!(matches!(
            parsed,
            ParsedLine::Malformed(MergeError::InvalidName { line: 2, .. })
        ));
        assert!(matches!(
            parse_line("foo-bar=1", 1),
            ParsedLine::Malformed(_)
        ));
    }

    #[test]
    fn statements_are_not_candidates() {
        assert_eq!(parse_line("echo a=b", 1), ParsedLine::Other);
        assert_eq!(parse_line("[ \"$X\" = y ] && exit 0", 1), ParsedLine::Other);
        assert_eq!(parse_line("exporter=1", 1), assignment_line("exporter=1"));
        assert_eq!(parse_line("# A=1", 1), ParsedLine::Comment);
        assert_eq!(parse_line("   ", 1), ParsedLine::Blank);
    }

    fn assignment_line(line: &str) -> ParsedLine {
        ParsedLine::Assignment(assignment(line))
    }

    #[test]
    fn extract_keeps_order_and_duplicates() {
        let text = "# header\nA=1\nexport B=\"two\"\nA=3\nexport\nbad-name=x\n";
        let out = extract(text);
        let names: Vec<_> = out.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "A"]);
        assert_eq!(out.variables[2].value, "3");
        assert_eq!(out.diagnostics.len(), 1, "only bad-name is malformed");
    }

    #[test]
    fn bare_export_keyword_is_not_an_assignment() {
        assert_eq!(parse_line("export", 1), ParsedLine::Other);
    }

    #[test]
    fn name_grammar() {
        assert!(is_valid_name("_private"));
        assert!(is_valid_name("A1_B2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1A"));
        assert!(!is_valid_name("A.B"));
    }

    #[test]
    fn with_value_of_keeps_target_style() {
        let template = assignment("export MEMBER=\"wan1\"");
        let live = assignment("MEMBER='wan2'");
        let merged = template.with_value_of(&live);
        assert_eq!(merged.render(), "export MEMBER='wan2'");
        assert!(merged.var.exported);
    }
}
