//! Order-preserving parse of a configuration file.
//!
//! A [`ConfigDocument`] keeps every line of the source text so it can be
//! written back unchanged, while exposing the assignments as an ordered
//! name lookup with shell semantics (the last assignment wins).
use std::collections::{HashMap, HashSet};

use super::extract::{Assignment, ParsedLine, parse_line};
use crate::error::MergeError;

/// One line of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A usable assignment.
    Assignment(Assignment),
    /// Anything else, kept verbatim (comments, blanks, statements, and
    /// malformed candidates).
    Verbatim(String),
}

impl Line {
    /// Text of the line as it will be written.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Assignment(a) => a.render(),
            Self::Verbatim(text) => text.clone(),
        }
    }

    /// The assignment on this line, if any.
    #[must_use]
    pub const fn assignment(&self) -> Option<&Assignment> {
        match self {
            Self::Assignment(a) => Some(a),
            Self::Verbatim(_) => None,
        }
    }
}

/// A parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    lines: Vec<Line>,
    diagnostics: Vec<MergeError>,
}

impl ConfigDocument {
    /// Parse `text` line by line.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut doc = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            match parse_line(raw, idx + 1) {
                ParsedLine::Assignment(a) => doc.lines.push(Line::Assignment(a)),
                ParsedLine::Malformed(e) => {
                    doc.diagnostics.push(e);
                    doc.lines.push(Line::Verbatim(raw.to_string()));
                }
                ParsedLine::Blank | ParsedLine::Comment | ParsedLine::Other => {
                    doc.lines.push(Line::Verbatim(raw.to_string()));
                }
            }
        }
        doc
    }

    /// Build a document from already-classified lines.
    #[must_use]
    pub const fn from_lines(lines: Vec<Line>) -> Self {
        Self {
            lines,
            diagnostics: Vec::new(),
        }
    }

    /// All lines in order.
    #[must_use]
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Consume the document, yielding its lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<Line> {
        self.lines
    }

    /// Lines that were rejected while parsing.
    #[must_use]
    pub fn diagnostics(&self) -> &[MergeError] {
        &self.diagnostics
    }

    /// Every assignment in file order, duplicates included.
    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.lines.iter().filter_map(Line::assignment)
    }

    /// Variable names in order of first appearance.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.assignments()
            .map(|a| a.var.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// The effective assignment of every variable: last one wins.
    #[must_use]
    pub fn effective(&self) -> HashMap<&str, &Assignment> {
        self.assignments()
            .map(|a| (a.var.name.as_str(), a))
            .collect()
    }

    /// The effective assignment of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Assignment> {
        self.lines
            .iter()
            .rev()
            .filter_map(Line::assignment)
            .find(|a| a.var.name == name)
    }

    /// Effective literal value of `name`.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|a| a.var.value.as_str())
    }

    /// Serialize back to text with a trailing newline.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.render());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Failover agent configuration
export STARLINK_IP=\"192.168.100.1\"

MWAN_IFACE=\"wan\"
if [ -n \"$DEBUG\" ]; then set -x; fi
export MWAN_IFACE=\"wwan\"
export
";

    #[test]
    fn round_trips_text() {
        let doc = ConfigDocument::parse(SAMPLE);
        assert_eq!(doc.to_text(), SAMPLE);
    }

    #[test]
    fn last_assignment_is_effective() {
        let doc = ConfigDocument::parse(SAMPLE);
        assert_eq!(doc.value("MWAN_IFACE"), Some("wwan"));
        assert!(doc.get("MWAN_IFACE").unwrap().var.exported);
        assert_eq!(doc.value("MISSING"), None);
    }

    #[test]
    fn names_in_first_appearance_order() {
        let doc = ConfigDocument::parse(SAMPLE);
        assert_eq!(doc.names(), ["STARLINK_IP", "MWAN_IFACE"]);
        assert_eq!(doc.effective().len(), 2);
    }

    #[test]
    fn malformed_lines_are_kept_and_reported() {
        let doc = ConfigDocument::parse("export ORPHAN\n1BAD=x\nGOOD=1\n");
        assert_eq!(doc.diagnostics().len(), 2);
        assert_eq!(doc.lines().len(), 3);
        assert_eq!(doc.to_text(), "export ORPHAN\n1BAD=x\nGOOD=1\n");
        assert_eq!(doc.names(), ["GOOD"]);
    }

    #[test]
    fn empty_text_is_empty_document() {
        let doc = ConfigDocument::parse("");
        assert!(doc.lines().is_empty());
        assert_eq!(doc.to_text(), "");
    }
}
