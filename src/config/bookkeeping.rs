//! The generated recovery bookkeeping block inside the live config.
//!
//! The block is always rewritten by the installer. Whatever a live config
//! says about these keys is stale by definition and is dropped on merge.
use chrono::{DateTime, SecondsFormat, Utc};

use super::document::{ConfigDocument, Line};
use super::extract::{quote, render_line};

/// First line of the generated block.
pub const BEGIN_MARKER: &str = "# >>> recovery bookkeeping (generated, do not edit) >>>";

/// Last line of the generated block.
pub const END_MARKER: &str = "# <<< recovery bookkeeping <<<";

/// Version the installation was last installed at.
pub const INSTALLED_VERSION: &str = "INSTALLED_VERSION";
/// When that install happened (RFC 3339, UTC).
pub const INSTALLED_TIMESTAMP: &str = "INSTALLED_TIMESTAMP";
/// Where the pinned installer can be fetched from.
pub const RECOVERY_URL: &str = "RECOVERY_URL";

/// Every variable owned by the bookkeeping block.
pub const BOOKKEEPING_KEYS: [&str; 3] = [INSTALLED_VERSION, INSTALLED_TIMESTAMP, RECOVERY_URL];

/// Whether `name` belongs to the bookkeeping block.
#[must_use]
pub fn is_bookkeeping(name: &str) -> bool {
    BOOKKEEPING_KEYS.contains(&name)
}

/// Freshly computed installation facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryBookkeeping {
    /// Installed release version.
    pub installed_version: String,
    /// Install time, RFC 3339.
    pub installed_timestamp: String,
    /// Installer URL for this exact version.
    pub recovery_url: String,
}

impl RecoveryBookkeeping {
    /// Bookkeeping stamped with the given time.
    #[must_use]
    pub fn new(
        installed_version: impl Into<String>,
        recovery_url: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            installed_version: installed_version.into(),
            installed_timestamp: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            recovery_url: recovery_url.into(),
        }
    }

    /// Bookkeeping stamped now.
    #[must_use]
    pub fn fresh(installed_version: impl Into<String>, recovery_url: impl Into<String>) -> Self {
        Self::new(installed_version, recovery_url, Utc::now())
    }

    /// Read the recorded facts from a live config, if a version is recorded.
    #[must_use]
    pub fn read(text: &str) -> Option<Self> {
        let doc = ConfigDocument::parse(text);
        let version = doc.value(INSTALLED_VERSION).filter(|v| !v.is_empty())?;
        Some(Self {
            installed_version: version.to_string(),
            installed_timestamp: doc.value(INSTALLED_TIMESTAMP).unwrap_or_default().to_string(),
            recovery_url: doc.value(RECOVERY_URL).unwrap_or_default().to_string(),
        })
    }

    /// Render the delimited block, newline-terminated.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(BEGIN_MARKER);
        out.push('\n');
        for (name, value) in [
            (INSTALLED_VERSION, &self.installed_version),
            (INSTALLED_TIMESTAMP, &self.installed_timestamp),
            (RECOVERY_URL, &self.recovery_url),
        ] {
            out.push_str(&render_line("", true, name, &quote(value)));
            out.push('\n');
        }
        out.push_str(END_MARKER);
        out.push('\n');
        out
    }
}

/// Remove the bookkeeping block and any stray bookkeeping assignment.
///
/// A begin marker without a matching end marker only loses the marker
/// itself; the lines after it are kept unless they are bookkeeping
/// assignments.
#[must_use]
pub fn strip(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let begin = lines.iter().position(|l| l.trim() == BEGIN_MARKER);
    let end = begin.and_then(|b| {
        lines
            .iter()
            .skip(b)
            .position(|l| l.trim() == END_MARKER)
            .map(|offset| b + offset)
    });

    let doc = ConfigDocument::parse(text);
    let kept: Vec<Line> = doc
        .into_lines()
        .into_iter()
        .enumerate()
        .filter(|(idx, line)| {
            if let (Some(b), Some(e)) = (begin, end)
                && (b..=e).contains(idx)
            {
                return false;
            }
            match line {
                Line::Assignment(a) => !is_bookkeeping(&a.var.name),
                Line::Verbatim(raw) => {
                    let t = raw.trim();
                    t != BEGIN_MARKER && t != END_MARKER
                }
            }
        })
        .map(|(_, line)| line)
        .collect();
    ConfigDocument::from_lines(kept).to_text()
}

/// Replace whatever bookkeeping `text` carries with `bookkeeping`.
#[must_use]
pub fn apply(text: &str, bookkeeping: &RecoveryBookkeeping) -> String {
    let mut out = strip(text);
    while out.ends_with("\n\n") {
        out.pop();
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&bookkeeping.render());
    out
}
