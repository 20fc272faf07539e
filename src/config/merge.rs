//! Template-driven merge of a live configuration.
//!
//! The template defines the structure of the result. User values from the
//! live config are substituted into it, unless they are still placeholders.
//! Variables the template does not know about are carried along in a
//! delimited section at the end.
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::bookkeeping::{self, is_bookkeeping};
use super::document::{ConfigDocument, Line};
use super::extract::Assignment;
use super::placeholder::is_placeholder;
use crate::error::{ConfigError, MergeError};

/// Opens the section holding variables the template does not declare.
pub const EXTRAS_BEGIN: &str = "# >>> Preserved custom settings >>>";
/// Provenance note written under [`EXTRAS_BEGIN`].
pub const EXTRAS_NOTE: &str =
    "# Carried over from the previous configuration; not declared by the template.";
/// Closes the preserved section.
pub const EXTRAS_END: &str = "# <<< Preserved custom settings <<<";

/// Outcome of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// The merged configuration text.
    pub merged: String,
    /// Template variables that took the user's value.
    pub preserved_count: usize,
    /// Template variables absent from the live config.
    pub new_default_count: usize,
    /// Template variables whose live value was still a placeholder.
    pub kept_default_count: usize,
    /// Live-only variables carried into the preserved section.
    pub extra_count: usize,
    /// Skipped or reconciled entries.
    pub diagnostics: Vec<MergeError>,
}

/// Merge `live` into `template`.
///
/// Deterministic, and idempotent on the merged text:
/// `merge_config(t, &merge_config(t, l).merged).merged` equals
/// `merge_config(t, l).merged`.
#[must_use]
pub fn merge_config(template: &str, live: &str) -> MergeResult {
    let template_doc = ConfigDocument::parse(&bookkeeping::strip(template));
    let live_doc = ConfigDocument::parse(live);

    let mut result = MergeResult::default();
    result
        .diagnostics
        .extend(template_doc.diagnostics().iter().cloned());
    result
        .diagnostics
        .extend(live_doc.diagnostics().iter().cloned());

    let live_effective = live_doc.effective();
    let template_names: HashSet<&str> = template_doc.names().into_iter().collect();

    let mut substitutions: HashMap<&str, &Assignment> = HashMap::new();
    for name in template_doc.names() {
        match live_effective.get(name) {
            Some(user) if !is_placeholder(&user.var.value) => {
                result.preserved_count += 1;
                substitutions.insert(name, *user);
            }
            Some(_) => result.kept_default_count += 1,
            None => result.new_default_count += 1,
        }
    }

    let substituted: Vec<Line> = template_doc
        .lines()
        .iter()
        .map(|line| match line {
            Line::Assignment(t) => substitutions
                .get(t.var.name.as_str())
                .map_or_else(|| line.clone(), |user| Line::Assignment(t.with_value_of(user))),
            Line::Verbatim(_) => line.clone(),
        })
        .collect();

    let reconciled = reconcile(substituted, &mut result.diagnostics);
    let mut merged = ConfigDocument::from_lines(reconciled).to_text();

    let extras: Vec<String> = live_doc
        .names()
        .into_iter()
        .filter(|name| !template_names.contains(name) && !is_bookkeeping(name))
        .filter_map(|name| {
            let effective = live_effective.get(name)?;
            let exported = live_doc
                .assignments()
                .any(|a| a.var.name == name && a.var.exported);
            let mut line = (*effective).clone();
            line.indent.clear();
            line.var.exported = exported;
            Some(line.render())
        })
        .collect();

    if !extras.is_empty() {
        result.extra_count = extras.len();
        if !merged.is_empty() && !merged.ends_with("\n\n") {
            merged.push('\n');
        }
        merged.push_str(EXTRAS_BEGIN);
        merged.push('\n');
        merged.push_str(EXTRAS_NOTE);
        merged.push('\n');
        for line in extras {
            merged.push_str(&line);
            merged.push('\n');
        }
        merged.push_str(EXTRAS_END);
        merged.push('\n');
    }

    result.merged = merged;
    result
}

/// Merge the files at `template_path` and `live_path`.
///
/// A missing live config merges as empty (first install). Nothing is
/// written; the caller stages and validates the result.
///
/// # Errors
///
/// Returns [`ConfigError::TemplateUnreadable`] if the template cannot be read
/// and [`ConfigError::Io`] if the live config exists but cannot be read.
pub fn merge_files(template_path: &Path, live_path: &Path) -> Result<MergeResult, ConfigError> {
    let template =
        std::fs::read_to_string(template_path).map_err(|source| ConfigError::TemplateUnreadable {
            path: template_path.to_path_buf(),
            source,
        })?;
    let live = match std::fs::read_to_string(live_path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: live_path.to_path_buf(),
                source,
            });
        }
    };
    Ok(merge_config(&template, &live))
}

/// Collapse duplicate definitions to one line per name.
///
/// The first exported line wins, or the first line if none is exported.
fn reconcile(lines: Vec<Line>, diagnostics: &mut Vec<MergeError>) -> Vec<Line> {
    let mut keep: HashMap<String, usize> = HashMap::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some(a) = line.assignment() else { continue };
        match keep.get(&a.var.name) {
            None => {
                keep.insert(a.var.name.clone(), idx);
            }
            Some(&kept_idx) => {
                let kept_exported = lines
                    .get(kept_idx)
                    .and_then(Line::assignment)
                    .is_some_and(|k| k.var.exported);
                if a.var.exported && !kept_exported {
                    keep.insert(a.var.name.clone(), idx);
                }
            }
        }
    }

    let mut out = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let Some(a) = line.assignment() else {
            out.push(line.clone());
            continue;
        };
        let kept_idx = keep.get(&a.var.name).copied().unwrap_or(idx);
        if kept_idx == idx {
            out.push(line.clone());
            continue;
        }
        if let Some(kept) = lines.get(kept_idx).and_then(Line::assignment)
            && kept.var.value != a.var.value
        {
            diagnostics.push(MergeError::DivergentDuplicate {
                name: a.var.name.clone(),
                kept: kept.var.value.clone(),
                dropped: a.var.value.clone(),
            });
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
# Failover agent configuration
export STARLINK_IP=\"192.168.100.1\"
export MWAN_IFACE=\"wan\"
export MWAN_MEMBER=\"member1\"

# Notifications
export PUSHOVER_TOKEN=\"YOUR_PUSHOVER_TOKEN\"
export CHECK_INTERVAL=\"60\"
";

    fn value(text: &str, name: &str) -> Option<String> {
        ConfigDocument::parse(text).value(name).map(str::to_string)
    }

    fn occurrences(text: &str, name: &str) -> usize {
        ConfigDocument::parse(text)
            .assignments()
            .filter(|a| a.var.name == name)
            .count()
    }

    #[test]
    fn empty_live_yields_template() {
        let r = merge_config(TEMPLATE, "");
        assert_eq!(r.merged, TEMPLATE);
        assert_eq!(r.new_default_count, 5);
        assert_eq!(r.preserved_count, 0);
        assert_eq!(r.extra_count, 0);
    }

    #[test]
    fn user_values_are_substituted_in_template_style() {
        let live = "MWAN_IFACE=\"wwan0\"\nexport PUSHOVER_TOKEN=\"a1b2c3\"\n";
        let r = merge_config(TEMPLATE, live);
        assert!(r.merged.contains("export MWAN_IFACE=\"wwan0\"\n"));
        assert!(r.merged.contains("export PUSHOVER_TOKEN=\"a1b2c3\"\n"));
        assert_eq!(r.preserved_count, 2);
        assert_eq!(r.new_default_count, 3);
    }

    #[test]
    fn placeholder_in_live_keeps_template_default() {
        let live = "export PUSHOVER_TOKEN=\"YOUR_OLD_TOKEN\"\n";
        let r = merge_config(TEMPLATE, live);
        assert_eq!(
            value(&r.merged, "PUSHOVER_TOKEN").as_deref(),
            Some("YOUR_PUSHOVER_TOKEN")
        );
        assert_eq!(r.kept_default_count, 1);
    }

    #[test]
    fn last_live_assignment_wins() {
        let live = "MWAN_IFACE=\"first\"\nMWAN_IFACE=\"second\"\n";
        let r = merge_config(TEMPLATE, live);
        assert_eq!(value(&r.merged, "MWAN_IFACE").as_deref(), Some("second"));
    }

    #[test]
    fn extras_are_preserved_once_in_delimited_section() {
        let live = "CUSTOM_HOOK=\"/root/hook.sh\"\nexport CUSTOM_HOOK=\"/root/hook2.sh\"\n";
        let r = merge_config(TEMPLATE, live);
        assert_eq!(r.extra_count, 1);
        let tail = r.merged.split(EXTRAS_BEGIN).nth(1).unwrap();
        assert!(tail.starts_with(&format!("\n{EXTRAS_NOTE}\nexport CUSTOM_HOOK=\"/root/hook2.sh\"\n{EXTRAS_END}\n")));
        assert_eq!(occurrences(&r.merged, "CUSTOM_HOOK"), 1);
    }

    #[test]
    fn bookkeeping_from_live_is_never_copied() {
        let live = format!(
            "export MWAN_IFACE=\"wwan0\"\n{}",
            bookkeeping::RecoveryBookkeeping {
                installed_version: "v0.9".to_string(),
                installed_timestamp: "2020-01-01T00:00:00Z".to_string(),
                recovery_url: "https://old".to_string(),
            }
            .render()
        );
        let r = merge_config(TEMPLATE, &live);
        assert!(!r.merged.contains("INSTALLED_VERSION"));
        assert!(!r.merged.contains(bookkeeping::BEGIN_MARKER));
        assert_eq!(r.extra_count, 0);
    }

    #[test]
    fn template_duplicates_reconcile_to_exported_line() {
        let template = "MODE=\"a\"\nexport MODE=\"a\"\n";
        let r = merge_config(template, "MODE=\"b\"\n");
        assert_eq!(r.merged, "export MODE=\"b\"\n");
        assert!(r.diagnostics.is_empty());
    }

    #[test]
    fn divergent_duplicate_is_reported() {
        let template = "MODE=\"a\"\nexport MODE=\"b\"\n";
        let r = merge_config(template, "");
        assert_eq!(r.merged, "export MODE=\"b\"\n");
        assert_eq!(
            r.diagnostics,
            vec![MergeError::DivergentDuplicate {
                name: "MODE".to_string(),
                kept: "b".to_string(),
                dropped: "a".to_string(),
            }]
        );
    }

    #[test]
    fn malformed_live_entries_are_skipped_with_diagnostic() {
        let live = "export BROKEN\n2FAST=yes\nMWAN_IFACE=\"wwan0\"\n";
        let r = merge_config(TEMPLATE, live);
        assert_eq!(r.diagnostics.len(), 2);
        assert_eq!(r.preserved_count, 1);
        assert!(!r.merged.contains("2FAST"));
    }

    #[test]
    fn merge_is_idempotent() {
        let live = "\
MWAN_IFACE=\"wwan0\"
export PUSHOVER_TOKEN=\"CHANGE_ME\"
CUSTOM=1
";
        let once = merge_config(TEMPLATE, live);
        let twice = merge_config(TEMPLATE, &once.merged);
        assert_eq!(once.merged, twice.merged);
    }

    #[test]
    fn merge_files_missing_template_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("config.sh");
        std::fs::write(&live, "A=1\n").unwrap();
        let err = merge_files(&dir.path().join("missing.sh"), &live).unwrap_err();
        assert!(matches!(err, ConfigError::TemplateUnreadable { .. }));
        assert_eq!(std::fs::read_to_string(&live).unwrap(), "A=1\n");
    }

    #[test]
    fn merge_files_missing_live_is_first_install() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("config.template.sh");
        std::fs::write(&template, TEMPLATE).unwrap();
        let r = merge_files(&template, &dir.path().join("config.sh")).unwrap();
        assert_eq!(r.merged, TEMPLATE);
    }
}
