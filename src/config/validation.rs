//! Soundness checks for candidate configuration files.
//!
//! A [`Validator`] runs a fixed sequence of [`ConfigValidator`] checks and
//! gates every activation: committing a merge, restoring a backup, and
//! accepting a snapshot.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::document::ConfigDocument;
use super::settings::ValidationSettings;
use crate::exec::Executor;

/// A single failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The file being checked.
    pub source: String,
    /// Which check failed (e.g., "size", "syntax").
    pub item: String,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationWarning {
    /// Warning raised by `source` for the check `item`.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            item: item.into(),
            message: message.into(),
        }
    }
}

/// A file loaded once and handed to every check.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Path of the file.
    pub path: PathBuf,
    /// Raw bytes, or `None` when the file could not be read.
    pub bytes: Option<Vec<u8>>,
}

impl Candidate {
    /// Read `path`; a missing or unreadable file yields `bytes: None`.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            bytes: std::fs::read(path).ok(),
        }
    }

    fn text(&self) -> Option<String> {
        self.bytes
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }
}

/// Trait for configuration checks.
pub trait ConfigValidator {
    /// Check the candidate and return every problem found.
    fn validate(&self, candidate: &Candidate) -> Vec<ValidationWarning>;

    /// Short name of the check (e.g., "size", "syntax").
    fn name(&self) -> &'static str;
}

/// File exists, is non-empty, and is at least `min_size` bytes.
#[derive(Debug)]
pub struct SizeValidator {
    min_size: u64,
}

impl SizeValidator {
    /// Reject files smaller than `min_size` bytes.
    #[must_use]
    pub const fn new(min_size: u64) -> Self {
        Self { min_size }
    }
}

impl ConfigValidator for SizeValidator {
    fn validate(&self, candidate: &Candidate) -> Vec<ValidationWarning> {
        let message = match candidate.bytes.as_deref() {
            None => "file does not exist or cannot be read".to_string(),
            Some([]) => "file is empty".to_string(),
            Some(bytes) => {
                let len = bytes.len() as u64;
                if len >= self.min_size {
                    return Vec::new();
                }
                format!(
                    "file is {len} bytes, below the {} byte minimum",
                    self.min_size
                )
            }
        };
        vec![ValidationWarning::new(
            candidate.source(),
            self.name(),
            message,
        )]
    }

    fn name(&self) -> &'static str {
        "size"
    }
}

/// Content parses under the interpreter's grammar (`<shell> -n`).
///
/// An interpreter that cannot be run is a failure.
#[derive(Debug)]
pub struct SyntaxValidator<'a> {
    executor: &'a dyn Executor,
    shell: &'a str,
}

impl<'a> SyntaxValidator<'a> {
    /// Check syntax with `shell -n`, run through `executor`.
    #[must_use]
    pub const fn new(executor: &'a dyn Executor, shell: &'a str) -> Self {
        Self { executor, shell }
    }
}

impl ConfigValidator for SyntaxValidator<'_> {
    fn validate(&self, candidate: &Candidate) -> Vec<ValidationWarning> {
        if candidate.bytes.is_none() {
            return Vec::new();
        }
        let path = candidate.path.to_string_lossy();
        let message = match self.executor.run_unchecked(self.shell, &["-n", &path]) {
            Ok(result) if result.success => return Vec::new(),
            Ok(result) => {
                let detail = result.stderr.lines().next().unwrap_or("").trim();
                if detail.is_empty() {
                    format!("{} -n reported a syntax error", self.shell)
                } else {
                    format!("syntax error: {detail}")
                }
            }
            Err(e) => format!("interpreter {} unavailable: {e:#}", self.shell),
        };
        vec![ValidationWarning::new(
            candidate.source(),
            self.name(),
            message,
        )]
    }

    fn name(&self) -> &'static str {
        "syntax"
    }
}

/// Each required key is assigned a non-empty value.
#[derive(Debug)]
pub struct RequiredKeysValidator<'a> {
    keys: &'a [String],
}

impl<'a> RequiredKeysValidator<'a> {
    /// Require a non-empty value for each of `keys`.
    #[must_use]
    pub const fn new(keys: &'a [String]) -> Self {
        Self { keys }
    }
}

impl ConfigValidator for RequiredKeysValidator<'_> {
    fn validate(&self, candidate: &Candidate) -> Vec<ValidationWarning> {
        let Some(text) = candidate.text() else {
            return Vec::new();
        };
        let doc = ConfigDocument::parse(&text);
        self.keys
            .iter()
            .filter(|key| doc.value(key).is_none_or(|v| v.trim().is_empty()))
            .map(|key| {
                ValidationWarning::new(
                    candidate.source(),
                    self.name(),
                    format!("required key {key} is missing or empty"),
                )
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "required-keys"
    }
}

/// Whether to report every failure or stop at the first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Run every check and collect all reasons.
    #[default]
    Diagnostic,
    /// Stop after the first failing check.
    FailFast,
}

/// Verdict on one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// `true` when no check failed.
    pub ok: bool,
    /// One entry per failure, in check order.
    pub reasons: Vec<String>,
}

/// Runs the configured checks against candidate files.
#[derive(Debug, Clone)]
pub struct Validator {
    executor: Arc<dyn Executor>,
    settings: ValidationSettings,
    mode: ValidationMode,
}

impl Validator {
    /// Validator in [`ValidationMode::Diagnostic`] mode.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>, settings: ValidationSettings) -> Self {
        Self {
            executor,
            settings,
            mode: ValidationMode::Diagnostic,
        }
    }

    /// Same validator with another mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Validate the file at `path`.
    #[must_use]
    pub fn validate(&self, path: &Path) -> ValidationReport {
        let candidate = Candidate::load(path);
        let size = SizeValidator::new(self.settings.min_size);
        let syntax = SyntaxValidator::new(self.executor.as_ref(), &self.settings.shell);
        let keys = RequiredKeysValidator::new(&self.settings.required_keys);
        let checks: [&dyn ConfigValidator; 3] = [&size, &syntax, &keys];

        let mut reasons = Vec::new();
        for check in checks {
            let warnings = check.validate(&candidate);
            let failed = !warnings.is_empty();
            for w in warnings {
                tracing::debug!("validation {} failed for {}: {}", w.item, w.source, w.message);
                reasons.push(w.message);
            }
            if failed && self.mode == ValidationMode::FailFast {
                break;
            }
        }
        ValidationReport {
            ok: reasons.is_empty(),
            reasons,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::{ExecResult, SystemExecutor};
    use anyhow::{Result, bail};

    const VALID: &str = "\
# failover agent
export STARLINK_IP=\"192.168.100.1\"
export MWAN_IFACE=\"wan\"
export MWAN_MEMBER=\"member1\"
";

    /// Executor standing in for a host without the interpreter.
    #[derive(Debug)]
    struct NoShell;

    impl Executor for NoShell {
        fn run(&self, program: &str, _: &[&str]) -> Result<ExecResult> {
            bail!("{program}: not found")
        }
        fn run_in_with_env(
            &self,
            _: &Path,
            program: &str,
            _: &[&str],
            _: &[(&str, &str)],
        ) -> Result<ExecResult> {
            bail!("{program}: not found")
        }
        fn run_unchecked(&self, program: &str, _: &[&str]) -> Result<ExecResult> {
            bail!("{program}: not found")
        }
        fn which(&self, _: &str) -> bool {
            false
        }
    }

    fn validator() -> Validator {
        Validator::new(Arc::new(SystemExecutor), ValidationSettings::default())
    }

    fn write(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.sh");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn accepts_valid_config() {
        let (_dir, path) = write(VALID);
        let report = validator().validate(&path);
        assert!(report.ok, "{:?}", report.reasons);
    }

    #[test]
    fn rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = validator().validate(&dir.path().join("nope.sh"));
        assert!(!report.ok);
        assert_eq!(report.reasons.len(), 1);
    }

    #[test]
    fn rejects_empty_file() {
        let (_dir, path) = write("");
        let report = validator().validate(&path);
        assert!(!report.ok);
        assert!(report.reasons.contains(&"file is empty".to_string()));
    }

    #[test]
    fn rejects_truncated_file() {
        let (_dir, path) = write("export STARLINK_IP=\"1\"\n");
        let report = validator().validate(&path);
        assert!(!report.ok);
        assert!(report.reasons[0].contains("below the 64 byte minimum"));
    }

    #[test]
    fn rejects_syntax_error() {
        let (_dir, path) = write(&format!("{VALID}if then fi (\n"));
        let report = validator().validate(&path);
        assert!(!report.ok);
        assert!(report.reasons.iter().any(|r| r.contains("syntax")));
    }

    #[test]
    fn rejects_missing_required_key() {
        let (_dir, path) = write(&VALID.replace("export MWAN_MEMBER=\"member1\"\n", "# padding padding\n"));
        let report = validator().validate(&path);
        assert_eq!(
            report.reasons,
            vec!["required key MWAN_MEMBER is missing or empty".to_string()]
        );
    }

    #[test]
    fn empty_required_value_counts_as_missing() {
        let (_dir, path) = write(&VALID.replace("\"wan\"", "\"\""));
        let report = validator().validate(&path);
        assert_eq!(
            report.reasons,
            vec!["required key MWAN_IFACE is missing or empty".to_string()]
        );
    }

    #[test]
    fn unavailable_interpreter_fails_closed() {
        let (_dir, path) = write(VALID);
        let v = Validator::new(Arc::new(NoShell), ValidationSettings::default());
        let report = v.validate(&path);
        assert!(!report.ok);
        assert!(report.reasons[0].contains("interpreter sh unavailable"));
    }

    #[test]
    fn diagnostic_mode_collects_every_reason() {
        let (_dir, path) = write("X=1\n");
        let report = validator().validate(&path);
        // size + three required keys
        assert_eq!(report.reasons.len(), 4);
    }

    #[test]
    fn fail_fast_stops_at_first_check() {
        let (_dir, path) = write("X=1\n");
        let report = validator()
            .with_mode(ValidationMode::FailFast)
            .validate(&path);
        assert_eq!(report.reasons.len(), 1);
    }
}
