//! Utility functions for log paths, ANSI stripping, and time formatting.
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the log directory.
pub const LOG_DIR_ENV: &str = "FAILOVER_LOG_DIR";

/// Log directory used when [`LOG_DIR_ENV`] is unset.
pub const DEFAULT_LOG_DIR: &str = "/var/log/failover-installer";

/// Strip ANSI escape sequences from a string.
///
/// Handles SGR sequences (ending in `m`) and other CSI sequences (ending
/// in any letter in the `@`..`~` range), so cursor movement, erase, etc.
/// are also stripped without consuming unrelated text.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if let Some(next) = chars.next()
                && next == '['
            {
                for inner in chars.by_ref() {
                    if ('@'..='~').contains(&inner) {
                        break;
                    }
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// The configured log directory (not created).
#[must_use]
pub fn log_dir() -> PathBuf {
    std::env::var_os(LOG_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_LOG_DIR), PathBuf::from)
}

/// Return `<dir>/<command>.log`, creating `dir` if needed.
pub(super) fn log_file_path(dir: &Path, command: &str) -> Option<PathBuf> {
    fs::create_dir_all(dir).ok()?;
    Some(dir.join(format!("{command}.log")))
}

/// Format the current UTC time as `YYYY-MM-DD HH:MM:SS`.
pub(super) fn format_utc_datetime() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format the current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub(super) fn format_utc_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
