//! Generated version-pinned recovery script.
//!
//! The script is self-contained so an operator can run it by hand after a
//! reflash: it tries the primary URL, then the fallback, and exits zero only
//! if one of them installed the pinned version.
use anyhow::Result;
use std::path::PathBuf;

use super::helpers::fs::{set_mode, write_atomic};
use super::{Applicable, Resource, ResourceChange, ResourceState};

/// Recovery script pinned to one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryScript {
    /// Where the script is written.
    pub path: PathBuf,
    /// Version to reinstall.
    pub pinned_version: String,
    /// Installer URL tried first.
    pub primary_url: String,
    /// Installer URL tried when the primary fails.
    pub fallback_url: String,
    /// Application tree the installer writes into.
    pub install_dir: PathBuf,
}

/// Quote `value` for a POSIX shell.
fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

impl RecoveryScript {
    /// Script text.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            r#"#!/bin/sh
# Generated by failover-installer; regenerated on every install.
# Reinstalls the pinned release after a firmware reflash.
PINNED_VERSION={version}
PRIMARY_URL={primary}
FALLBACK_URL={fallback}
INSTALL_DIR={install_dir}
TMP="/tmp/failover-recover.$$"

fetch() {{
    if command -v curl >/dev/null 2>&1; then
        curl -fsSL --connect-timeout 10 --max-time 120 -o "$2" "$1" && return 0
    fi
    if command -v wget >/dev/null 2>&1; then
        wget -q -T 120 -O "$2" "$1" && return 0
    fi
    return 1
}}

try_install() {{
    rm -f "$TMP"
    fetch "$1" "$TMP" || return 1
    [ -s "$TMP" ] || return 1
    head -n 1 "$TMP" | grep -q '^#!' || return 1
    VERSION="$PINNED_VERSION" INSTALL_DIR="$INSTALL_DIR" sh "$TMP"
}}

for url in "$PRIMARY_URL" "$FALLBACK_URL"; do
    [ -n "$url" ] || continue
    if try_install "$url"; then
        rm -f "$TMP"
        echo "recovered $PINNED_VERSION from $url"
        exit 0
    fi
    echo "recovery from $url failed" >&2
done

rm -f "$TMP"
echo "recovery of $PINNED_VERSION failed; download $PRIMARY_URL and run it with VERSION=$PINNED_VERSION" >&2
exit 1
"#,
            version = sh_quote(&self.pinned_version),
            primary = sh_quote(&self.primary_url),
            fallback = sh_quote(&self.fallback_url),
            install_dir = sh_quote(&self.install_dir.display().to_string()),
        )
    }
}

impl Applicable for RecoveryScript {
    fn description(&self) -> String {
        format!(
            "recovery script {} (pinned {})",
            self.path.display(),
            self.pinned_version
        )
    }

    fn apply(&self) -> Result<ResourceChange> {
        write_atomic(&self.path, self.render().as_bytes())?;
        set_mode(&self.path, 0o755)?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for RecoveryScript {
    fn current_state(&self) -> Result<ResourceState> {
        match std::fs::read_to_string(&self.path) {
            Ok(existing) if existing == self.render() => Ok(ResourceState::Correct),
            Ok(_) => Ok(ResourceState::Incorrect {
                current: "script pins another release".to_string(),
            }),
            Err(_) => Ok(ResourceState::Missing),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::{Executor, SystemExecutor};

    fn script(dir: &std::path::Path) -> RecoveryScript {
        RecoveryScript {
            path: dir.join("recovery").join("recover.sh"),
            pinned_version: "v2.4.1".to_string(),
            primary_url: "https://dl.lan/v2.4.1/install.sh".to_string(),
            fallback_url: "https://mirror.lan/v2.4.1/install.sh".to_string(),
            install_dir: PathBuf::from("/usr/local/failover-agent"),
        }
    }

    #[test]
    fn embeds_version_and_both_urls() {
        let dir = tempfile::tempdir().unwrap();
        let text = script(dir.path()).render();
        assert!(text.starts_with("#!/bin/sh\n"));
        assert!(text.contains("PINNED_VERSION='v2.4.1'"));
        assert!(text.contains("PRIMARY_URL='https://dl.lan/v2.4.1/install.sh'"));
        assert!(text.contains("FALLBACK_URL='https://mirror.lan/v2.4.1/install.sh'"));
        let primary = text.find("\"$PRIMARY_URL\" \"$FALLBACK_URL\"");
        assert!(primary.is_some(), "primary is tried before fallback");
    }

    #[test]
    fn quoting_survives_single_quotes() {
        assert_eq!(sh_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn rendered_script_passes_syntax_check() {
        let dir = tempfile::tempdir().unwrap();
        let s = script(dir.path());
        s.apply().unwrap();
        let path = s.path.to_string_lossy().to_string();
        let result = SystemExecutor.run_unchecked("sh", &["-n", &path]).unwrap();
        assert!(result.success, "{}", result.stderr);
    }

    #[test]
    fn state_follows_pinned_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = script(dir.path());
        assert_eq!(s.current_state().unwrap(), ResourceState::Missing);
        s.apply().unwrap();
        assert_eq!(s.current_state().unwrap(), ResourceState::Correct);
        s.pinned_version = "v2.5.0".to_string();
        assert!(s.needs_change().unwrap());
    }
}
