// Shared helpers for integration tests.
//
// Builds a staging tree under a temporary directory: settings re-rooted into
// it, an optional installed template, and a task context over the real shell.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use failover_installer::config::Settings;
use failover_installer::exec::SystemExecutor;
use failover_installer::logging::{Log, Logger};
use failover_installer::resources::helpers::fs::write_atomic;
use failover_installer::tasks::Context;

/// Template shipped with a release.
pub const TEMPLATE: &str = "\
# failover agent configuration
export STARLINK_IP=\"192.168.100.1\"
export MWAN_IFACE=\"wan\"
export MWAN_MEMBER=\"member1\"

# notifications
export PUSHOVER_TOKEN=\"YOUR_PUSHOVER_TOKEN\"
";

/// A configuration the user has edited.
pub const USER_CONFIG: &str = "\
export STARLINK_IP=\"10.0.0.2\"
export MWAN_IFACE=\"wan_sl\"
export MWAN_MEMBER=\"starlink_m1\"
export PUSHOVER_TOKEN=\"abc123\"
export CUSTOM_HOOK=\"/root/hook.sh\"
";

/// An isolated staging tree backed by a [`tempfile::TempDir`].
pub struct Staging {
    /// Root of the staging tree.
    pub root: tempfile::TempDir,
    /// Settings re-rooted under `root`.
    pub settings: Settings,
    /// Logger writing into `root/logs`.
    pub log: Arc<Logger>,
}

impl Staging {
    /// Empty staging tree: nothing installed, nothing persisted.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let mut settings = Settings::builtin().rerooted(root.path());
        settings.recovery.poll_interval_secs = 1;
        settings.recovery.wait_ceiling_secs = 10;
        let log = Arc::new(Logger::in_dir(&root.path().join("logs"), "test"));
        Self {
            root,
            settings,
            log,
        }
    }

    /// Staging tree with [`TEMPLATE`] installed as `version`.
    pub fn installed(version: &str) -> Self {
        let staging = Self::new();
        staging.install_template(TEMPLATE, version);
        staging
    }

    /// Write `template` and a `VERSION` file into the application tree.
    pub fn install_template(&self, template: &str, version: &str) {
        self.write(&self.settings.template_path(), template);
        self.write(&self.settings.version_file(), &format!("{version}\n"));
    }

    /// Write the live configuration.
    pub fn write_live(&self, text: &str) {
        self.write(&self.settings.live_config_path(), text);
    }

    /// Read the live configuration.
    pub fn live(&self) -> String {
        std::fs::read_to_string(self.settings.live_config_path()).expect("read live config")
    }

    /// Write `text` to `path`, creating parents.
    pub fn write(&self, path: &Path, text: &str) {
        write_atomic(path, text.as_bytes()).expect("write file");
    }

    /// Task context over the real shell.
    pub fn context(&self) -> Context {
        Context::new(
            self.settings.clone(),
            Arc::clone(&self.log) as Arc<dyn Log>,
            false,
            Arc::new(SystemExecutor),
        )
    }
}

/// Value of `name` in shell config `text`, unquoted.
pub fn value_of(text: &str, name: &str) -> Option<String> {
    failover_installer::config::ConfigDocument::parse(text)
        .value(name)
        .map(str::to_string)
}
