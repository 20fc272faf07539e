//! Installer settings loaded from TOML.
//!
//! Every field has a default, so a missing settings file (the common case on
//! a freshly flashed router) yields a working configuration.
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::ConfigError;

/// Settings file used when neither `--settings` nor `FAILOVER_SETTINGS` is given.
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/failover-installer.toml";

/// Environment variable overriding the settings file location.
pub const SETTINGS_ENV: &str = "FAILOVER_SETTINGS";

/// All installer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Filesystem layout.
    pub paths: PathSettings,
    /// Where releases are fetched from.
    pub release: ReleaseSettings,
    /// Thresholds for accepting a configuration.
    pub validation: ValidationSettings,
    /// Boot-time recovery timing.
    pub recovery: RecoverySettings,
    /// Backup retention.
    pub backup: BackupSettings,
    /// Managed crontab entries.
    pub schedule: Vec<ScheduleEntry>,
    /// Convenience symlinks into the application tree.
    pub links: Vec<LinkEntry>,
}

/// Filesystem layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    /// Reinstallable application tree.
    pub install_dir: PathBuf,
    /// Persisted store that survives a reflash.
    pub persist_dir: PathBuf,
    /// Crontab holding the managed entries.
    pub crontab: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from("/usr/local/failover-agent"),
            persist_dir: PathBuf::from("/etc/failover-agent"),
            crontab: PathBuf::from("/etc/crontabs/root"),
        }
    }
}

/// Release download locations.
///
/// `{version}` in a pinned URL is replaced with the recorded version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseSettings {
    /// Version recorded on install when the command line does not give one.
    pub version: Option<String>,
    /// Installer URLs for a specific version, primary first.
    pub pinned_urls: Vec<String>,
    /// Installer URLs for the newest release, primary first.
    pub latest_urls: Vec<String>,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            version: None,
            pinned_urls: vec![
                "https://github.com/failover-agent/failover-agent/releases/download/{version}/install.sh"
                    .to_string(),
                "https://raw.githubusercontent.com/failover-agent/failover-agent/{version}/install.sh"
                    .to_string(),
            ],
            latest_urls: vec![
                "https://github.com/failover-agent/failover-agent/releases/latest/download/install.sh"
                    .to_string(),
                "https://raw.githubusercontent.com/failover-agent/failover-agent/main/install.sh"
                    .to_string(),
            ],
        }
    }
}

impl ReleaseSettings {
    /// Pinned installer URLs with `{version}` expanded.
    #[must_use]
    pub fn pinned_for(&self, version: &str) -> Vec<String> {
        self.pinned_urls
            .iter()
            .map(|url| url.replace("{version}", version))
            .collect()
    }
}

/// Thresholds for accepting a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationSettings {
    /// Smaller files are treated as truncated.
    pub min_size: u64,
    /// Interpreter used for the `-n` syntax check.
    pub shell: String,
    /// Keys that must carry a non-empty value.
    pub required_keys: Vec<String>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_size: 64,
            shell: "sh".to_string(),
            required_keys: vec![
                "STARLINK_IP".to_string(),
                "MWAN_IFACE".to_string(),
                "MWAN_MEMBER".to_string(),
            ],
        }
    }
}

/// Boot-time recovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecoverySettings {
    /// Hosts pinged to decide whether the network is up.
    pub probe_hosts: Vec<String>,
    /// Seconds between reachability probes.
    pub poll_interval_secs: u64,
    /// Give up waiting (and proceed anyway) after this many seconds.
    pub wait_ceiling_secs: u64,
    /// Init script name of the monitoring agent.
    pub service: String,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            probe_hosts: vec!["8.8.8.8".to_string(), "1.1.1.1".to_string()],
            poll_interval_secs: 10,
            wait_ceiling_secs: 300,
            service: "failover-agent".to_string(),
        }
    }
}

/// Backup retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupSettings {
    /// Snapshots kept per kind.
    pub retain: usize,
    /// Snapshots older than this are pruned by the shutdown hook.
    pub max_age_days: u64,
    /// Store new snapshots gzip-compressed.
    pub compress: bool,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            retain: 10,
            max_age_days: 30,
            compress: true,
        }
    }
}

/// A periodic task the installer keeps in the crontab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleEntry {
    /// Label used in log output.
    pub name: String,
    /// Five-field cron timing.
    pub schedule: String,
    /// Command; `{install_dir}` and `{persist_dir}` are expanded.
    pub command: String,
}

/// A convenience symlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkEntry {
    /// Where the link is created.
    pub link: PathBuf,
    /// Link target, relative to the install directory unless absolute.
    pub target: PathBuf,
}

fn default_schedule() -> Vec<ScheduleEntry> {
    vec![
        ScheduleEntry {
            name: "monitor".to_string(),
            schedule: "* * * * *".to_string(),
            command: "{install_dir}/bin/failover-monitor".to_string(),
        },
        ScheduleEntry {
            name: "maintenance".to_string(),
            schedule: "0 3 * * *".to_string(),
            command: "{install_dir}/bin/failover-maintenance".to_string(),
        },
    ]
}

fn default_links() -> Vec<LinkEntry> {
    vec![
        LinkEntry {
            link: PathBuf::from("/usr/bin/failover-monitor"),
            target: PathBuf::from("bin/failover-monitor"),
        },
        LinkEntry {
            link: PathBuf::from("/root/failover-config.sh"),
            target: PathBuf::from("/etc/failover-agent/config.sh"),
        },
    ]
}

impl Settings {
    /// Settings with the built-in schedule and links.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            schedule: default_schedule(),
            links: default_links(),
            ..Self::default()
        }
    }

    /// Load settings from `path`. A missing file yields [`Settings::builtin`].
    ///
    /// An empty `schedule` or `links` list in the file falls back to the
    /// built-in entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::builtin());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Self =
            toml::from_str(&content).map_err(|e| ConfigError::InvalidSettings {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        if settings.schedule.is_empty() {
            settings.schedule = default_schedule();
        }
        if settings.links.is_empty() {
            settings.links = default_links();
        }
        Ok(settings)
    }

    /// Resolve the settings file: explicit flag, then environment, then default.
    #[must_use]
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit.map_or_else(
            || {
                std::env::var_os(SETTINGS_ENV)
                    .map_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH), PathBuf::from)
            },
            Path::to_path_buf,
        )
    }

    /// Re-root every absolute path under `root` (staging and tests).
    #[must_use]
    pub fn rerooted(mut self, root: &Path) -> Self {
        self.paths.install_dir = reroot(root, &self.paths.install_dir);
        self.paths.persist_dir = reroot(root, &self.paths.persist_dir);
        self.paths.crontab = reroot(root, &self.paths.crontab);
        for link in &mut self.links {
            link.link = reroot(root, &link.link);
            if link.target.is_absolute() {
                link.target = reroot(root, &link.target);
            }
        }
        self
    }

    /// Template shipped with the installed release.
    #[must_use]
    pub fn template_path(&self) -> PathBuf {
        self.paths
            .install_dir
            .join("config")
            .join("config.template.sh")
    }

    /// File recording the installed release version.
    #[must_use]
    pub fn version_file(&self) -> PathBuf {
        self.paths.install_dir.join("VERSION")
    }

    /// The live configuration.
    #[must_use]
    pub fn live_config_path(&self) -> PathBuf {
        self.paths.persist_dir.join("config.sh")
    }

    /// Copy of the template taken at shutdown.
    #[must_use]
    pub fn persisted_template_path(&self) -> PathBuf {
        self.paths.persist_dir.join("template.sh")
    }

    /// Backup ring and its index.
    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.paths.persist_dir.join("backups")
    }

    /// Raw copies of rejected configurations.
    #[must_use]
    pub fn quarantine_dir(&self) -> PathBuf {
        self.backups_dir().join("quarantine")
    }

    /// Generated version-pinned recovery script.
    #[must_use]
    pub fn recovery_script_path(&self) -> PathBuf {
        self.paths.persist_dir.join("recovery").join("recover.sh")
    }

    /// Expand `{install_dir}` and `{persist_dir}` in `text`.
    #[must_use]
    pub fn expand(&self, text: &str) -> String {
        text.replace(
            "{install_dir}",
            &self.paths.install_dir.display().to_string(),
        )
        .replace(
            "{persist_dir}",
            &self.paths.persist_dir.display().to_string(),
        )
    }

    /// Absolute target of a convenience link.
    #[must_use]
    pub fn link_target(&self, link: &LinkEntry) -> PathBuf {
        if link.target.is_absolute() {
            link.target.clone()
        } else {
            self.paths.install_dir.join(&link.target)
        }
    }
}

fn reroot(root: &Path, path: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    root.join(relative)
}
