//! Command-line interface definitions.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::backup::BackupKind;

/// Top-level CLI entry point for the failover agent installer.
#[derive(Parser, Debug)]
#[command(
    name = "failover-installer",
    about = "Install the failover agent and manage its configuration lifecycle",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Settings file (default: $FAILOVER_SETTINGS or /etc/failover-installer.toml)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    /// Re-root every managed path under this directory (staging)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install or upgrade the agent and merge its configuration
    Install(InstallOpts),
    /// Merge the installed template with the live configuration
    Merge(MergeOpts),
    /// Validate a configuration file
    Validate(ValidateOpts),
    /// Manage configuration backups
    Backup(BackupOpts),
    /// Boot hook: recover the installation after a reflash
    Start,
    /// Shutdown hook: persist configuration and template
    Stop,
    /// Print version information
    Version,
}

impl Command {
    /// Subcommand name, used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Install(_) => "install",
            Self::Merge(_) => "merge",
            Self::Validate(_) => "validate",
            Self::Backup(_) => "backup",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Version => "version",
        }
    }
}

/// Options for the `install` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct InstallOpts {
    /// Release to install (default: the settings' version, else the newest)
    #[arg(short, long)]
    pub release: Option<String>,

    /// Skip specific tasks
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Run only specific tasks
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
}

/// Options for the `merge` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct MergeOpts {
    /// Print the merged text instead of activating it
    #[arg(long)]
    pub print: bool,

    /// Template to merge from (with --print)
    #[arg(long, requires = "print")]
    pub template: Option<PathBuf>,

    /// Live configuration to merge (with --print)
    #[arg(long, requires = "print")]
    pub live: Option<PathBuf>,
}

/// Options for the `validate` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct ValidateOpts {
    /// File to validate (default: the live configuration)
    pub path: Option<PathBuf>,

    /// Stop at the first failing check
    #[arg(long)]
    pub fail_fast: bool,
}

/// Options for the `backup` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct BackupOpts {
    /// What to do with the backup ring.
    #[command(subcommand)]
    pub action: BackupAction,
}

/// Backup maintenance actions.
#[derive(Subcommand, Debug, Clone)]
pub enum BackupAction {
    /// Take a snapshot now
    Snapshot {
        /// What to snapshot (config, template, schedule)
        #[arg(short, long, default_value = "config")]
        kind: BackupKind,
        /// File to capture (default: the managed file of that kind)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Note recorded with the snapshot
        #[arg(short = 'm', long, default_value = "manual snapshot")]
        description: String,
    },
    /// List recorded snapshots, oldest first
    List {
        /// Only this kind
        #[arg(short, long)]
        kind: Option<BackupKind>,
    },
    /// Restore a snapshot by key
    Restore {
        /// Backup key as shown by `backup list`
        key: String,
        /// Restore here instead of the original location
        #[arg(long)]
        to: Option<PathBuf>,
    },
    /// Prune by count and age
    Prune {
        /// Snapshots kept per kind (default from settings)
        #[arg(long)]
        retain: Option<usize>,
        /// Maximum age in days (default from settings)
        #[arg(long)]
        max_age_days: Option<u64>,
    },
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_install_with_release() {
        let cli = Cli::parse_from(["failover-installer", "install", "--release", "v2.4.1"]);
        assert!(matches!(
            &cli.command,
            Command::Install(opts) if opts.release.as_deref() == Some("v2.4.1")
        ));
    }

    #[test]
    fn parse_install_dry_run_short() {
        let cli = Cli::parse_from(["failover-installer", "-d", "install"]);
        assert!(cli.global.dry_run);
    }

    #[test]
    fn parse_install_skip_tasks() {
        let cli = Cli::parse_from(["failover-installer", "install", "--skip", "scheduler,links"]);
        assert!(
            matches!(&cli.command, Command::Install(_)),
            "Expected Install command"
        );
        if let Command::Install(opts) = cli.command {
            assert_eq!(opts.skip, vec!["scheduler", "links"]);
        }
    }

    #[test]
    fn parse_settings_and_root() {
        let cli = Cli::parse_from([
            "failover-installer",
            "--settings",
            "/tmp/s.toml",
            "--root",
            "/tmp/stage",
            "stop",
        ]);
        assert_eq!(cli.global.settings, Some(PathBuf::from("/tmp/s.toml")));
        assert_eq!(cli.global.root, Some(PathBuf::from("/tmp/stage")));
        assert!(matches!(cli.command, Command::Stop));
    }

    #[test]
    fn parse_merge_print_with_paths() {
        let cli = Cli::parse_from([
            "failover-installer",
            "merge",
            "--print",
            "--template",
            "t.sh",
            "--live",
            "l.sh",
        ]);
        assert!(matches!(&cli.command, Command::Merge(o) if o.print && o.live.is_some()));
    }

    #[test]
    fn merge_paths_require_print() {
        let result = Cli::try_parse_from(["failover-installer", "merge", "--live", "l.sh"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_validate_fail_fast() {
        let cli = Cli::parse_from(["failover-installer", "validate", "x.sh", "--fail-fast"]);
        assert!(matches!(
            &cli.command,
            Command::Validate(o) if o.fail_fast && o.path == Some(PathBuf::from("x.sh"))
        ));
    }

    #[test]
    fn parse_backup_snapshot_kind() {
        let cli = Cli::parse_from(["failover-installer", "backup", "snapshot", "-k", "schedule"]);
        assert!(matches!(
            cli.command,
            Command::Backup(BackupOpts {
                action: BackupAction::Snapshot {
                    kind: BackupKind::Schedule,
                    ..
                }
            })
        ));
    }

    #[test]
    fn parse_backup_snapshot_description() {
        let cli = Cli::parse_from([
            "failover-installer",
            "backup",
            "snapshot",
            "-m",
            "before firmware update",
        ]);
        assert!(matches!(
            &cli.command,
            Command::Backup(BackupOpts {
                action: BackupAction::Snapshot { description, .. }
            }) if description == "before firmware update"
        ));
    }

    #[test]
    fn backup_snapshot_defaults_to_config() {
        let cli = Cli::parse_from(["failover-installer", "backup", "snapshot"]);
        assert!(matches!(
            cli.command,
            Command::Backup(BackupOpts {
                action: BackupAction::Snapshot {
                    kind: BackupKind::Config,
                    path: None,
                    ..
                }
            })
        ));
    }

    #[test]
    fn unknown_backup_kind_is_rejected() {
        let result =
            Cli::try_parse_from(["failover-installer", "backup", "list", "--kind", "logs"]);
        assert!(result.is_err());
    }

    #[test]
    fn command_names_match_subcommands() {
        let cli = Cli::parse_from(["failover-installer", "start"]);
        assert_eq!(cli.command.name(), "start");
        let cli = Cli::parse_from(["failover-installer", "version"]);
        assert_eq!(cli.command.name(), "version");
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::parse_from(["failover-installer", "-v", "install"]);
        assert!(cli.verbose);
    }
}
