#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for the versioned backup ring.
//!
//! These tests go through [`BackupManager`] on a real directory store and
//! through the `backup` command's dispatcher, covering retention, integrity
//! checks and the refusal to capture an invalid configuration.

mod common;

use common::{Staging, TEMPLATE, USER_CONFIG};
use failover_installer::backup::BackupKind;
use failover_installer::cli::BackupAction;
use failover_installer::commands::backup::dispatch;
use failover_installer::error::BackupError;

#[test]
fn retention_keeps_newest_per_kind() {
    let staging = Staging::installed("v2.4.1");
    staging.write_live(USER_CONFIG);
    let ctx = staging.context();

    for _ in 0..4 {
        ctx.backups
            .snapshot(BackupKind::Template, &staging.settings.template_path(), "")
            .unwrap();
    }
    let config = ctx
        .backups
        .snapshot(BackupKind::Config, &staging.settings.live_config_path(), "")
        .unwrap();

    let removed = ctx.backups.prune(BackupKind::Template, 2).unwrap();

    assert_eq!(removed.len(), 2);
    let templates = ctx.backups.list(Some(BackupKind::Template)).unwrap();
    let seqs: Vec<u64> = templates.iter().map(|h| h.seq).collect();
    assert_eq!(seqs, [2, 3]);
    assert_eq!(ctx.backups.latest(BackupKind::Config).unwrap(), Some(config));
}

#[test]
fn tampered_snapshot_is_not_restored() {
    let staging = Staging::installed("v2.4.1");
    staging.write_live(USER_CONFIG);
    let ctx = staging.context();
    let handle = ctx
        .backups
        .snapshot(BackupKind::Config, &staging.settings.live_config_path(), "")
        .unwrap();

    let stored = staging.settings.paths.persist_dir.join(&handle.key);
    std::fs::write(&stored, "export STARLINK_IP=\"6.6.6.6\"\n").unwrap();
    staging.write_live(TEMPLATE);

    let err = ctx.backups.restore(&handle).unwrap_err();

    assert!(matches!(err, BackupError::IntegrityMismatch { .. }));
    assert_eq!(staging.live(), TEMPLATE);
}

#[test]
fn invalid_config_is_refused() {
    let staging = Staging::installed("v2.4.1");
    staging.write_live("export STARLINK_IP=\"unterminated\n");
    let ctx = staging.context();

    let err = ctx
        .backups
        .snapshot(BackupKind::Config, &staging.settings.live_config_path(), "")
        .unwrap_err();

    assert!(matches!(err, BackupError::RefusedInvalid { .. }));
    assert!(ctx.backups.list(None).unwrap().is_empty());
}

#[test]
fn restore_command_round_trips_through_the_ring() {
    let staging = Staging::installed("v2.4.1");
    staging.write_live(USER_CONFIG);
    let ctx = staging.context();

    dispatch(
        &ctx,
        &BackupAction::Snapshot {
            kind: BackupKind::Config,
            path: None,
            description: "before firmware update".to_string(),
        },
    )
    .unwrap();
    let saved = ctx.backups.latest(BackupKind::Config).unwrap().unwrap();
    assert_eq!(saved.description, "before firmware update");
    assert!(saved.compressed);

    staging.write_live(&USER_CONFIG.replace("starlink_m1", "starlink_m2"));
    dispatch(
        &ctx,
        &BackupAction::Restore {
            key: saved.key.clone(),
            to: None,
        },
    )
    .unwrap();

    assert_eq!(staging.live(), USER_CONFIG);
    let configs = ctx.backups.list(Some(BackupKind::Config)).unwrap();
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[0].key, saved.key);
}

#[test]
fn restore_to_elsewhere_leaves_source_alone() {
    let staging = Staging::installed("v2.4.1");
    let ctx = staging.context();
    let handle = ctx
        .backups
        .snapshot(BackupKind::Template, &staging.settings.template_path(), "")
        .unwrap();
    let elsewhere = staging.root.path().join("restored.sh");

    dispatch(
        &ctx,
        &BackupAction::Restore {
            key: handle.key,
            to: Some(elsewhere.clone()),
        },
    )
    .unwrap();

    assert_eq!(std::fs::read_to_string(elsewhere).unwrap(), TEMPLATE);
}
