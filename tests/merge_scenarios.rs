#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for the merge engine.
//!
//! These tests drive [`merge_config`] and [`merge_files`] through the public
//! API with realistic template/live pairs and check the properties every
//! upgrade relies on: user values survive, placeholders never override
//! defaults, and re-merging changes nothing.

mod common;

use common::{TEMPLATE, USER_CONFIG, value_of};
use failover_installer::config::merge::{EXTRAS_BEGIN, EXTRAS_END};
use failover_installer::config::{extract, is_placeholder, merge_config, merge_files};

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// A user value replaces the default; a placeholder in the live config does
/// not.
#[test]
fn user_value_survives_and_placeholder_stays_default() {
    let template = "MEMBER=\"wan1\"\nTOKEN=\"<placeholder>\"\n";
    let live = "MEMBER=\"wan2\"\nTOKEN=\"<placeholder>\"\n";

    let result = merge_config(template, live);

    insta::assert_snapshot!(result.merged, @r#"
    MEMBER="wan2"
    TOKEN="<placeholder>"
    "#);
    assert!(is_placeholder(&value_of(&result.merged, "TOKEN").unwrap()));
    assert_eq!(result.preserved_count, 1);
    assert_eq!(result.kept_default_count, 1);
}

/// An upgrade that adds a variable picks up its default and keeps everything
/// the user set, including variables the template never declared.
#[test]
fn upgrade_adds_new_default_and_keeps_custom_settings() {
    let upgraded = format!("{TEMPLATE}export CHECK_INTERVAL=\"30\"\n");

    let result = merge_config(&upgraded, USER_CONFIG);

    assert_eq!(value_of(&result.merged, "MWAN_MEMBER").as_deref(), Some("starlink_m1"));
    assert_eq!(value_of(&result.merged, "PUSHOVER_TOKEN").as_deref(), Some("abc123"));
    assert_eq!(value_of(&result.merged, "CHECK_INTERVAL").as_deref(), Some("30"));
    assert_eq!(value_of(&result.merged, "CUSTOM_HOOK").as_deref(), Some("/root/hook.sh"));
    assert_eq!(result.new_default_count, 1);
    assert_eq!(result.extra_count, 1);

    let begin = result.merged.find(EXTRAS_BEGIN).unwrap();
    let end = result.merged.find(EXTRAS_END).unwrap();
    assert!(result.merged[begin..end].contains("CUSTOM_HOOK"));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Template variables appear in template order, before any preserved extras.
#[test]
fn template_order_is_kept() {
    let live = "\
export CUSTOM_HOOK=\"/root/hook.sh\"
export PUSHOVER_TOKEN=\"abc123\"
export STARLINK_IP=\"10.0.0.2\"
";
    let result = merge_config(TEMPLATE, live);

    let names: Vec<String> = extract(&result.merged)
        .variables
        .into_iter()
        .map(|v| v.name)
        .collect();
    assert_eq!(
        names,
        [
            "STARLINK_IP",
            "MWAN_IFACE",
            "MWAN_MEMBER",
            "PUSHOVER_TOKEN",
            "CUSTOM_HOOK"
        ]
    );
}

/// Merging the output again yields the same text.
#[test]
fn merge_is_idempotent_with_extras() {
    let once = merge_config(TEMPLATE, USER_CONFIG);
    let twice = merge_config(TEMPLATE, &once.merged);
    assert_eq!(once.merged, twice.merged);
    assert_eq!(twice.extra_count, 1);
}

/// Every variable ends up defined exactly once.
#[test]
fn no_variable_is_duplicated() {
    let live = format!("{USER_CONFIG}export MWAN_IFACE=\"wan_b\"\nexport CUSTOM_HOOK=\"/x\"\n");
    let result = merge_config(TEMPLATE, &live);

    let names: Vec<String> = extract(&result.merged)
        .variables
        .into_iter()
        .map(|v| v.name)
        .collect();
    let mut unique = names.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(names.len(), unique.len(), "{names:?}");
    assert_eq!(value_of(&result.merged, "MWAN_IFACE").as_deref(), Some("wan_b"));
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// On a first install there is no live file and the template comes through
/// unchanged.
#[test]
fn first_install_merges_template_as_is() {
    let staging = common::Staging::installed("v2.4.1");
    let result = merge_files(
        &staging.settings.template_path(),
        &staging.settings.live_config_path(),
    )
    .unwrap();
    assert_eq!(result.merged, TEMPLATE);
    assert!(!staging.settings.live_config_path().exists());
}
