// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

use super::*;

#[test]
fn run_id_format() {
    let run_id = RunId::new("hello", "say_hello", 1_700_000_000_000);
    assert_eq!(run_id.to_string(), "hello/say_hello:1700000000000");
}

#[test]
fn tasklet_starts_queued_with_fresh_cancellation_token() {
    let t = Tasklet::new("hello", "say_hello", HashMap::new(), 0, 0, BTreeSet::new(), 1, 1);
    assert_eq!(t.status, TaskStatus::Queued);
    assert!(!t.cancellation.is_cancelled());
}

#[test]
fn terminal_statuses() {
    assert!(TaskStatus::Succeeded.is_terminal());
    assert!(TaskStatus::Failed.is_terminal());
    assert!(TaskStatus::Cancelled.is_terminal());
    assert!(TaskStatus::Timeout.is_terminal());
    assert!(TaskStatus::PlanningFailed.is_terminal());
    assert!(!TaskStatus::Queued.is_terminal());
    assert!(!TaskStatus::Running.is_terminal());
}

#[test]
fn plugin_canonical_id() {
    let p = PluginDefinition {
        author: "acme".into(),
        name: "widgets".into(),
        version: "1.0.0".into(),
        plugin_type: PluginType::Library,
        path: std::path::PathBuf::from("/plugins/acme-widgets"),
        dependencies: BTreeSet::new(),
        external_dependencies: BTreeSet::new(),
        extends: Vec::new(),
        overrides: Vec::new(),
    };
    assert_eq!(p.canonical_id(), "acme/widgets");
}
