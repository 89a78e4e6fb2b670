// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

use super::*;
use aura_runbook::render_str;

fn ctx_with_name(name: &str) -> Arc<ExecutionContext> {
    let mut inputs = HashMap::new();
    inputs.insert("name".to_string(), serde_json::json!(name));
    ExecutionContext::new(inputs)
}

#[test]
fn resolves_top_level_input() {
    let ctx = ctx_with_name("World");
    assert_eq!(render_str("Hello, {{ inputs.name }}!", ctx.as_ref()).unwrap(), "Hello, World!");
}

#[test]
fn resolves_nested_input_field() {
    let mut inputs = HashMap::new();
    inputs.insert("config".to_string(), serde_json::json!({"url": "https://x"}));
    let ctx = ExecutionContext::new(inputs);
    assert_eq!(render_str("{{ inputs.config.url }}", ctx.as_ref()).unwrap(), "https://x");
}

#[test]
fn unknown_input_is_an_error() {
    let ctx = ExecutionContext::new(HashMap::new());
    assert!(render_str("{{ inputs.missing }}", ctx.as_ref()).is_err());
}

#[test]
fn step_output_is_visible_after_recording() {
    let ctx = ExecutionContext::new(HashMap::new());
    ctx.record_step_output("fetch", serde_json::json!({"status": 200}));
    assert_eq!(render_str("{{ steps.fetch.output.status }}", ctx.as_ref()).unwrap(), "200");
}

#[test]
fn ctx_cell_round_trips() {
    let ctx = ExecutionContext::new(HashMap::new());
    ctx.set_ctx("retries", serde_json::json!(3));
    assert_eq!(render_str("{{ ctx.retries }}", ctx.as_ref()).unwrap(), "3");
}

#[test]
fn child_context_inherits_parent_inputs_and_steps() {
    let ctx = ctx_with_name("Ada");
    ctx.record_step_output("a", serde_json::json!("ok"));
    let child = ctx.child_for_loop(serde_json::json!("apple"), 0);
    assert_eq!(render_str("{{ inputs.name }}", child.as_ref()).unwrap(), "Ada");
    assert_eq!(render_str("{{ steps.a.output }}", child.as_ref()).unwrap(), "ok");
}

#[test]
fn child_context_exposes_item_and_loop_index() {
    let ctx = ExecutionContext::new(HashMap::new());
    let child = ctx.child_for_loop(serde_json::json!("apple"), 2);
    assert_eq!(render_str("{{ loop.index }}: {{ item }}", child.as_ref()).unwrap(), "2: apple");
}

#[test]
fn child_context_ctx_shadows_without_mutating_parent() {
    let ctx = ExecutionContext::new(HashMap::new());
    ctx.set_ctx("mode", serde_json::json!("parent"));
    let child = ctx.child_for_loop(serde_json::json!(1), 0);
    child.set_ctx("mode", serde_json::json!("child"));

    assert_eq!(render_str("{{ ctx.mode }}", child.as_ref()).unwrap(), "child");
    assert_eq!(render_str("{{ ctx.mode }}", ctx.as_ref()).unwrap(), "parent");
}

#[test]
fn parent_has_no_access_to_item() {
    let ctx = ExecutionContext::new(HashMap::new());
    let _child = ctx.child_for_loop(serde_json::json!("x"), 0);
    assert!(render_str("{{ item }}", ctx.as_ref()).is_err());
}
