// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Wires up an in-process execution core for one CLI invocation: a
//! `Registry` seeded with the builtin plugin, a `Scheduler` with every
//! plan under `plans_dir` registered, and the background consumer loops
//! running for the lifetime of the command. There is no persistent
//! daemon process behind this binary (§6 Non-goals) — each invocation
//! is a fresh core that tears down when the command returns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aura_core::{Clock, Event, EventBus, SystemClock};
use aura_daemon::{Orchestrator, Scheduler, SchedulerConfig};
use aura_engine::{Engine, InlineActionRunner};
use aura_plugins::{CorePlugin, LoadedPlugin, Registry};
use aura_runbook::TaskLoader;
use aura_wire::TaskFinalResult;

use crate::exit_error::ExitError;

pub struct Core {
    pub scheduler: Arc<Scheduler<SystemClock>>,
    pub event_bus: Arc<EventBus>,
    pub registry: Arc<Registry>,
}

/// Builds the registry shared by every plan: just the always-on core
/// plugin for this minimal binary (§4.B's dynamic resolution of a
/// package's compiled plugin implementation is a link-time concern for
/// whatever binary embeds this crate's components, not something this
/// CLI can do for an arbitrary `--packages-dir` at runtime).
pub fn builtin_registry() -> Result<Arc<Registry>, ExitError> {
    let registry = Arc::new(Registry::new());
    let core = CorePlugin::new();
    core.register(&registry)?;
    registry.record_plugin(core.definition().clone())?;
    Ok(registry)
}

/// Discovers every subdirectory of `plans_dir` containing a `tasks/`
/// directory and registers an `Orchestrator` for each on the returned
/// `Scheduler`.
pub fn bootstrap(plans_dir: &Path) -> Result<Core, ExitError> {
    let registry = builtin_registry()?;
    let event_bus = Arc::new(EventBus::new());
    let loader = Arc::new(TaskLoader::new(plans_dir));
    let scheduler =
        Arc::new(Scheduler::new(SchedulerConfig::default(), registry.clone(), event_bus.clone(), SystemClock));

    for plan_root in plan_roots(plans_dir) {
        let Some(plan_name) = plan_root.file_name().and_then(|n| n.to_str()) else { continue };
        let engine = Arc::new(Engine::new(registry.clone(), Arc::new(InlineActionRunner), SystemClock));
        let orchestrator = Arc::new(Orchestrator::new(
            plan_name,
            plan_root.clone(),
            loader.clone(),
            registry.clone(),
            engine,
            event_bus.clone(),
            SystemClock,
        ));
        scheduler.register_plan(plan_name, orchestrator);
    }

    Ok(Core { scheduler, event_bus, registry })
}

fn plan_roots(plans_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(plans_dir) else { return Vec::new() };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join("tasks").is_dir())
        .collect()
}

pub fn parse_input(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) =
        raw.split_once('=').ok_or_else(|| format!("invalid --input '{raw}': expected key=value"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn inputs_map(raw: Vec<(String, serde_json::Value)>) -> HashMap<String, serde_json::Value> {
    raw.into_iter().collect()
}

/// Subscribes for `task.finished` addressed to `run_id` and returns the
/// carried [`TaskFinalResult`] once published, or `None` on timeout.
/// Used by `aura task run --wait` to block the external caller's thread
/// on the scheduler's own future the way §5's "submit + block on
/// future" surface describes.
pub async fn await_finish(event_bus: &Arc<EventBus>, run_id: &str, timeout: Duration) -> Option<TaskFinalResult> {
    let (tx, rx) = tokio::sync::oneshot::channel::<TaskFinalResult>();
    let tx = Arc::new(parking_lot::Mutex::new(Some(tx)));
    let target = run_id.to_string();
    let subscribed = event_bus.subscribe(
        "*",
        "task.finished",
        "aura-cli",
        false,
        Arc::new(move |event: Event| {
            let target = target.clone();
            let tx = tx.clone();
            Box::pin(async move {
                let matches_run = event.payload.get("run_id").and_then(|v| v.as_str()) == Some(target.as_str());
                if !matches_run {
                    return;
                }
                if let Ok(tfr) = serde_json::from_value::<TaskFinalResult>(event.payload) {
                    if let Some(sender) = tx.lock().take() {
                        let _ = sender.send(tfr);
                    }
                }
            })
        }),
    );
    if subscribed.is_err() {
        return None;
    }
    tokio::time::timeout(timeout, rx).await.ok().and_then(|r| r.ok())
}

pub fn epoch_ms() -> u64 {
    SystemClock.epoch_ms()
}
