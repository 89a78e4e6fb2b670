// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Scheduler and Execution Manager tuning knobs (§4.H, §4.I), loaded
//! from TOML. Every field has a sane default so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn logical_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn default_global_concurrency() -> usize {
    logical_cpus() * 2
}

fn default_cpu_pool_size() -> usize {
    logical_cpus()
}

fn default_io_pool_size() -> usize {
    logical_cpus() * 4
}

fn default_resource_tag_cap() -> usize {
    1
}

fn default_pool_shutdown_grace_secs() -> u64 {
    5
}

fn default_event_queue_consumers() -> usize {
    4
}

fn default_verify_retries() -> u32 {
    2
}

fn default_max_replans() -> u32 {
    3
}

fn default_interrupt_poll_interval_ms() -> u64 {
    500
}

fn default_hot_reload_debounce_ms() -> u64 {
    300
}

fn default_task_timeout_secs() -> u64 {
    300
}

/// Deserialized from a `scheduler.toml` (or embedded default) at
/// daemon startup. See `Orchestrator`/`ExecutionManager`/`Scheduler`
/// for where each field is consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on concurrently-running tasklets, acquired before
    /// any per-resource-tag semaphore (§5 canonical acquisition order).
    pub global_concurrency: usize,
    /// Default capacity for a resource-tag semaphore created on first
    /// use; a tag not listed in `resource_tag_caps` gets this.
    pub default_resource_tag_cap: usize,
    pub resource_tag_caps: std::collections::HashMap<String, usize>,
    /// Bounded `std::thread` worker count for CPU-bound actions
    /// (Open Question: separate worker set, same address space).
    pub cpu_pool_size: usize,
    /// Bound on concurrently in-flight IO-bound action invocations.
    pub io_pool_size: usize,
    pub pool_shutdown_grace_secs: u64,
    /// Consumer count for the event queue (main and interrupt queues
    /// each have exactly one, per §4.I).
    pub event_queue_consumers: usize,
    pub verify_retries: u32,
    pub max_replans: u32,
    pub interrupt_poll_interval_ms: u64,
    pub hot_reload_debounce_ms: u64,
    /// Used by `run_ad_hoc_task`/`run_manual_task` when the task
    /// definition doesn't otherwise bound its own runtime (0 = unbounded
    /// per §3's Tasklet timeout field; this default is the scheduler's
    /// fallback when a caller doesn't specify one).
    pub default_task_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            global_concurrency: default_global_concurrency(),
            default_resource_tag_cap: default_resource_tag_cap(),
            resource_tag_caps: std::collections::HashMap::new(),
            cpu_pool_size: default_cpu_pool_size(),
            io_pool_size: default_io_pool_size(),
            pool_shutdown_grace_secs: default_pool_shutdown_grace_secs(),
            event_queue_consumers: default_event_queue_consumers(),
            verify_retries: default_verify_retries(),
            max_replans: default_max_replans(),
            interrupt_poll_interval_ms: default_interrupt_poll_interval_ms(),
            hot_reload_debounce_ms: default_hot_reload_debounce_ms(),
            default_task_timeout_secs: default_task_timeout_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn pool_shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.pool_shutdown_grace_secs)
    }

    pub fn resource_tag_cap(&self, tag: &str) -> usize {
        self.resource_tag_caps.get(tag).copied().unwrap_or(self.default_resource_tag_cap)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
