// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Core data model: Tasklet, PluginDefinition, and the registry
//! descriptor shapes populated during plugin load.

use std::collections::{BTreeSet, HashMap};
use tokio_util::sync::CancellationToken;

crate::define_id! {
    /// Globally unique identifier minted for one in-flight Tasklet.
    pub struct TaskletId("tsk-");
}

/// `<plan>/<task>:<ms_epoch>` — the run identifier surfaced to callers
/// as `cid` on the external API (§6).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(plan: &str, task: &str, epoch_ms: u64) -> Self {
        Self(format!("{plan}/{task}:{epoch_ms}"))
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

crate::simple_display! {
    TaskStatus {
        Queued => "QUEUED",
        Admitted => "ADMITTED",
        Planning => "PLANNING",
        Running => "RUNNING",
        Succeeded => "SUCCEEDED",
        Failed => "FAILED",
        Cancelled => "CANCELLED",
        Timeout => "TIMEOUT",
        PlanningFailed => "PLANNING_FAILED",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TaskStatus {
    Queued,
    Admitted,
    Planning,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Timeout,
    PlanningFailed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded
                | TaskStatus::Failed
                | TaskStatus::Cancelled
                | TaskStatus::Timeout
                | TaskStatus::PlanningFailed
        )
    }
}

/// One in-flight unit of work. Mutated only under the running-tasks
/// table's async lock; destroyed once its terminal event is emitted.
#[derive(Debug, Clone)]
pub struct Tasklet {
    pub id: TaskletId,
    pub run_id: RunId,
    pub plan: String,
    pub task: String,
    pub inputs: HashMap<String, serde_json::Value>,
    pub priority: i32,
    pub timeout_secs: u64,
    pub resource_tags: BTreeSet<String>,
    pub status: TaskStatus,
    pub enqueue_time_ms: u64,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: Option<u64>,
    pub cancellation: CancellationToken,
}

impl Tasklet {
    pub fn new(
        plan: impl Into<String>,
        task: impl Into<String>,
        inputs: HashMap<String, serde_json::Value>,
        priority: i32,
        timeout_secs: u64,
        resource_tags: BTreeSet<String>,
        enqueue_time_ms: u64,
        epoch_ms_for_run_id: u64,
    ) -> Self {
        let plan = plan.into();
        let task = task.into();
        let run_id = RunId::new(&plan, &task, epoch_ms_for_run_id);
        Self {
            id: TaskletId::new(),
            run_id,
            plan,
            task,
            inputs,
            priority,
            timeout_secs,
            resource_tags,
            status: TaskStatus::Queued,
            enqueue_time_ms,
            start_time_ms: None,
            end_time_ms: None,
            cancellation: CancellationToken::new(),
        }
    }
}

/// `plan` | `library`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Plan,
    Library,
}

/// A service this plugin attaches an extension callable to, or replaces
/// outright. See §4.B extension/override semantics.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServiceExtension {
    pub target_service_alias: String,
    pub provider_plugin_id: String,
}

/// Immutable once loaded. One per discovered manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PluginDefinition {
    pub author: String,
    pub name: String,
    pub version: String,
    pub plugin_type: PluginType,
    #[serde(skip)]
    pub path: std::path::PathBuf,
    pub dependencies: BTreeSet<String>,
    pub external_dependencies: BTreeSet<String>,
    pub extends: Vec<ServiceExtension>,
    pub overrides: Vec<String>,
}

impl PluginDefinition {
    /// `author/name`.
    pub fn canonical_id(&self) -> String {
        format!("{}/{}", self.author, self.name)
    }
}

/// Descriptor for one exported action, parsed from the API descriptor
/// (§6). `entry_point` names a registration key resolved against the
/// plugin's compiled-in action table (see `aura-plugins::registry`);
/// Rust's `unsafe_code = "forbid"` lint rules out true dynamic dylib
/// loading, so resolution is by name against code registered at compile
/// time rather than introspected from the filesystem.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    pub entry_point: String,
    pub read_only: bool,
    pub public: bool,
    pub requires_services: HashMap<String, String>,
    #[serde(default)]
    pub cpu_bound: bool,
}

/// Descriptor for one exported service.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServiceDescriptor {
    pub alias: String,
    pub class_path: String,
}

/// The API descriptor file shape: one per plugin, declaring its exports.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ApiDescriptor {
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ServiceLifecycle {
    Defined,
    Resolving,
    Resolved,
    Failed,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
