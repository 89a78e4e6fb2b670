// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Orchestrator (§4.G): owns one loaded plan. Runs a task end to end
//! — mint a run id, build a root context, drive the Execution Engine,
//! and publish the task's lifecycle events — and doubles as the
//! `StateOracle` the State Planner uses for this plan's check/transition
//! tasks.

use aura_core::{AuraError, Clock, Event, EventBus, RunId, StateMap};
use aura_engine::context::NodeResult as EngineNodeResult;
use aura_engine::{Engine, ExecutionContext, NoopCallbacks, StateOracle, StepStatus};
use aura_plugins::{Registry, ServiceBag};
use aura_runbook::{Scope, TaskLoader};
use aura_wire::{NodeResult as WireNodeResult, TaskFinalResult, TfrStatus};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Names a single action invocation used as a Scheduler interrupt
/// rule's truthiness test (§4.I): no steps, no loop, just one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDefinition {
    pub action: String,
    #[serde(default)]
    pub params: IndexMap<String, serde_json::Value>,
}

pub struct Orchestrator<C: Clock> {
    plan_name: String,
    plan_root: PathBuf,
    task_loader: Arc<TaskLoader>,
    registry: Arc<Registry>,
    engine: Arc<Engine<C>>,
    event_bus: Arc<EventBus>,
    clock: C,
    state_map: RwLock<Option<Arc<StateMap>>>,
}

impl<C: Clock + 'static> Orchestrator<C> {
    pub fn new(
        plan_name: impl Into<String>,
        plan_root: impl Into<PathBuf>,
        task_loader: Arc<TaskLoader>,
        registry: Arc<Registry>,
        engine: Arc<Engine<C>>,
        event_bus: Arc<EventBus>,
        clock: C,
    ) -> Self {
        Self {
            plan_name: plan_name.into(),
            plan_root: plan_root.into(),
            task_loader,
            registry,
            engine,
            event_bus,
            clock,
            state_map: RwLock::new(None),
        }
    }

    pub fn plan_name(&self) -> &str {
        &self.plan_name
    }

    /// Installs (or clears) the plan's state-transition graph. Called
    /// once at plan load time and again by the hot-reload supervisor
    /// whenever the plan's `statemap.toml` changes.
    pub fn set_state_map(&self, map: Option<Arc<StateMap>>) {
        *self.state_map.write() = map;
    }

    /// If `task_name` declares a `required_state` and this plan has a
    /// state map, returns both so the Execution Manager can drive the
    /// planner before running the task (§4.H step 2). `Ok(None)` means
    /// the task has no precondition to plan toward.
    pub fn task_preconditions(&self, task_name: &str) -> Result<Option<(Arc<StateMap>, String)>, AuraError> {
        let task_def = self.task_loader.get_task_data(&self.plan_name, task_name)?;
        let target = match &task_def.required_state {
            Some(t) => t.clone(),
            None => return Ok(None),
        };
        Ok(self.state_map.read().clone().map(|map| (map, target)))
    }

    /// Runs `task_name` end to end (§4.G steps 1-8). Never propagates a
    /// `Result` error: anything that goes wrong is folded into the
    /// returned [`TaskFinalResult`] as `TfrStatus::Error`, matching the
    /// contract that only admission-time failures are ever raised to
    /// the caller as a plain `Result`.
    pub async fn execute_task(
        &self,
        task_name: &str,
        inputs: HashMap<String, serde_json::Value>,
        cancellation: CancellationToken,
        deadline: Option<Instant>,
    ) -> TaskFinalResult {
        let span = tracing::info_span!("plan_scope", plan = %self.plan_name, task = %task_name);
        self.execute_task_inner(task_name, inputs, cancellation, deadline).instrument(span).await
    }

    async fn execute_task_inner(
        &self,
        task_name: &str,
        inputs: HashMap<String, serde_json::Value>,
        cancellation: CancellationToken,
        deadline: Option<Instant>,
    ) -> TaskFinalResult {
        let start_ms = self.clock.epoch_ms();
        let run_id = RunId::new(&self.plan_name, task_name, start_ms);

        self.event_bus
            .publish(Event::new(
                "task.started",
                serde_json::json!({"run_id": run_id.to_string(), "plan": self.plan_name, "task": task_name}),
                start_ms,
            ))
            .await;

        let run_result = tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(AuraError::Cancelled),
            res = self.run_inner(task_name, inputs, deadline) => res,
        };

        let (status, user_data, error_info, node_results) = match run_result {
            Ok((nodes, user_data)) => {
                let failed = nodes.values().any(|n| n.status == StepStatus::Failed);
                (if failed { TfrStatus::Failed } else { TfrStatus::Success }, user_data, None, nodes)
            }
            Err(e) => (TfrStatus::Error, serde_json::Value::Null, Some(e.to_string()), IndexMap::new()),
        };

        let end_ms = self.clock.epoch_ms();
        let tfr = TaskFinalResult {
            run_id,
            plan: self.plan_name.clone(),
            task: task_name.to_string(),
            status,
            user_data,
            error_info,
            start_time_ms: start_ms,
            end_time_ms: end_ms,
            duration_ms: end_ms.saturating_sub(start_ms),
            node_results: node_results.into_iter().map(|(name, n)| wire_node_result(name, n)).collect(),
        };

        self.event_bus
            .publish(Event::new(
                "task.finished",
                serde_json::to_value(&tfr).unwrap_or(serde_json::Value::Null),
                end_ms,
            ))
            .await;

        tfr
    }

    async fn run_inner(
        &self,
        task_name: &str,
        inputs: HashMap<String, serde_json::Value>,
        deadline: Option<Instant>,
    ) -> Result<(IndexMap<String, EngineNodeResult>, serde_json::Value), AuraError> {
        let task_def = self.task_loader.get_task_data(&self.plan_name, task_name)?;
        let ctx = ExecutionContext::new(inputs);
        let outcome = self.engine.run_task(&task_def, &ctx, deadline, &NoopCallbacks).await;
        let nodes = ctx.nodes_snapshot();

        match outcome {
            Ok(()) => {
                let user_data = match &task_def.returns {
                    Some(spec) => render_returns(spec, ctx.as_ref())?,
                    None => serde_json::Value::Null,
                };
                Ok((nodes, user_data))
            }
            Err(e) => {
                if nodes.values().any(|n| n.status == StepStatus::Failed) {
                    Ok((nodes, serde_json::Value::Null))
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Publishes `task.cancelled` for a Tasklet that never reached
    /// `execute_task` — admission was cancelled before the run started,
    /// so `task.started`/`task.finished` never fire for it (Open
    /// Question #1: pre-admission cancellation gets its own event).
    pub async fn publish_cancelled(&self, run_id: &str, task_name: &str, at_ms: u64) {
        self.event_bus
            .publish(Event::new(
                "task.cancelled",
                serde_json::json!({"run_id": run_id, "plan": self.plan_name, "task": task_name}),
                at_ms,
            ))
            .await;
    }

    /// Runs a single action outside of any task's step list — the
    /// Scheduler's interrupt rules use this to evaluate their
    /// condition without the overhead of a full task definition.
    pub async fn perform_condition_check(&self, condition: &ConditionDefinition) -> Result<bool, AuraError> {
        let entry = self
            .registry
            .get_action(&condition.action)
            .ok_or_else(|| AuraError::ActionError(format!("unknown action '{}'", condition.action)))?;

        let mut services = HashMap::new();
        for (param, alias) in &entry.requires_services {
            services.insert(param.clone(), self.registry.resolve_service(alias).await?);
        }

        let output = entry.callable.invoke(condition.params.clone(), &ServiceBag::new(services)).await?;
        Ok(truthy(&output))
    }

    fn resolve_sandboxed(&self, rel: &Path) -> Result<PathBuf, AuraError> {
        let root = self.plan_root.canonicalize().map_err(|e| {
            AuraError::internal(format!("canonicalizing plan root {}: {e}", self.plan_root.display()))
        })?;
        let joined = self.plan_root.join(rel);
        let canon = match joined.canonicalize() {
            Ok(p) => p,
            Err(_) => {
                let parent = joined
                    .parent()
                    .ok_or_else(|| AuraError::internal(format!("{} has no parent", joined.display())))?;
                let parent_canon = parent
                    .canonicalize()
                    .map_err(|e| AuraError::internal(format!("canonicalizing {}: {e}", parent.display())))?;
                let file_name = joined
                    .file_name()
                    .ok_or_else(|| AuraError::internal(format!("{} has no file name", joined.display())))?;
                parent_canon.join(file_name)
            }
        };

        if canon != root && !canon.starts_with(&root) {
            return Err(AuraError::PermissionDenied {
                path: joined.display().to_string(),
                root: root.display().to_string(),
            });
        }
        Ok(canon)
    }

    pub fn read_file(&self, rel: impl AsRef<Path>) -> Result<Vec<u8>, AuraError> {
        let path = self.resolve_sandboxed(rel.as_ref())?;
        std::fs::read(&path).map_err(|e| AuraError::internal(format!("reading {}: {e}", path.display())))
    }

    pub fn write_file(&self, rel: impl AsRef<Path>, contents: &[u8]) -> Result<(), AuraError> {
        let path = self.resolve_sandboxed(rel.as_ref())?;
        std::fs::write(&path, contents).map_err(|e| AuraError::internal(format!("writing {}: {e}", path.display())))
    }

    pub fn delete_file(&self, rel: impl AsRef<Path>) -> Result<(), AuraError> {
        let path = self.resolve_sandboxed(rel.as_ref())?;
        std::fs::remove_file(&path).map_err(|e| AuraError::internal(format!("deleting {}: {e}", path.display())))
    }

    pub fn list_dir(&self, rel: impl AsRef<Path>) -> Result<Vec<String>, AuraError> {
        let path = self.resolve_sandboxed(rel.as_ref())?;
        let entries = std::fs::read_dir(&path)
            .map_err(|e| AuraError::internal(format!("listing {}: {e}", path.display())))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AuraError::internal(format!("reading dir entry: {e}")))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Runs `task_id` with no inputs and no deadline, treating this
    /// Orchestrator's own execution machinery as the side-effecting
    /// engine behind a check or transition task.
    async fn run_task_as_oracle(&self, task_id: &str) -> Result<TaskFinalResult, AuraError> {
        let tfr = self.execute_task(task_id, HashMap::new(), CancellationToken::new(), None).await;
        if tfr.status == TfrStatus::Error {
            return Err(AuraError::ActionError(
                tfr.error_info.unwrap_or_else(|| format!("task '{task_id}' errored")),
            ));
        }
        Ok(tfr)
    }
}

#[async_trait::async_trait]
impl<C: Clock + 'static> StateOracle for Orchestrator<C> {
    async fn check(&self, task_id: &str) -> Result<bool, AuraError> {
        let tfr = self.run_task_as_oracle(task_id).await?;
        Ok(tfr.status == TfrStatus::Success)
    }

    async fn transition(&self, task_id: &str) -> Result<(), AuraError> {
        let tfr = self.run_task_as_oracle(task_id).await?;
        if tfr.status != TfrStatus::Success {
            return Err(AuraError::PlanningFailed(format!("transition task '{task_id}' did not succeed")));
        }
        Ok(())
    }
}

fn render_returns(
    spec: &IndexMap<String, serde_json::Value>,
    scope: &dyn Scope,
) -> Result<serde_json::Value, AuraError> {
    let mut out = serde_json::Map::with_capacity(spec.len());
    for (key, value) in spec {
        let rendered = match value {
            serde_json::Value::String(s) if s.contains("{{") => aura_runbook::render(s, scope)
                .map_err(|e| AuraError::ValidationError(format!("rendering return '{key}': {e}")))?
                .into_json(),
            other => other.clone(),
        };
        out.insert(key.clone(), rendered);
    }
    Ok(serde_json::Value::Object(out))
}

fn wire_node_result(name: String, n: EngineNodeResult) -> WireNodeResult {
    let status = match n.status {
        StepStatus::Running => "RUNNING",
        StepStatus::Skipped => "SKIPPED",
        StepStatus::Succeeded => "SUCCEEDED",
        StepStatus::Failed => "FAILED",
    };
    WireNodeResult {
        name,
        status: status.to_string(),
        start_ms: n.start_ms,
        end_ms: n.end_ms.unwrap_or(n.start_ms),
        output: n.output.unwrap_or(serde_json::Value::Null),
    }
}

fn truthy(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
