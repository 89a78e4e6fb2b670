// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Execution Manager (§4.H): the global singleton that admits a Tasklet
//! through concurrency semaphores, drives state planning ahead of a
//! task declaring a precondition, fires lifecycle hooks, and folds
//! every possible outcome into a [`TaskFinalResult`] so nothing after
//! admission ever propagates as a bare `Result` error.

use crate::config::SchedulerConfig;
use aura_core::{AuraError, Clock, Tasklet};
use aura_engine::planner::execute_plan;
use aura_plugins::registry::Registry;
use aura_wire::{TaskFinalResult, TfrStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, SemaphorePermit};
use tracing::{instrument, warn};

use crate::orchestrator::Orchestrator;

/// Coarse classification fed to `after_task_failure`. `TaskFinalResult`
/// only distinguishes `{SUCCESS, FAILED, ERROR}`; this is the finer
/// breakdown §4.H step 6 asks hooks to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Timeout,
    Cancelled,
    PlanningFailed,
    Other,
}

impl FailureClass {
    fn as_str(self) -> &'static str {
        match self {
            FailureClass::Timeout => "TIMEOUT",
            FailureClass::Cancelled => "CANCELLED",
            FailureClass::PlanningFailed => "PLANNING_FAILED",
            FailureClass::Other => "OTHER",
        }
    }
}

/// Holds admission permits for the lifetime of one `submit` call; drop
/// releases them unconditionally, satisfying §4.H step 8 ("release all
/// semaphores via scope exit") regardless of which return path is taken.
struct PermitGuard<'a> {
    _global: SemaphorePermit<'a>,
    _tags: Vec<OwnedSemaphorePermit>,
}

pub struct ExecutionManager<C: Clock> {
    config: SchedulerConfig,
    global_semaphore: Arc<Semaphore>,
    resource_semaphores: RwLock<HashMap<String, Arc<Semaphore>>>,
    registry: Arc<Registry>,
    clock: C,
}

impl<C: Clock + 'static> ExecutionManager<C> {
    pub fn new(config: SchedulerConfig, registry: Arc<Registry>, clock: C) -> Self {
        let global_semaphore = Arc::new(Semaphore::new(config.global_concurrency));
        Self { config, global_semaphore, resource_semaphores: RwLock::new(HashMap::new()), registry, clock }
    }

    fn semaphore_for_tag(&self, tag: &str) -> Arc<Semaphore> {
        if let Some(existing) = self.resource_semaphores.read().get(tag) {
            return existing.clone();
        }
        let mut tags = self.resource_semaphores.write();
        tags.entry(tag.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.resource_tag_cap(tag))))
            .clone()
    }

    /// Acquires the global permit plus one permit per resource tag, in
    /// a fixed (sorted) order so two tasklets contending for the same
    /// tag set never deadlock against each other. Cancellable via the
    /// tasklet's own token.
    async fn acquire_permits<'a>(&'a self, tasklet: &Tasklet) -> Result<PermitGuard<'a>, AuraError> {
        let global = tokio::select! {
            biased;
            _ = tasklet.cancellation.cancelled() => return Err(AuraError::Cancelled),
            permit = self.global_semaphore.acquire() => permit.map_err(|_| AuraError::internal("global semaphore closed"))?,
        };

        let mut tags: Vec<String> = tasklet.resource_tags.iter().cloned().collect();
        tags.sort();
        let semaphores: Vec<Arc<Semaphore>> = tags.iter().map(|t| self.semaphore_for_tag(t)).collect();

        let mut held = Vec::with_capacity(semaphores.len());
        for sem in &semaphores {
            let permit = tokio::select! {
                biased;
                _ = tasklet.cancellation.cancelled() => return Err(AuraError::Cancelled),
                permit = sem.clone().acquire_owned() => permit.map_err(|_| AuraError::internal("resource semaphore closed"))?,
            };
            held.push(permit);
        }

        Ok(PermitGuard { _global: global, _tags: held })
    }

    /// §4.H step 2: if the task declares `required_state` and the plan
    /// has a state map, drives the planner to that state before the
    /// task's own steps run.
    async fn handle_state_planning(
        &self,
        orchestrator: &Arc<Orchestrator<C>>,
        task_name: &str,
    ) -> Result<(), AuraError> {
        let Some((map, target)) = orchestrator.task_preconditions(task_name)? else {
            return Ok(());
        };
        let oracle: Arc<dyn aura_engine::planner::StateOracle> = orchestrator.clone();
        execute_plan(&map, &target, oracle, self.config.verify_retries, self.config.max_replans).await
    }

    async fn fire_hook(&self, point: &str, payload: serde_json::Value) {
        for hook in self.registry.hooks_for(point) {
            if let Err(err) = hook.callable.call(payload.clone()).await {
                warn!(hook = point, owner = %hook.owner_plugin, error = %err, "lifecycle hook failed");
            }
        }
    }

    fn classify(&self, tasklet: &Tasklet, tfr: &TaskFinalResult) -> FailureClass {
        if tasklet.cancellation.is_cancelled() {
            FailureClass::Cancelled
        } else if matches!(&tfr.error_info, Some(msg) if msg.contains("deadline exceeded")) {
            FailureClass::Timeout
        } else {
            FailureClass::Other
        }
    }

    /// Runs the full §4.H `submit` sequence for one already-admitted
    /// tasklet against the plan it targets. Infallible: every failure
    /// mode, including admission cancellation and planning failure, is
    /// folded into the returned [`TaskFinalResult`].
    #[instrument(skip(self, orchestrator, tasklet), fields(run_id = %tasklet.run_id, task = %tasklet.task))]
    pub async fn submit(&self, orchestrator: &Arc<Orchestrator<C>>, tasklet: Tasklet) -> TaskFinalResult {
        let start_ms = self.clock.epoch_ms();

        let _permits = match self.acquire_permits(&tasklet).await {
            Ok(permits) => permits,
            Err(err) => {
                let end_ms = self.clock.epoch_ms();
                if matches!(err, AuraError::Cancelled) {
                    orchestrator.publish_cancelled(&tasklet.run_id.0, &tasklet.task, end_ms).await;
                }
                return admission_failure_tfr(&tasklet, start_ms, err);
            }
        };

        let planning_result = self.handle_state_planning(orchestrator, &tasklet.task).await;
        if let Err(err) = planning_result {
            let tfr = planning_failure_tfr(&tasklet, start_ms, self.clock.epoch_ms(), err);
            self.fire_hook(
                "after_task_failure",
                hook_payload(&tasklet, &tfr, FailureClass::PlanningFailed),
            )
            .await;
            self.fire_hook("after_task_run", hook_payload(&tasklet, &tfr, FailureClass::PlanningFailed)).await;
            return tfr;
        }

        self.fire_hook("before_task_run", serde_json::json!({ "run_id": tasklet.run_id.0, "task": tasklet.task }))
            .await;

        let deadline = Instant::now() + Duration::from_secs(tasklet.timeout_secs.max(1));
        let tfr = orchestrator
            .execute_task(&tasklet.task, tasklet.inputs.clone(), tasklet.cancellation.clone(), Some(deadline))
            .await;

        match tfr.status {
            TfrStatus::Success => {
                self.fire_hook("after_task_success", hook_payload(&tasklet, &tfr, FailureClass::Other)).await;
            }
            TfrStatus::Failed | TfrStatus::Error => {
                let class = self.classify(&tasklet, &tfr);
                self.fire_hook("after_task_failure", hook_payload(&tasklet, &tfr, class)).await;
            }
        }
        self.fire_hook("after_task_run", hook_payload(&tasklet, &tfr, FailureClass::Other)).await;

        tfr
    }
}

fn hook_payload(tasklet: &Tasklet, tfr: &TaskFinalResult, class: FailureClass) -> serde_json::Value {
    serde_json::json!({
        "run_id": tasklet.run_id.0,
        "plan": tasklet.plan,
        "task": tasklet.task,
        "status": tfr.status,
        "classification": class.as_str(),
    })
}

fn admission_failure_tfr(tasklet: &Tasklet, start_ms: u64, err: AuraError) -> TaskFinalResult {
    TaskFinalResult {
        run_id: tasklet.run_id.clone(),
        plan: tasklet.plan.clone(),
        task: tasklet.task.clone(),
        status: TfrStatus::Error,
        user_data: serde_json::Value::Null,
        error_info: Some(err.to_string()),
        start_time_ms: start_ms,
        end_time_ms: start_ms,
        duration_ms: 0,
        node_results: Vec::new(),
    }
}

fn planning_failure_tfr(tasklet: &Tasklet, start_ms: u64, end_ms: u64, err: AuraError) -> TaskFinalResult {
    TaskFinalResult {
        run_id: tasklet.run_id.clone(),
        plan: tasklet.plan.clone(),
        task: tasklet.task.clone(),
        status: TfrStatus::Error,
        user_data: serde_json::Value::Null,
        error_info: Some(err.to_string()),
        start_time_ms: start_ms,
        end_time_ms: end_ms,
        duration_ms: end_ms.saturating_sub(start_ms),
        node_results: Vec::new(),
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
