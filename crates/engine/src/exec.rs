// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Execution Engine (§4.F): walks a task's `steps` list, applying
//! guards and loops, resolving and invoking actions, and handling
//! per-step error recovery.

use aura_core::{AuraError, Clock};
use aura_plugins::{Action, Registry, ServiceBag};
use aura_runbook::{render_bool, StepDefinition, TaskDefinition};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::{ExecutionContext, NodeResult, StepStatus};

/// Node lifecycle notifications the engine emits around each step. The
/// Orchestrator implements this to publish `node.started` /
/// `node.heartbeat` / `node.finished` on the event bus.
pub trait StepCallbacks: Send + Sync {
    fn on_started(&self, step_name: &str);
    fn on_heartbeat(&self, step_name: &str, payload: serde_json::Value);
    fn on_finished(&self, step_name: &str, succeeded: bool);
}

pub struct NoopCallbacks;

impl StepCallbacks for NoopCallbacks {
    fn on_started(&self, _step_name: &str) {}
    fn on_heartbeat(&self, _step_name: &str, _payload: serde_json::Value) {}
    fn on_finished(&self, _step_name: &str, _succeeded: bool) {}
}

/// Dispatches a resolved action onto the appropriate worker pool
/// (§4.F step 6). The Execution Manager owns the real IO/CPU pools
/// (§4.H); [`InlineActionRunner`] is a pool-free default sufficient for
/// engine-level tests and for plugins that don't need the isolation.
#[async_trait::async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(
        &self,
        action: Arc<dyn Action>,
        cpu_bound: bool,
        params: IndexMap<String, serde_json::Value>,
        services: ServiceBag,
    ) -> Result<serde_json::Value, AuraError>;
}

pub struct InlineActionRunner;

#[async_trait::async_trait]
impl ActionRunner for InlineActionRunner {
    async fn run(
        &self,
        action: Arc<dyn Action>,
        _cpu_bound: bool,
        params: IndexMap<String, serde_json::Value>,
        services: ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        action.invoke(params, &services).await
    }
}

/// Generic over the clock implementation since [`Clock`] is not
/// object-safe (its `Clone` supertrait rules out `dyn Clock`).
pub struct Engine<C: Clock> {
    registry: Arc<Registry>,
    runner: Arc<dyn ActionRunner>,
    clock: C,
}

impl<C: Clock + 'static> Engine<C> {
    pub fn new(registry: Arc<Registry>, runner: Arc<dyn ActionRunner>, clock: C) -> Self {
        Self { registry, runner, clock }
    }

    /// Runs every step of `task` against `ctx`, stopping at the first
    /// step whose failure has no `on_error` recovery (§4.F step 8).
    pub async fn run_task(
        &self,
        task: &TaskDefinition,
        ctx: &Arc<ExecutionContext>,
        deadline: Option<Instant>,
        callbacks: &dyn StepCallbacks,
    ) -> Result<(), AuraError> {
        for step in &task.steps {
            self.run_step(step, ctx, deadline, callbacks).await?;
        }
        Ok(())
    }

    /// Handles one top-level step: the `when` guard and `loop`
    /// expansion (§4.F steps 1-2), delegating each (possibly single)
    /// iteration to [`execute_single`](Self::execute_single).
    pub async fn run_step(
        &self,
        step: &StepDefinition,
        ctx: &Arc<ExecutionContext>,
        deadline: Option<Instant>,
        callbacks: &dyn StepCallbacks,
    ) -> Result<(), AuraError> {
        if let Some(when) = &step.when {
            let proceed = render_bool(when, ctx.as_ref())
                .map_err(|e| AuraError::ValidationError(format!("step '{}' when: {e}", step.name)))?;
            if !proceed {
                ctx.record_node(
                    step.name.clone(),
                    NodeResult {
                        status: StepStatus::Skipped,
                        start_ms: self.clock.epoch_ms(),
                        end_ms: Some(self.clock.epoch_ms()),
                        output: None,
                    },
                );
                return Ok(());
            }
        }

        if let Some(loop_expr) = &step.loop_expr {
            return self.run_loop_step(step, loop_expr, ctx, deadline, callbacks).await;
        }

        self.execute_single(step, ctx, deadline, callbacks).await.map(drop)
    }

    async fn run_loop_step(
        &self,
        step: &StepDefinition,
        loop_expr: &str,
        ctx: &Arc<ExecutionContext>,
        deadline: Option<Instant>,
        callbacks: &dyn StepCallbacks,
    ) -> Result<(), AuraError> {
        let rendered = aura_runbook::render(loop_expr, ctx.as_ref())
            .map_err(|e| AuraError::ValidationError(format!("step '{}' loop: {e}", step.name)))?;
        let items = rendered
            .as_list()
            .ok_or_else(|| AuraError::ValidationError(format!("step '{}' loop did not render to a list", step.name)))?
            .to_vec();

        let body = StepDefinition { loop_expr: None, ..step.clone() };
        let start_ms = self.clock.epoch_ms();
        let mut outputs = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let child = ctx.child_for_loop(item.into_json(), index as i64);
            match self.execute_single(&body, &child, deadline, callbacks).await {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    ctx.record_node(
                        step.name.clone(),
                        NodeResult {
                            status: StepStatus::Failed,
                            start_ms,
                            end_ms: Some(self.clock.epoch_ms()),
                            output: Some(serde_json::Value::Array(outputs)),
                        },
                    );
                    return Err(e);
                }
            }
        }

        let output = serde_json::Value::Array(outputs);
        ctx.record_step_output(step.name.clone(), output.clone());
        ctx.record_node(
            step.name.clone(),
            NodeResult {
                status: StepStatus::Succeeded,
                start_ms,
                end_ms: Some(self.clock.epoch_ms()),
                output: Some(output),
            },
        );
        Ok(())
    }

    /// Runs §4.F steps 3-8 for one step occurrence: resolve the action,
    /// inject services, render params, invoke under a deadline, record
    /// the node result, and run `on_error` recovery on failure.
    /// Boxed because `on_error` sub-steps recurse back into this
    /// method.
    pub fn execute_single<'a>(
        &'a self,
        step: &'a StepDefinition,
        ctx: &'a Arc<ExecutionContext>,
        deadline: Option<Instant>,
        callbacks: &'a dyn StepCallbacks,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, AuraError>> + Send + 'a>> {
        Box::pin(async move {
            let start_ms = self.clock.epoch_ms();
            callbacks.on_started(&step.name);

            let outcome = self.invoke_action(step, ctx, deadline).await;
            let end_ms = self.clock.epoch_ms();

            match outcome {
                Ok(output) => {
                    ctx.record_step_output(step.name.clone(), output.clone());
                    ctx.record_node(
                        step.name.clone(),
                        NodeResult { status: StepStatus::Succeeded, start_ms, end_ms: Some(end_ms), output: Some(output.clone()) },
                    );
                    callbacks.on_finished(&step.name, true);
                    Ok(output)
                }
                Err(e) if !step.on_error.is_empty() => {
                    tracing::warn!(step = %step.name, error = %e, "step failed, running on_error");
                    let mut recovered = serde_json::Value::Null;
                    for sub in &step.on_error {
                        recovered = self.execute_single(sub, ctx, deadline, callbacks).await?;
                    }
                    // Every on_error sub-step succeeded (a failing one
                    // would have returned via `?` above), so the step
                    // itself recovered rather than failed.
                    ctx.record_step_output(step.name.clone(), recovered.clone());
                    ctx.record_node(
                        step.name.clone(),
                        NodeResult { status: StepStatus::Succeeded, start_ms, end_ms: Some(end_ms), output: Some(recovered.clone()) },
                    );
                    callbacks.on_finished(&step.name, true);
                    Ok(recovered)
                }
                Err(e) => {
                    tracing::warn!(step = %step.name, error = %e, "step failed, no on_error recovery");
                    ctx.record_node(
                        step.name.clone(),
                        NodeResult { status: StepStatus::Failed, start_ms, end_ms: Some(end_ms), output: None },
                    );
                    callbacks.on_finished(&step.name, false);
                    Err(e)
                }
            }
        })
    }

    async fn invoke_action(
        &self,
        step: &StepDefinition,
        ctx: &Arc<ExecutionContext>,
        deadline: Option<Instant>,
    ) -> Result<serde_json::Value, AuraError> {
        let entry = self
            .registry
            .get_action(&step.action)
            .ok_or_else(|| AuraError::ActionError(format!("unknown action '{}'", step.action)))?;

        let mut services = HashMap::new();
        for (param, service_alias) in &entry.requires_services {
            let svc = self.registry.resolve_service(service_alias).await?;
            services.insert(param.clone(), svc);
        }
        let services = ServiceBag::new(services);

        let mut params = IndexMap::with_capacity(step.params.len());
        for (key, value) in &step.params {
            params.insert(key.clone(), render_param(value, ctx.as_ref())?);
        }

        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        if remaining == Some(Duration::ZERO) {
            return Err(AuraError::Timeout);
        }

        let call = self.runner.run(entry.callable.clone(), entry.cpu_bound, params, services);
        match remaining {
            Some(budget) => tokio::time::timeout(budget, call).await.map_err(|_| AuraError::Timeout)?,
            None => call.await,
        }
    }
}

fn render_param(value: &serde_json::Value, scope: &dyn aura_runbook::Scope) -> Result<serde_json::Value, AuraError> {
    match value {
        serde_json::Value::String(s) if s.contains("{{") => Ok(aura_runbook::render(s, scope)
            .map_err(|e| AuraError::ValidationError(format!("rendering param: {e}")))?
            .into_json()),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
