// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Scheduler (§4.I): the system's entry point. Owns the three priority
//! queues, their consumer loops, interrupt-rule evaluation, the
//! hot-reload supervisor, and queue visibility events.

use crate::config::SchedulerConfig;
use crate::manager::ExecutionManager;
use crate::orchestrator::{ConditionDefinition, Orchestrator};
use crate::queue::PriorityQueue;
use aura_core::{AuraError, Clock, Event, EventBus, Tasklet};
use aura_plugins::loader::{discover_and_load, manifest_dirs, LoadedPlugin};
use aura_plugins::Registry;
use aura_runbook::TaskLoader;
use aura_wire::ActiveRunEntry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Scope of an interrupt rule's cancellation: just the task that
/// tripped the condition, or every currently running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    CurrentTask,
    AllTasks,
}

/// `(condition, handler_task_fqid, scope)` from §4.I. A background
/// task evaluates `condition` on a fixed interval via
/// `Orchestrator::perform_condition_check`; a truthy result cancels the
/// scoped running tasks and enqueues the handler on the interrupt queue.
pub struct InterruptRule {
    pub condition: ConditionDefinition,
    pub handler_plan: String,
    pub handler_task: String,
    pub scope: RuleScope,
}

/// A predefined `run_manual_task` invocation, resolved by id.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub plan: String,
    pub task: String,
    pub inputs: HashMap<String, serde_json::Value>,
    pub priority: i32,
    pub timeout_secs: u64,
}

struct NamedQueue {
    name: &'static str,
    queue: PriorityQueue,
    notify: Notify,
    sequence: AtomicU64,
}

impl NamedQueue {
    fn new(name: &'static str) -> Self {
        Self { name, queue: PriorityQueue::new(), notify: Notify::new(), sequence: AtomicU64::new(0) }
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

/// The system entry point. Cheap to call into from many callers at
/// once (`run_ad_hoc_task` only enqueues); the actual work happens on
/// the background consumer loops started by `start_scheduler`.
pub struct Scheduler<C: Clock> {
    config: SchedulerConfig,
    main: NamedQueue,
    event: NamedQueue,
    interrupt: NamedQueue,
    running: RwLock<HashMap<String, Tasklet>>,
    orchestrators: RwLock<HashMap<String, Arc<Orchestrator<C>>>>,
    schedule_entries: RwLock<HashMap<String, ScheduleEntry>>,
    interrupt_rules: RwLock<Vec<InterruptRule>>,
    manager: Arc<ExecutionManager<C>>,
    event_bus: Arc<EventBus>,
    clock: C,
    stop: CancellationToken,
}

impl<C: Clock + 'static> Scheduler<C> {
    pub fn new(config: SchedulerConfig, registry: Arc<Registry>, event_bus: Arc<EventBus>, clock: C) -> Self {
        let manager = Arc::new(ExecutionManager::new(config.clone(), registry, clock.clone()));
        Self {
            config,
            main: NamedQueue::new("main"),
            event: NamedQueue::new("event"),
            interrupt: NamedQueue::new("interrupt"),
            running: RwLock::new(HashMap::new()),
            orchestrators: RwLock::new(HashMap::new()),
            schedule_entries: RwLock::new(HashMap::new()),
            interrupt_rules: RwLock::new(Vec::new()),
            manager,
            event_bus,
            clock,
            stop: CancellationToken::new(),
        }
    }

    /// Registers the orchestrator for one loaded plan, so
    /// `run_ad_hoc_task` can validate and dispatch against it. Called
    /// once per plan at startup and again whenever a plan is
    /// (re)loaded.
    pub fn register_plan(&self, plan_name: impl Into<String>, orchestrator: Arc<Orchestrator<C>>) {
        self.orchestrators.write().insert(plan_name.into(), orchestrator);
    }

    pub fn register_schedule_entry(&self, id: impl Into<String>, entry: ScheduleEntry) {
        self.schedule_entries.write().insert(id.into(), entry);
    }

    pub fn register_interrupt_rule(&self, rule: InterruptRule) {
        self.interrupt_rules.write().push(rule);
    }

    fn queue_for(&self, kind: &str) -> &NamedQueue {
        match kind {
            "event" => &self.event,
            "interrupt" => &self.interrupt,
            _ => &self.main,
        }
    }

    async fn publish_queue_event(&self, name: &str, queue: &NamedQueue, tasklet: &Tasklet) {
        let seq = queue.next_seq();
        self.event_bus
            .publish(Event::new(
                name,
                serde_json::json!({
                    "queue": queue.name,
                    "sequence": seq,
                    "run_id": tasklet.run_id.0,
                    "plan": tasklet.plan,
                    "task": tasklet.task,
                }),
                self.clock.epoch_ms(),
            ))
            .await;
    }

    async fn enqueue_on(&self, kind: &str, tasklet: Tasklet) {
        let queue = self.queue_for(kind);
        self.publish_queue_event("queue.enqueued", queue, &tasklet).await;
        queue.queue.enqueue(tasklet);
        queue.notify.notify_one();
    }

    /// §4.I: validates the plan/task exist, constructs a Tasklet, and
    /// enqueues it on the main queue. Returns as soon as the Tasklet is
    /// queued — the result reaches callers only via `task.finished`/the
    /// returned run id, never by blocking here (§7).
    pub async fn run_ad_hoc_task(
        &self,
        plan: &str,
        task: &str,
        inputs: HashMap<String, serde_json::Value>,
    ) -> Result<String, AuraError> {
        self.run_ad_hoc_task_with(plan, task, inputs, 0, self.config.default_task_timeout_secs, Default::default())
            .await
    }

    pub async fn run_ad_hoc_task_with(
        &self,
        plan: &str,
        task: &str,
        inputs: HashMap<String, serde_json::Value>,
        priority: i32,
        timeout_secs: u64,
        resource_tags: std::collections::BTreeSet<String>,
    ) -> Result<String, AuraError> {
        let orchestrator = self
            .orchestrators
            .read()
            .get(plan)
            .cloned()
            .ok_or_else(|| AuraError::ValidationError(format!("unknown plan '{plan}'")))?;
        // Validates the task exists (mtime-cached — cheap enough to call
        // in a tight loop, matching the `repeat`-dispatch note in §4).
        orchestrator.task_preconditions(task)?;

        let epoch_ms = self.clock.epoch_ms();
        let tasklet = Tasklet::new(plan, task, inputs, priority, timeout_secs, resource_tags, epoch_ms, epoch_ms);
        let run_id = tasklet.run_id.0.clone();
        self.enqueue_on("main", tasklet).await;
        Ok(run_id)
    }

    /// §4.I: resolves a predefined schedule entry's plan/task/inputs
    /// and delegates to the same enqueue path as `run_ad_hoc_task`.
    pub async fn run_manual_task(&self, schedule_entry_id: &str) -> Result<String, AuraError> {
        let entry = self
            .schedule_entries
            .read()
            .get(schedule_entry_id)
            .cloned()
            .ok_or_else(|| AuraError::ValidationError(format!("unknown schedule entry '{schedule_entry_id}'")))?;
        self.run_ad_hoc_task_with(
            &entry.plan,
            &entry.task,
            entry.inputs,
            entry.priority,
            entry.timeout_secs,
            Default::default(),
        )
        .await
    }

    /// Sets the cancellation signal on a queued or running tasklet.
    /// The consumer/execution-manager observes it at the next
    /// suspension point and unwinds (§4.I, §5).
    pub fn cancel(&self, run_id: &str) -> bool {
        if let Some(tasklet) = self.running.read().get(run_id) {
            tasklet.cancellation.cancel();
            return true;
        }
        for queue in [&self.main, &self.event, &self.interrupt] {
            if let Some(tasklet) = queue.queue.remove(run_id) {
                tasklet.cancellation.cancel();
                queue.queue.enqueue(tasklet);
                return true;
            }
        }
        false
    }

    /// Reorders `run_id` within whichever queue still holds it;
    /// no-op once running (§4.I).
    pub fn set_priority(&self, run_id: &str, new_priority: i32) -> bool {
        [&self.main, &self.event, &self.interrupt]
            .into_iter()
            .any(|q| q.queue.set_priority(run_id, new_priority))
    }

    /// Point-in-time snapshot of the running-tasks table, for a
    /// collaborator polling `GET /api/runs/active` (§4).
    pub fn active_runs(&self) -> Vec<ActiveRunEntry> {
        self.running.read().values().map(ActiveRunEntry::from_tasklet).collect()
    }

    pub fn queue_overview(&self) -> aura_wire::QueueOverview {
        aura_wire::QueueOverview {
            main_ready: self.main.queue.len(),
            event_ready: self.event.queue.len(),
            interrupt_ready: self.interrupt.queue.len(),
            running: self.running.read().len(),
        }
    }

    async fn consume_one(&self, kind: &str, tasklet: Tasklet) {
        let run_id = tasklet.run_id.0.clone();
        let plan = tasklet.plan.clone();
        self.publish_queue_event("queue.dequeued", self.queue_for(kind), &tasklet).await;

        let Some(orchestrator) = self.orchestrators.read().get(&plan).cloned() else {
            warn!(plan = %plan, "tasklet dispatched against an unregistered plan");
            return;
        };

        self.running.write().insert(run_id.clone(), tasklet.clone());
        // `Orchestrator::execute_task` (invoked by `submit`) publishes
        // `task.started`/`task.finished` itself; the consumer loop only
        // owns the running-tasks table entry around the call.
        self.manager.submit(&orchestrator, tasklet).await;
        self.running.write().remove(&run_id);
    }

    fn spawn_consumer_loop(self: &Arc<Self>, kind: &'static str) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        let stop = self.stop.clone();
        tokio::spawn(async move {
            loop {
                let queue = scheduler.queue_for(kind);
                match queue.queue.dequeue() {
                    Some(tasklet) => scheduler.consume_one(kind, tasklet).await,
                    None => {
                        tokio::select! {
                            biased;
                            _ = stop.cancelled() => break,
                            _ = queue.notify.notified() => {}
                            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                        }
                    }
                }
                if stop.is_cancelled() && scheduler.queue_for(kind).queue.is_empty() {
                    break;
                }
            }
        })
    }

    async fn evaluate_interrupt_rules_once(&self) {
        let rules_snapshot: Vec<usize> = (0..self.interrupt_rules.read().len()).collect();
        for idx in rules_snapshot {
            let (condition, handler_plan, handler_task, scope) = {
                let rules = self.interrupt_rules.read();
                let Some(rule) = rules.get(idx) else { continue };
                (rule.condition.clone(), rule.handler_plan.clone(), rule.handler_task.clone(), rule.scope)
            };
            let Some(orchestrator) = self.orchestrators.read().get(&handler_plan).cloned() else { continue };
            match orchestrator.perform_condition_check(&condition).await {
                Ok(true) => {
                    info!(plan = %handler_plan, task = %handler_task, "interrupt rule tripped");
                    match scope {
                        RuleScope::AllTasks => {
                            for tasklet in self.running.read().values() {
                                tasklet.cancellation.cancel();
                            }
                        }
                        RuleScope::CurrentTask => {
                            if let Some(tasklet) = self.running.read().values().next() {
                                tasklet.cancellation.cancel();
                            }
                        }
                    }
                    let epoch_ms = self.clock.epoch_ms();
                    let tasklet = Tasklet::new(
                        handler_plan.clone(),
                        handler_task.clone(),
                        HashMap::new(),
                        i32::MIN,
                        self.config.default_task_timeout_secs,
                        Default::default(),
                        epoch_ms,
                        epoch_ms,
                    );
                    self.enqueue_on("interrupt", tasklet).await;
                }
                Ok(false) => {}
                Err(err) => warn!(error = %err, "interrupt condition check failed"),
            }
        }
    }

    fn spawn_interrupt_evaluator(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        let stop = self.stop.clone();
        let interval = Duration::from_millis(scheduler.config.interrupt_poll_interval_ms);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                scheduler.evaluate_interrupt_rules_once().await;
            }
        })
    }

    /// Starts the background execution context: one main-queue
    /// consumer, `event_queue_consumers` event-queue consumers, one
    /// interrupt-queue consumer, and the interrupt-rule evaluator.
    /// Returns the set of join handles so a caller can await clean
    /// shutdown after `stop_scheduler`.
    pub fn start_scheduler(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = vec![self.spawn_consumer_loop("main"), self.spawn_consumer_loop("interrupt")];
        for _ in 0..self.config.event_queue_consumers {
            handles.push(self.spawn_consumer_loop("event"));
        }
        handles.push(self.spawn_interrupt_evaluator());
        handles
    }

    /// Initiates a cooperative drain: no new dequeues are started once
    /// in-flight consumer iterations observe the stop signal, and
    /// already-running tasklets run to completion (or their own
    /// deadline/cancellation).
    pub fn stop_scheduler(&self) {
        self.stop.cancel();
    }
}

/// Watches the plugin/task tree and reapplies the Plugin Loader on
/// change, debounced. In-flight tasks keep running against the
/// registry snapshot they were admitted with — this only affects
/// subsequently admitted tasklets.
///
/// A change under a plugin's manifest directory runs the full
/// Clear -> Discover -> Sort -> Load cycle via `reload()`. A change
/// under `<plans_dir>/<plan>/tasks/<task>.yaml` is cheaper: it only
/// invalidates that one task's cache entry (§4.B) and publishes
/// `task.reloaded`, enabled via `with_task_reload`.
pub struct HotReloadSupervisor<C: Clock> {
    roots: Vec<PathBuf>,
    registry: Arc<Registry>,
    plugins: Vec<Arc<dyn LoadedPlugin>>,
    debounce: Duration,
    plans_dir: Option<PathBuf>,
    task_loader: Option<Arc<TaskLoader>>,
    event_bus: Option<Arc<EventBus>>,
    clock: C,
}

impl<C: Clock + 'static> HotReloadSupervisor<C> {
    pub fn new(
        roots: Vec<PathBuf>,
        registry: Arc<Registry>,
        plugins: Vec<Arc<dyn LoadedPlugin>>,
        debounce: Duration,
        clock: C,
    ) -> Self {
        Self { roots, registry, plugins, debounce, plans_dir: None, task_loader: None, event_bus: None, clock }
    }

    /// Enables the task-file-only reload path: watches `plans_dir` in
    /// addition to the plugin manifest directories, and routes a task
    /// file's own change to `task_loader.invalidate` + `task.reloaded`
    /// instead of the full plugin reload.
    pub fn with_task_reload(mut self, plans_dir: PathBuf, task_loader: Arc<TaskLoader>, event_bus: Arc<EventBus>) -> Self {
        self.plans_dir = Some(plans_dir);
        self.task_loader = Some(task_loader);
        self.event_bus = Some(event_bus);
        self
    }

    /// The set of manifest and (if enabled) task directories worth
    /// watching (used to build the filesystem watcher's subscribe
    /// list).
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.roots.iter().flat_map(|r| manifest_dirs(r)).collect();
        if let Some(plans_dir) = &self.plans_dir {
            paths.extend(task_dirs(plans_dir));
        }
        paths
    }

    /// Reruns Discover -> Sort -> Load against the live registry.
    /// Called once per debounced burst of plugin-manifest events.
    pub fn reload(&self) -> Result<Vec<String>, AuraError> {
        discover_and_load(&self.registry, &self.roots, self.plugins.clone())
    }

    /// Resolves a changed path to the `(plan, task)` it belongs to, if
    /// it falls under a watched `<plans_dir>/<plan>/tasks/` directory.
    fn task_for_path(&self, path: &Path) -> Option<(String, String)> {
        let plans_dir = self.plans_dir.as_ref()?;
        let rel = path.strip_prefix(plans_dir).ok()?;
        let mut components = rel.components();
        let plan = components.next()?.as_os_str().to_str()?.to_string();
        if components.next()?.as_os_str() != "tasks" {
            return None;
        }
        let file = components.next()?.as_os_str().to_str()?;
        let task = file.strip_suffix(".yaml").or_else(|| file.strip_suffix(".yml"))?.to_string();
        Some((plan, task))
    }

    async fn reload_task(&self, plan: &str, task: &str) {
        let Some(loader) = &self.task_loader else { return };
        loader.invalidate(plan, task);
        if let Some(bus) = &self.event_bus {
            bus.publish(Event::new(
                "task.reloaded",
                serde_json::json!({ "plan": plan, "task": task }),
                self.clock.epoch_ms(),
            ))
            .await;
        }
    }

    /// Spawns a task that watches `watch_paths()` via `notify` and,
    /// after `debounce` of quiet following the last observed burst of
    /// changes, invalidates affected tasks individually and runs a
    /// full plugin reload if anything outside a task directory also
    /// changed. The watcher lives for the task's lifetime and is torn
    /// down when `stop` fires and the task returns.
    pub fn spawn_watcher(self: Arc<Self>, stop: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            use notify::{RecursiveMode, Watcher};

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<PathBuf>>();
            let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    let _ = tx.send(event.paths);
                }
            });
            let mut watcher = match watcher {
                Ok(w) => w,
                Err(err) => {
                    warn!(error = %err, "failed to start hot-reload filesystem watcher");
                    return;
                }
            };
            for path in self.watch_paths() {
                let _ = watcher.watch(&path, RecursiveMode::NonRecursive);
            }

            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    received = rx.recv() => {
                        let Some(mut changed) = received else { break };
                        tokio::time::sleep(self.debounce).await;
                        while let Ok(more) = rx.try_recv() {
                            changed.extend(more);
                        }

                        let mut plugin_changed = false;
                        let mut tasks_changed: Vec<(String, String)> = Vec::new();
                        for path in &changed {
                            match self.task_for_path(path) {
                                Some(pair) if !tasks_changed.contains(&pair) => tasks_changed.push(pair),
                                Some(_) => {}
                                None => plugin_changed = true,
                            }
                        }

                        for (plan, task) in &tasks_changed {
                            self.reload_task(plan, task).await;
                            info!(plan = %plan, task = %task, "task definition reloaded");
                        }

                        if plugin_changed {
                            match self.reload() {
                                Ok(order) => info!(plugins = order.len(), "hot reload applied"),
                                Err(err) => warn!(error = %err, "hot reload failed, registry left at last good state"),
                            }
                        }
                    }
                }
            }
            drop(watcher);
        })
    }
}

/// The set of `<plans_dir>/<plan>/tasks` directories worth watching,
/// one per plan subdirectory that has a `tasks/` folder.
fn task_dirs(plans_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(plans_dir) else { return Vec::new() };
    entries
        .flatten()
        .map(|e| e.path().join("tasks"))
        .filter(|p| p.is_dir())
        .collect()
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
