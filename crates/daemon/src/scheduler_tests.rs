// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

use super::*;
use aura_core::FakeClock;
use aura_engine::{Engine, InlineActionRunner};
use aura_plugins::action::ServiceBag;
use aura_plugins::registry::ActionEntry;
use aura_runbook::TaskLoader;
use indexmap::IndexMap;
use std::collections::HashMap as StdHashMap;
use std::time::Duration as StdDuration;
use tempfile::TempDir;

struct EchoAction;

#[async_trait::async_trait]
impl aura_plugins::Action for EchoAction {
    async fn invoke(
        &self,
        params: IndexMap<String, serde_json::Value>,
        _services: &ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        Ok(serde_json::to_value(params).unwrap())
    }
}

struct ReturnsTrue;

#[async_trait::async_trait]
impl aura_plugins::Action for ReturnsTrue {
    async fn invoke(
        &self,
        _params: IndexMap<String, serde_json::Value>,
        _services: &ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        Ok(serde_json::json!(true))
    }
}

fn registry() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    registry.register_action(ActionEntry {
        fqid: "test.echo".to_string(),
        owner_plugin: "test/plugin".to_string(),
        read_only: true,
        public: true,
        cpu_bound: false,
        requires_services: StdHashMap::new(),
        callable: Arc::new(EchoAction),
    });
    registry.register_action(ActionEntry {
        fqid: "test.truthy".to_string(),
        owner_plugin: "test/plugin".to_string(),
        read_only: true,
        public: true,
        cpu_bound: false,
        requires_services: StdHashMap::new(),
        callable: Arc::new(ReturnsTrue),
    });
    registry
}

fn write_task(dir: &TempDir, plan: &str, task: &str, yaml: &str) {
    let path = dir.path().join(plan).join("tasks");
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join(format!("{task}.yaml")), yaml).unwrap();
}

fn scheduler_with_plan(
    dir: &TempDir,
    plan: &str,
    registry: Arc<Registry>,
    event_bus: Arc<EventBus>,
) -> Arc<Scheduler<FakeClock>> {
    let plan_root = dir.path().join(plan);
    std::fs::create_dir_all(&plan_root).unwrap();
    let loader = Arc::new(TaskLoader::new(dir.path()));
    let engine = Arc::new(Engine::new(registry.clone(), Arc::new(InlineActionRunner), FakeClock::new()));
    let orchestrator = Arc::new(Orchestrator::new(
        plan,
        plan_root,
        loader,
        registry.clone(),
        engine,
        event_bus.clone(),
        FakeClock::new(),
    ));
    let scheduler =
        Arc::new(Scheduler::new(SchedulerConfig::default(), registry, event_bus, FakeClock::new()));
    scheduler.register_plan(plan, orchestrator);
    scheduler
}

#[tokio::test]
async fn run_ad_hoc_task_rejects_an_unknown_plan() {
    let dir = TempDir::new().unwrap();
    let scheduler = scheduler_with_plan(&dir, "demo", registry(), Arc::new(EventBus::new()));
    let err = scheduler.run_ad_hoc_task("nope", "greet", StdHashMap::new()).await.unwrap_err();
    assert!(matches!(err, AuraError::ValidationError(_)));
}

#[tokio::test]
async fn run_ad_hoc_task_enqueues_on_the_main_queue_and_returns_immediately() {
    let dir = TempDir::new().unwrap();
    write_task(&dir, "demo", "greet", "steps:\n  - name: say\n    action: test.echo\n");
    let scheduler = scheduler_with_plan(&dir, "demo", registry(), Arc::new(EventBus::new()));

    let run_id = scheduler.run_ad_hoc_task("demo", "greet", StdHashMap::new()).await.unwrap();
    assert!(!run_id.is_empty());
    assert_eq!(scheduler.queue_overview().main_ready, 1);
}

#[tokio::test]
async fn cancel_sets_the_cancellation_token_of_a_still_queued_tasklet() {
    let dir = TempDir::new().unwrap();
    write_task(&dir, "demo", "greet", "steps:\n  - name: say\n    action: test.echo\n");
    let scheduler = scheduler_with_plan(&dir, "demo", registry(), Arc::new(EventBus::new()));

    let run_id = scheduler.run_ad_hoc_task("demo", "greet", StdHashMap::new()).await.unwrap();
    assert!(scheduler.cancel(&run_id));
    assert!(!scheduler.cancel("nonexistent/run:0"));
}

#[tokio::test]
async fn set_priority_reports_whether_the_run_id_was_found() {
    let dir = TempDir::new().unwrap();
    write_task(&dir, "demo", "greet", "steps:\n  - name: say\n    action: test.echo\n");
    let scheduler = scheduler_with_plan(&dir, "demo", registry(), Arc::new(EventBus::new()));

    let run_id = scheduler.run_ad_hoc_task("demo", "greet", StdHashMap::new()).await.unwrap();
    assert!(scheduler.set_priority(&run_id, -5));
    assert!(!scheduler.set_priority("nonexistent/run:0", -5));
}

#[tokio::test]
async fn start_scheduler_drains_a_queued_task_to_a_published_finish_event() {
    let dir = TempDir::new().unwrap();
    write_task(&dir, "demo", "greet", "steps:\n  - name: say\n    action: test.echo\n");
    let bus = Arc::new(EventBus::new());
    let scheduler = scheduler_with_plan(&dir, "demo", registry(), bus.clone());

    let seen = Arc::new(parking_lot::Mutex::new(false));
    let seen_clone = seen.clone();
    bus.subscribe(
        "*",
        "task.finished",
        "test",
        false,
        Arc::new(move |_e| {
            let seen = seen_clone.clone();
            Box::pin(async move { *seen.lock() = true })
        }),
    )
    .unwrap();

    scheduler.run_ad_hoc_task("demo", "greet", StdHashMap::new()).await.unwrap();
    let handles = scheduler.start_scheduler();

    for _ in 0..50 {
        if *seen.lock() {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    assert!(*seen.lock(), "expected task.finished to be published");

    scheduler.stop_scheduler();
    for h in handles {
        let _ = tokio::time::timeout(StdDuration::from_secs(1), h).await;
    }
    assert!(scheduler.active_runs().is_empty());
}

fn noop_plugins() -> Vec<Arc<dyn aura_plugins::loader::LoadedPlugin>> {
    Vec::new()
}

#[test]
fn watch_paths_includes_task_directories_once_task_reload_is_enabled() {
    let dir = TempDir::new().unwrap();
    write_task(&dir, "demo", "greet", "steps:\n  - name: say\n    action: test.echo\n");
    let registry = registry();
    let bus = Arc::new(EventBus::new());
    let loader = Arc::new(aura_runbook::TaskLoader::new(dir.path()));
    let supervisor = HotReloadSupervisor::new(Vec::new(), registry, noop_plugins(), StdDuration::from_millis(10), FakeClock::new())
        .with_task_reload(dir.path().to_path_buf(), loader, bus);

    let paths = supervisor.watch_paths();
    assert!(paths.contains(&dir.path().join("demo").join("tasks")));
}

#[test]
fn watch_paths_omits_task_directories_when_task_reload_is_disabled() {
    let registry = registry();
    let supervisor =
        HotReloadSupervisor::new(Vec::new(), registry, noop_plugins(), StdDuration::from_millis(10), FakeClock::new());
    assert!(supervisor.watch_paths().is_empty());
}

#[tokio::test]
async fn a_task_file_change_invalidates_only_that_task_and_publishes_task_reloaded() {
    let dir = TempDir::new().unwrap();
    write_task(&dir, "demo", "greet", "steps:\n  - name: say\n    action: test.echo\n");
    let registry = registry();
    let bus = Arc::new(EventBus::new());
    let loader = Arc::new(aura_runbook::TaskLoader::new(dir.path()));

    // Prime the cache.
    loader.get_task_data("demo", "greet").unwrap();

    let supervisor = Arc::new(
        HotReloadSupervisor::new(Vec::new(), registry, noop_plugins(), StdDuration::from_millis(10), FakeClock::new())
            .with_task_reload(dir.path().to_path_buf(), loader.clone(), bus.clone()),
    );

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    bus.subscribe(
        "*",
        "task.reloaded",
        "test",
        false,
        Arc::new(move |e| {
            let seen = seen_clone.clone();
            Box::pin(async move { seen.lock().push(e.payload) })
        }),
    )
    .unwrap();

    supervisor.reload_task("demo", "greet").await;

    assert_eq!(seen.lock().len(), 1);
    assert_eq!(seen.lock()[0]["plan"], serde_json::json!("demo"));
    assert_eq!(seen.lock()[0]["task"], serde_json::json!("greet"));
}

#[test]
fn task_for_path_recognizes_a_watched_task_file() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let bus = Arc::new(EventBus::new());
    let loader = Arc::new(aura_runbook::TaskLoader::new(dir.path()));
    let supervisor = HotReloadSupervisor::new(Vec::new(), registry, noop_plugins(), StdDuration::from_millis(10), FakeClock::new())
        .with_task_reload(dir.path().to_path_buf(), loader, bus);

    let path = dir.path().join("demo").join("tasks").join("greet.yaml");
    assert_eq!(supervisor.task_for_path(&path), Some(("demo".to_string(), "greet".to_string())));

    let unrelated = dir.path().join("demo").join("plugin.toml");
    assert_eq!(supervisor.task_for_path(&unrelated), None);
}

struct RecordAndSleep {
    log: Arc<parking_lot::Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl aura_plugins::Action for RecordAndSleep {
    async fn invoke(
        &self,
        params: IndexMap<String, serde_json::Value>,
        _services: &ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        let ms = params.get("ms").and_then(|v| v.as_u64()).unwrap_or(0);
        tokio::time::sleep(StdDuration::from_millis(ms)).await;
        let tag = params.get("tag").and_then(|v| v.as_str()).unwrap_or("").to_string();
        self.log.lock().push(tag);
        Ok(serde_json::Value::Null)
    }
}

/// Covers the "hot reload mid-flight" end-to-end scenario: a task
/// admitted before its file changes runs to completion against the
/// step list it started with, and only a later enqueue of the same
/// (plan, task) observes the new definition, with `task.reloaded`
/// published in between.
#[tokio::test]
async fn a_task_running_when_its_file_is_overwritten_finishes_on_the_pre_reload_definition() {
    let dir = TempDir::new().unwrap();
    write_task(
        &dir,
        "demo",
        "slow",
        "steps:\n  - name: s\n    action: test.record\n    params:\n      tag: old\n      ms: 200\n",
    );
    let registry = registry();
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    registry.register_action(ActionEntry {
        fqid: "test.record".to_string(),
        owner_plugin: "test/plugin".to_string(),
        read_only: true,
        public: true,
        cpu_bound: false,
        requires_services: StdHashMap::new(),
        callable: Arc::new(RecordAndSleep { log: log.clone() }),
    });
    let bus = Arc::new(EventBus::new());
    let scheduler = scheduler_with_plan(&dir, "demo", registry.clone(), bus.clone());
    let loader = Arc::new(TaskLoader::new(dir.path()));
    loader.get_task_data("demo", "slow").unwrap();
    let supervisor = Arc::new(
        HotReloadSupervisor::new(Vec::new(), registry, noop_plugins(), StdDuration::from_millis(10), FakeClock::new())
            .with_task_reload(dir.path().to_path_buf(), loader.clone(), bus.clone()),
    );

    let reloaded = Arc::new(parking_lot::Mutex::new(false));
    let reloaded_clone = reloaded.clone();
    bus.subscribe(
        "*",
        "task.reloaded",
        "test",
        false,
        Arc::new(move |_e| {
            let reloaded = reloaded_clone.clone();
            Box::pin(async move { *reloaded.lock() = true })
        }),
    )
    .unwrap();

    scheduler.run_ad_hoc_task("demo", "slow", StdHashMap::new()).await.unwrap();
    let handles = scheduler.start_scheduler();

    tokio::time::sleep(StdDuration::from_millis(50)).await;
    write_task(
        &dir,
        "demo",
        "slow",
        "steps:\n  - name: s\n    action: test.record\n    params:\n      tag: new\n      ms: 10\n",
    );
    supervisor.reload_task("demo", "slow").await;
    assert!(*reloaded.lock(), "expected task.reloaded to have been published");

    for _ in 0..50 {
        if log.lock().len() == 1 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    assert_eq!(log.lock().as_slice(), ["old"], "in-flight run must finish on its pre-reload step list");

    scheduler.run_ad_hoc_task("demo", "slow", StdHashMap::new()).await.unwrap();
    for _ in 0..50 {
        if log.lock().len() == 2 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    assert_eq!(log.lock().as_slice(), ["old", "new"], "a later enqueue must observe the new definition");

    scheduler.stop_scheduler();
    for h in handles {
        let _ = tokio::time::timeout(StdDuration::from_secs(1), h).await;
    }
}

#[tokio::test]
async fn interrupt_rule_cancels_running_tasks_and_enqueues_its_handler() {
    let dir = TempDir::new().unwrap();
    write_task(&dir, "demo", "handler", "steps:\n  - name: h\n    action: test.echo\n");
    let scheduler = scheduler_with_plan(&dir, "demo", registry(), Arc::new(EventBus::new()));

    scheduler.register_interrupt_rule(InterruptRule {
        condition: ConditionDefinition { action: "test.truthy".to_string(), params: IndexMap::new() },
        handler_plan: "demo".to_string(),
        handler_task: "handler".to_string(),
        scope: RuleScope::AllTasks,
    });

    scheduler.evaluate_interrupt_rules_once().await;
    assert_eq!(scheduler.queue_overview().interrupt_ready, 1);
}
