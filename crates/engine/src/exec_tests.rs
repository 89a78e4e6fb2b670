// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

use super::*;
use aura_core::FakeClock;
use aura_plugins::registry::ActionEntry;
use aura_plugins::AnyService;
use aura_runbook::TaskMeta;
use std::collections::HashMap as StdHashMap;

struct EchoAction;

#[async_trait::async_trait]
impl Action for EchoAction {
    async fn invoke(
        &self,
        params: IndexMap<String, serde_json::Value>,
        _services: &ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        Ok(serde_json::to_value(params).unwrap())
    }
}

struct AlwaysFailAction;

#[async_trait::async_trait]
impl Action for AlwaysFailAction {
    async fn invoke(
        &self,
        _params: IndexMap<String, serde_json::Value>,
        _services: &ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        Err(AuraError::ActionError("boom".into()))
    }
}

struct SlowAction;

#[async_trait::async_trait]
impl Action for SlowAction {
    async fn invoke(
        &self,
        _params: IndexMap<String, serde_json::Value>,
        _services: &ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(serde_json::Value::Null)
    }
}

struct UsesServiceAction;

#[async_trait::async_trait]
impl Action for UsesServiceAction {
    async fn invoke(
        &self,
        _params: IndexMap<String, serde_json::Value>,
        services: &ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        let counter = services.get::<u32>("counter").expect("counter service injected");
        Ok(serde_json::json!(*counter))
    }
}

fn registry_with_basics() -> Arc<Registry> {
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
        fqid: "test.fail".to_string(),
        owner_plugin: "test/plugin".to_string(),
        read_only: true,
        public: true,
        cpu_bound: false,
        requires_services: StdHashMap::new(),
        callable: Arc::new(AlwaysFailAction),
    });
    registry.register_action(ActionEntry {
        fqid: "test.slow".to_string(),
        owner_plugin: "test/plugin".to_string(),
        read_only: true,
        public: true,
        cpu_bound: false,
        requires_services: StdHashMap::new(),
        callable: Arc::new(SlowAction),
    });
    registry
}

fn engine(registry: Arc<Registry>) -> Engine<FakeClock> {
    Engine::new(registry, Arc::new(InlineActionRunner), FakeClock::new())
}

fn step(name: &str, action: &str) -> StepDefinition {
    StepDefinition {
        name: name.to_string(),
        action: action.to_string(),
        params: IndexMap::new(),
        when: None,
        loop_expr: None,
        on_error: Vec::new(),
    }
}

#[tokio::test]
async fn runs_a_single_action_step() {
    let registry = registry_with_basics();
    let eng = engine(registry);
    let ctx = ExecutionContext::new(StdHashMap::new());
    eng.run_step(&step("greet", "test.echo"), &ctx, None, &NoopCallbacks).await.unwrap();
    assert_eq!(ctx.steps_snapshot().get("greet"), Some(&serde_json::json!({})));
}

#[tokio::test]
async fn when_false_skips_the_step() {
    let registry = registry_with_basics();
    let eng = engine(registry);
    let ctx = ExecutionContext::new(StdHashMap::new());
    let mut s = step("maybe", "test.echo");
    s.when = Some("{{ false }}".to_string());
    eng.run_step(&s, &ctx, None, &NoopCallbacks).await.unwrap();

    let nodes = ctx.nodes_snapshot();
    assert_eq!(nodes["maybe"].status, StepStatus::Skipped);
    assert!(!ctx.steps_snapshot().contains_key("maybe"));
}

#[tokio::test]
async fn unknown_action_is_an_error() {
    let registry = registry_with_basics();
    let eng = engine(registry);
    let ctx = ExecutionContext::new(StdHashMap::new());
    let err = eng.run_step(&step("x", "nope.missing"), &ctx, None, &NoopCallbacks).await.unwrap_err();
    assert!(matches!(err, AuraError::ActionError(_)));
}

#[tokio::test]
async fn params_are_rendered_before_invocation() {
    let registry = registry_with_basics();
    let eng = engine(registry);
    let mut inputs = StdHashMap::new();
    inputs.insert("name".to_string(), serde_json::json!("Ada"));
    let ctx = ExecutionContext::new(inputs);

    let mut s = step("greet", "test.echo");
    s.params.insert("message".to_string(), serde_json::json!("Hello, {{ inputs.name }}!"));
    eng.run_step(&s, &ctx, None, &NoopCallbacks).await.unwrap();

    let output = ctx.steps_snapshot()["greet"].clone();
    assert_eq!(output["message"], serde_json::json!("Hello, Ada!"));
}

#[tokio::test]
async fn on_error_runs_recovery_and_the_step_does_not_propagate() {
    let registry = registry_with_basics();
    let eng = engine(registry);
    let ctx = ExecutionContext::new(StdHashMap::new());

    let mut s = step("risky", "test.fail");
    s.on_error.push(step("cleanup", "test.echo"));

    eng.run_step(&s, &ctx, None, &NoopCallbacks).await.unwrap();

    let nodes = ctx.nodes_snapshot();
    assert_eq!(nodes["risky"].status, StepStatus::Succeeded);
    assert_eq!(nodes["cleanup"].status, StepStatus::Succeeded);
}

#[tokio::test]
async fn failure_without_on_error_propagates() {
    let registry = registry_with_basics();
    let eng = engine(registry);
    let ctx = ExecutionContext::new(StdHashMap::new());
    let err = eng.run_step(&step("risky", "test.fail"), &ctx, None, &NoopCallbacks).await.unwrap_err();
    assert!(matches!(err, AuraError::ActionError(_)));
}

#[tokio::test]
async fn loop_runs_the_body_once_per_item_and_collects_outputs() {
    let registry = registry_with_basics();
    let eng = engine(registry);
    let mut inputs = StdHashMap::new();
    inputs.insert("items".to_string(), serde_json::json!(["a", "b", "c"]));
    let ctx = ExecutionContext::new(inputs);

    let mut s = step("visit", "test.echo");
    s.loop_expr = Some("{{ inputs.items }}".to_string());
    s.params.insert("item".to_string(), serde_json::json!("{{ item }}"));

    eng.run_step(&s, &ctx, None, &NoopCallbacks).await.unwrap();

    let output = ctx.steps_snapshot()["visit"].clone();
    let items: Vec<_> = output.as_array().unwrap().iter().map(|v| v["item"].clone()).collect();
    assert_eq!(items, vec![serde_json::json!("a"), serde_json::json!("b"), serde_json::json!("c")]);
}

#[tokio::test]
async fn loop_over_non_list_expression_is_an_error() {
    let registry = registry_with_basics();
    let eng = engine(registry);
    let mut inputs = StdHashMap::new();
    inputs.insert("items".to_string(), serde_json::json!("not-a-list"));
    let ctx = ExecutionContext::new(inputs);

    let mut s = step("visit", "test.echo");
    s.loop_expr = Some("{{ inputs.items }}".to_string());
    assert!(eng.run_step(&s, &ctx, None, &NoopCallbacks).await.is_err());
}

#[tokio::test]
async fn deadline_exceeded_returns_timeout() {
    let registry = Arc::new(Registry::new());
    registry.register_action(ActionEntry {
        fqid: "test.slow".to_string(),
        owner_plugin: "test/plugin".to_string(),
        read_only: true,
        public: true,
        cpu_bound: false,
        requires_services: StdHashMap::new(),
        callable: Arc::new(SlowAction),
    });
    let eng = engine(registry);
    let ctx = ExecutionContext::new(StdHashMap::new());
    let deadline = Instant::now() + Duration::from_millis(10);
    let err = eng.run_step(&step("slow", "test.slow"), &ctx, Some(deadline), &NoopCallbacks).await.unwrap_err();
    assert!(matches!(err, AuraError::Timeout));
}

#[tokio::test]
async fn services_declared_on_an_action_are_resolved_and_injected() {
    let registry = Arc::new(Registry::new());
    registry.register_service(
        "counter".to_string(),
        "test/plugin".to_string(),
        Arc::new(|_: &Registry| Box::pin(async move { Ok(Arc::new(7u32) as AnyService) })
            as Pin<Box<dyn Future<Output = Result<AnyService, AuraError>> + Send>>),
    );
    let mut requires = StdHashMap::new();
    requires.insert("counter".to_string(), "counter".to_string());
    registry.register_action(ActionEntry {
        fqid: "test.uses_service".to_string(),
        owner_plugin: "test/plugin".to_string(),
        read_only: true,
        public: true,
        cpu_bound: false,
        requires_services: requires,
        callable: Arc::new(UsesServiceAction),
    });

    let eng = engine(registry);
    let ctx = ExecutionContext::new(StdHashMap::new());
    eng.run_step(&step("use_it", "test.uses_service"), &ctx, None, &NoopCallbacks).await.unwrap();
    assert_eq!(ctx.steps_snapshot()["use_it"], serde_json::json!(7));
}

#[tokio::test]
async fn run_task_executes_every_step_in_order() {
    let registry = registry_with_basics();
    let eng = engine(registry);
    let ctx = ExecutionContext::new(StdHashMap::new());
    let task = TaskDefinition {
        meta: TaskMeta::default(),
        inputs: Vec::new(),
        steps: vec![step("a", "test.echo"), step("b", "test.echo")],
        returns: None,
        required_state: None,
    };
    eng.run_task(&task, &ctx, None, &NoopCallbacks).await.unwrap();
    let nodes = ctx.nodes_snapshot();
    assert_eq!(nodes.len(), 2);
}
