// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Execution Context (§4.D, §3): the per-run mutable scope threaded
//! through template rendering and step execution. Implements
//! [`aura_runbook::Scope`] so the renderer never needs to know the
//! engine's concrete state shape.

use aura_runbook::{Scope, Value};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StepStatus {
    Running,
    Skipped,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NodeResult {
    pub status: StepStatus,
    pub start_ms: u64,
    pub end_ms: Option<u64>,
    pub output: Option<serde_json::Value>,
}

/// Per-run mutable scope. The root context owns `inputs`/`steps`/`ctx`/
/// `nodes`; child contexts (one per loop iteration) add `item`/`loop.index`
/// and shadow `ctx`, but fall through to their parent for every other
/// namespace (§3 "Child contexts inherit by reference").
pub struct ExecutionContext {
    inputs: HashMap<String, serde_json::Value>,
    steps: RwLock<IndexMap<String, serde_json::Value>>,
    ctx: RwLock<HashMap<String, serde_json::Value>>,
    nodes: RwLock<IndexMap<String, NodeResult>>,
    framework_data: RwLock<HashMap<String, serde_json::Value>>,
    item: Option<serde_json::Value>,
    loop_index: Option<i64>,
    parent: Option<Arc<ExecutionContext>>,
}

impl ExecutionContext {
    pub fn new(inputs: HashMap<String, serde_json::Value>) -> Arc<Self> {
        Arc::new(Self {
            inputs,
            steps: RwLock::new(IndexMap::new()),
            ctx: RwLock::new(HashMap::new()),
            nodes: RwLock::new(IndexMap::new()),
            framework_data: RwLock::new(HashMap::new()),
            item: None,
            loop_index: None,
            parent: None,
        })
    }

    /// Spawns a child context for one `loop` iteration, binding `item`
    /// and `loop.index` (§4.F step 2).
    pub fn child_for_loop(self: &Arc<Self>, item: serde_json::Value, index: i64) -> Arc<Self> {
        Arc::new(Self {
            inputs: HashMap::new(),
            steps: RwLock::new(IndexMap::new()),
            ctx: RwLock::new(HashMap::new()),
            nodes: RwLock::new(IndexMap::new()),
            framework_data: RwLock::new(HashMap::new()),
            item: Some(item),
            loop_index: Some(index),
            parent: Some(self.clone()),
        })
    }

    pub fn set_ctx(&self, name: impl Into<String>, value: serde_json::Value) {
        self.ctx.write().insert(name.into(), value);
    }

    pub fn record_step_output(&self, step_name: impl Into<String>, output: serde_json::Value) {
        self.steps.write().insert(step_name.into(), output);
    }

    pub fn record_node(&self, step_name: impl Into<String>, result: NodeResult) {
        self.nodes.write().insert(step_name.into(), result);
    }

    pub fn nodes_snapshot(&self) -> IndexMap<String, NodeResult> {
        self.nodes.read().clone()
    }

    pub fn steps_snapshot(&self) -> IndexMap<String, serde_json::Value> {
        self.steps.read().clone()
    }

    pub fn set_framework_data(&self, key: impl Into<String>, value: serde_json::Value) {
        self.framework_data.write().insert(key.into(), value);
    }

    fn find_input(&self, name: &str) -> Option<serde_json::Value> {
        self.inputs
            .get(name)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.find_input(name)))
    }

    fn find_step_output(&self, name: &str) -> Option<serde_json::Value> {
        if let Some(v) = self.steps.read().get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.find_step_output(name))
    }

    fn find_ctx(&self, name: &str) -> Option<serde_json::Value> {
        if let Some(v) = self.ctx.read().get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.find_ctx(name))
    }
}

fn navigate(mut current: serde_json::Value, subpath: &[&str]) -> Option<Value> {
    for seg in subpath {
        current = match current {
            serde_json::Value::Object(mut map) => map.remove(*seg)?,
            serde_json::Value::Array(arr) => {
                let idx: usize = seg.parse().ok()?;
                arr.into_iter().nth(idx)?
            }
            _ => return None,
        };
    }
    Some(Value::from(current))
}

impl Scope for ExecutionContext {
    fn resolve(&self, path: &[&str]) -> Option<Value> {
        let (head, rest) = path.split_first()?;
        match *head {
            "inputs" => {
                let (name, sub) = rest.split_first()?;
                navigate(self.find_input(name)?, sub)
            }
            "steps" => {
                let (name, sub) = rest.split_first()?;
                let (marker, sub) = sub.split_first()?;
                if *marker != "output" {
                    return None;
                }
                navigate(self.find_step_output(name)?, sub)
            }
            "ctx" => {
                let (name, sub) = rest.split_first()?;
                navigate(self.find_ctx(name)?, sub)
            }
            "item" => navigate(self.item.clone()?, rest),
            "loop" => {
                if rest == ["index"] {
                    self.loop_index.map(Value::Int)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
