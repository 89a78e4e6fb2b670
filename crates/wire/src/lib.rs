// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! DTO contracts for the external HTTP/WebSocket/CLI surface (§6). No
//! transport is implemented here — a collaborator binds these shapes to
//! whatever server framework it likes.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use aura_core::{Event, RunId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTaskRequest {
    pub plan_name: String,
    pub task_name: String,
    #[serde(default)]
    pub inputs: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunTaskResponse {
    Success { cid: String },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRunRequest {
    pub runs: Vec<RunTaskRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRunResponse {
    pub results: Vec<RunTaskResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub cid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPriorityRequest {
    pub cid: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRunEntry {
    pub cid: String,
    pub plan: String,
    pub task: String,
    pub status: TaskStatus,
    pub start_time_ms: Option<u64>,
}

impl ActiveRunEntry {
    pub fn from_tasklet(t: &aura_core::Tasklet) -> Self {
        Self {
            cid: t.run_id.to_string(),
            plan: t.plan.clone(),
            task: t.task.clone(),
            status: t.status,
            start_time_ms: t.start_time_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueOverview {
    pub main_ready: usize,
    pub event_ready: usize,
    pub interrupt_ready: usize,
    pub running: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Ready,
    Delayed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueListQuery {
    pub state: QueueState,
    #[serde(default = "default_queue_list_limit")]
    pub limit: usize,
}

fn default_queue_list_limit() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEventEnvelope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub payload: Event,
}

impl WsEventEnvelope {
    pub fn new(event: Event) -> Self {
        Self { kind: "event", payload: event }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsLogEnvelope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub level: String,
    pub message: String,
    pub timestamp_ms: u64,
}

impl WsLogEnvelope {
    pub fn new(level: impl Into<String>, message: impl Into<String>, timestamp_ms: u64) -> Self {
        Self { kind: "log", level: level.into(), message: message.into(), timestamp_ms }
    }
}

/// The Task Final Result carried by `task.finished` (§4.G step 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFinalResult {
    pub run_id: RunId,
    pub plan: String,
    pub task: String,
    pub status: TfrStatus,
    #[serde(default)]
    pub user_data: serde_json::Value,
    pub error_info: Option<String>,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub duration_ms: u64,
    pub node_results: Vec<NodeResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TfrStatus {
    Success,
    Failed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub name: String,
    pub status: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub output: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_task_response_serializes_success_with_status_tag() {
        let resp = RunTaskResponse::Success { cid: "hello/say_hello:1".into() };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["cid"], "hello/say_hello:1");
    }

    #[test]
    fn run_task_response_serializes_error_with_message() {
        let resp = RunTaskResponse::Error { message: "unknown task".into() };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["message"], "unknown task");
    }

    #[test]
    fn queue_list_query_defaults_limit() {
        let v: QueueListQuery = serde_json::from_str(r#"{"state":"ready"}"#).unwrap();
        assert_eq!(v.limit, 100);
        assert_eq!(v.state, QueueState::Ready);
    }

    #[test]
    fn ws_event_envelope_tags_type_as_event() {
        let env = WsEventEnvelope::new(Event::new("task.started", serde_json::json!({}), 0));
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["type"], "event");
    }
}
