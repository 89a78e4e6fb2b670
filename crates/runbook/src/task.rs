// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Task definition format (§6): `meta`, `inputs`, `steps`, optional
//! `returns` and `on_error`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    String,
    Integer,
    Boolean,
    Float,
    List,
    Dict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMeta {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub params: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(rename = "loop", default)]
    pub loop_expr: Option<String>,
    #[serde(default)]
    pub on_error: Vec<StepDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDefinition {
    #[serde(default)]
    pub meta: TaskMeta,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub returns: Option<IndexMap<String, serde_json::Value>>,
    /// State the planner must reach before the engine runs this task's
    /// steps (§4.H step 2). Absent for tasks with no precondition.
    #[serde(default)]
    pub required_state: Option<String>,
}

impl TaskDefinition {
    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
