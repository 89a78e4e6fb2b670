// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! The per-plan state-transition graph consumed by the state planner.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct State {
    pub check_task: Option<String>,
    pub priority: Option<i32>,
    #[serde(default)]
    pub can_async: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub task: String,
    pub cost: u32,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StateMap {
    pub states: HashMap<String, State>,
    pub transitions: Vec<Transition>,
}

impl StateMap {
    /// All states declaring a check task, for use by
    /// `determine_current_state`.
    pub fn checkable_states(&self) -> impl Iterator<Item = (&str, &State)> {
        self.states
            .iter()
            .filter(|(_, s)| s.check_task.is_some())
            .map(|(name, s)| (name.as_str(), s))
    }
}
