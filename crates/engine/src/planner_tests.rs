// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

use super::*;
use aura_core::{State, Transition};
use parking_lot::Mutex;
use std::collections::HashMap;

fn state(check_task: Option<&str>, priority: Option<i32>, can_async: bool) -> State {
    State { check_task: check_task.map(str::to_string), priority, can_async }
}

fn diamond_map() -> StateMap {
    let mut states = HashMap::new();
    states.insert("a".to_string(), state(Some("check_a"), None, false));
    states.insert("b".to_string(), state(Some("check_b"), None, false));
    states.insert("c".to_string(), state(Some("check_c"), None, false));
    StateMap {
        states,
        transitions: vec![
            Transition { from: "a".into(), to: "b".into(), task: "t_ab".into(), cost: 1 },
            Transition { from: "b".into(), to: "c".into(), task: "t_bc".into(), cost: 1 },
            Transition { from: "a".into(), to: "c".into(), task: "t_ac".into(), cost: 5 },
        ],
    }
}

#[test]
fn plan_is_empty_for_the_current_state() {
    let map = diamond_map();
    assert!(plan(&map, "a", "a").unwrap().is_empty());
}

#[test]
fn plan_prefers_lower_total_cost_over_fewer_hops() {
    let map = diamond_map();
    let path = plan(&map, "a", "c").unwrap();
    assert_eq!(path, vec!["t_ab".to_string(), "t_bc".to_string()]);
}

#[test]
fn plan_errors_when_target_is_unreachable() {
    let mut map = diamond_map();
    map.transitions.retain(|t| t.task != "t_ac");
    map.states.remove("c");
    assert!(plan(&map, "a", "nowhere").is_err());
}

#[test]
fn plan_rejects_an_unknown_current_state() {
    let map = diamond_map();
    assert!(plan(&map, UNKNOWN_STATE, "c").is_err());
}

#[test]
fn plan_breaks_equal_cost_ties_by_transition_task_id() {
    let mut states = HashMap::new();
    states.insert("a".to_string(), state(None, None, false));
    states.insert("b".to_string(), state(None, None, false));
    let map = StateMap {
        states,
        transitions: vec![
            Transition { from: "a".into(), to: "b".into(), task: "z_path".into(), cost: 1 },
            Transition { from: "a".into(), to: "b".into(), task: "a_path".into(), cost: 1 },
        ],
    };
    let path = plan(&map, "a", "b").unwrap();
    assert_eq!(path, vec!["a_path".to_string()]);
}

struct FakeOracle {
    map: StateMap,
    actual: Mutex<String>,
    transition_effective: bool,
}

impl FakeOracle {
    fn new(map: StateMap, start: &str, transition_effective: bool) -> Self {
        Self { map, actual: Mutex::new(start.to_string()), transition_effective }
    }
}

#[async_trait::async_trait]
impl StateOracle for FakeOracle {
    async fn check(&self, task_id: &str) -> Result<bool, AuraError> {
        let current = self.actual.lock().clone();
        let owner = self.map.states.iter().find(|(_, s)| s.check_task.as_deref() == Some(task_id));
        Ok(owner.map(|(name, _)| *name == current).unwrap_or(false))
    }

    async fn transition(&self, task_id: &str) -> Result<(), AuraError> {
        if !self.transition_effective {
            return Ok(());
        }
        if let Some(t) = self.map.transitions.iter().find(|t| t.task == task_id) {
            *self.actual.lock() = t.to.clone();
        }
        Ok(())
    }
}

#[tokio::test]
async fn determine_current_state_finds_the_matching_check() {
    let map = diamond_map();
    let oracle = Arc::new(FakeOracle::new(map.clone(), "b", true));
    let (state, dist) = determine_current_state(&map, "c", oracle).await.unwrap();
    assert_eq!(state, "b");
    assert_eq!(dist, 1);
}

#[tokio::test]
async fn determine_current_state_returns_unknown_when_nothing_matches() {
    let map = diamond_map();
    let oracle = Arc::new(FakeOracle::new(map.clone(), "nowhere", true));
    let (state, dist) = determine_current_state(&map, "c", oracle).await.unwrap();
    assert_eq!(state, UNKNOWN_STATE);
    assert_eq!(dist, u32::MAX);
}

#[tokio::test]
async fn determine_current_state_reports_the_bfs_hop_distance() {
    let map = diamond_map();
    let oracle = Arc::new(FakeOracle::new(map.clone(), "a", true));
    let (state, dist) = determine_current_state(&map, "c", oracle).await.unwrap();
    assert_eq!(state, "a");
    assert_eq!(dist, 2);
}

#[tokio::test]
async fn determine_current_state_runs_async_checks_concurrently() {
    let mut states = HashMap::new();
    states.insert("a".to_string(), state(Some("check_a"), None, true));
    states.insert("b".to_string(), state(Some("check_b"), None, true));
    let map = StateMap {
        states,
        transitions: vec![Transition { from: "a".into(), to: "b".into(), task: "t_ab".into(), cost: 1 }],
    };
    let oracle = Arc::new(FakeOracle::new(map.clone(), "b", true));
    let (state, _) = determine_current_state(&map, "b", oracle).await.unwrap();
    assert_eq!(state, "b");
}

#[tokio::test]
async fn execute_plan_drives_transitions_to_the_target() {
    let map = diamond_map();
    let oracle = Arc::new(FakeOracle::new(map.clone(), "a", true));
    execute_plan(&map, "c", oracle.clone(), 1, 2).await.unwrap();
    assert_eq!(*oracle.actual.lock(), "c");
}

#[tokio::test]
async fn execute_plan_fails_after_exhausting_replans_when_verification_never_succeeds() {
    let map = diamond_map();
    // transitions never actually move the oracle's state, so verification
    // fails every time and re-planning never converges.
    let oracle = Arc::new(FakeOracle::new(map.clone(), "a", false));
    let err = execute_plan(&map, "c", oracle, 0, 1).await.unwrap_err();
    assert!(matches!(err, AuraError::PlanningFailed(_)));
}

#[tokio::test]
async fn execute_plan_is_a_no_op_when_already_at_target() {
    let map = diamond_map();
    let oracle = Arc::new(FakeOracle::new(map.clone(), "c", true));
    execute_plan(&map, "c", oracle, 1, 1).await.unwrap();
}

#[tokio::test]
async fn execute_plan_accepts_a_target_state_with_no_check_task() {
    let mut states = HashMap::new();
    states.insert("a".to_string(), state(Some("check_a"), None, false));
    states.insert("b".to_string(), state(None, None, false));
    let map = StateMap {
        states,
        transitions: vec![Transition { from: "a".into(), to: "b".into(), task: "t_ab".into(), cost: 1 }],
    };
    let oracle = Arc::new(FakeOracle::new(map.clone(), "a", true));
    execute_plan(&map, "b", oracle.clone(), 0, 0).await.unwrap();
    assert_eq!(*oracle.actual.lock(), "b");
}
