// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! State Planner (§4.E): determine the current state by running check
//! tasks in priority order, then plan the minimum-cost transition path
//! to a target state via Dijkstra.

use aura_core::{AuraError, State, StateMap};
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::cmp::Reverse;
use std::sync::Arc;

/// Sentinel returned by [`determine_current_state`] when no check task
/// reports truthy.
pub const UNKNOWN_STATE: &str = "__unknown__";

/// Runs the task side-effects the planner needs: evaluating a state's
/// check task, and invoking a transition task. Implemented by the
/// Orchestrator, which is the only thing that knows how to run a task
/// end to end.
#[async_trait::async_trait]
pub trait StateOracle: Send + Sync {
    async fn check(&self, task_id: &str) -> Result<bool, AuraError>;
    async fn transition(&self, task_id: &str) -> Result<(), AuraError>;
}

/// BFS hop-distances to `target` over the reverse transition graph,
/// then a priority-ordered check pass: `can_async` checks launch
/// concurrently and the highest-priority truthy result wins (ties in
/// the async phase are broken the same deterministic way as the
/// sequential phase, rather than by raw completion order, so a given
/// StateMap + oracle always resolves to the same current state); any
/// remaining checks run in order, first truthy wins.
pub async fn determine_current_state(
    map: &StateMap,
    target: &str,
    oracle: Arc<dyn StateOracle>,
) -> Result<(String, u32), AuraError> {
    let dist = reverse_bfs_distances(map, target);

    let mut checklist: Vec<(String, State)> =
        map.checkable_states().map(|(n, s)| (n.to_string(), s.clone())).collect();
    checklist.sort_by(|(name_a, state_a), (name_b, state_b)| {
        let da = dist.get(name_a).copied().unwrap_or(u32::MAX);
        let db = dist.get(name_b).copied().unwrap_or(u32::MAX);
        da.cmp(&db)
            .then_with(|| state_a.priority.unwrap_or(i32::MAX).cmp(&state_b.priority.unwrap_or(i32::MAX)))
            .then_with(|| name_a.cmp(name_b))
    });

    let (async_checks, sync_checks): (Vec<_>, Vec<_>) =
        checklist.into_iter().partition(|(_, s)| s.can_async);

    if let Some(name) = run_async_checks(&async_checks, &oracle).await? {
        let d = dist.get(&name).copied().unwrap_or(u32::MAX);
        return Ok((name, d));
    }

    for (name, state) in &sync_checks {
        let task = state.check_task.clone().expect("checkable_states guarantees Some");
        if oracle.check(&task).await? {
            let d = dist.get(name).copied().unwrap_or(u32::MAX);
            return Ok((name.clone(), d));
        }
    }

    Ok((UNKNOWN_STATE.to_string(), u32::MAX))
}

async fn run_async_checks(
    checks: &[(String, State)],
    oracle: &Arc<dyn StateOracle>,
) -> Result<Option<String>, AuraError> {
    if checks.is_empty() {
        return Ok(None);
    }
    let mut handles = Vec::with_capacity(checks.len());
    for (name, state) in checks {
        let name = name.clone();
        let task = state.check_task.clone().expect("checkable_states guarantees Some");
        let oracle = oracle.clone();
        handles.push((name, tokio::spawn(async move { oracle.check(&task).await })));
    }

    let mut iter = handles.into_iter();
    let mut winner = None;
    for (name, handle) in iter.by_ref() {
        match handle.await {
            Ok(Ok(true)) => {
                winner = Some(name);
                break;
            }
            Ok(Ok(false)) | Ok(Err(_)) => {}
            Err(join_err) => {
                return Err(AuraError::internal(format!("state check '{name}' panicked: {join_err}")))
            }
        }
    }
    for (_, handle) in iter {
        handle.abort();
    }
    Ok(winner)
}

fn reverse_bfs_distances(map: &StateMap, target: &str) -> HashMap<String, u32> {
    let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
    for t in &map.transitions {
        reverse.entry(t.to.as_str()).or_default().push(t.from.as_str());
    }

    let mut dist = HashMap::new();
    dist.insert(target.to_string(), 0u32);
    let mut queue = VecDeque::from([target.to_string()]);
    while let Some(state) = queue.pop_front() {
        let d = dist[&state];
        if let Some(preds) = reverse.get(state.as_str()) {
            let mut preds = preds.clone();
            preds.sort_unstable();
            for p in preds {
                if !dist.contains_key(p) {
                    dist.insert(p.to_string(), d + 1);
                    queue.push_back(p.to_string());
                }
            }
        }
    }
    dist
}

#[derive(Clone)]
struct Best {
    cost: u64,
    hops: u32,
    via: Option<(String, String)>,
}

/// Dijkstra over the forward transition graph, minimizing total cost.
/// Ties are broken first by hop count, then by the lexicographically
/// smallest transition task id considered at each relaxation (edges
/// out of a state are walked in sorted task-id order and only a
/// strictly better `(cost, hops)` replaces the current best, so the
/// first-seen transition at a tie wins).
pub fn plan(map: &StateMap, current: &str, target: &str) -> Result<Vec<String>, AuraError> {
    if current == target {
        return Ok(Vec::new());
    }
    if current == UNKNOWN_STATE {
        return Err(AuraError::PlanningFailed("current state is unknown".to_string()));
    }

    let mut forward: HashMap<&str, Vec<&aura_core::Transition>> = HashMap::new();
    for t in &map.transitions {
        forward.entry(t.from.as_str()).or_default().push(t);
    }
    for edges in forward.values_mut() {
        edges.sort_by(|a, b| a.task.cmp(&b.task));
    }

    let mut best: HashMap<String, Best> = HashMap::new();
    best.insert(current.to_string(), Best { cost: 0, hops: 0, via: None });
    let mut heap = BinaryHeap::new();
    heap.push(Reverse((0u64, 0u32, current.to_string())));

    while let Some(Reverse((cost, hops, state))) = heap.pop() {
        let Some(entry) = best.get(&state) else { continue };
        if entry.cost != cost || entry.hops != hops {
            continue;
        }
        if state == target {
            break;
        }
        let Some(edges) = forward.get(state.as_str()) else { continue };
        for t in edges {
            let next_cost = cost + t.cost as u64;
            let next_hops = hops + 1;
            let better = match best.get(&t.to) {
                None => true,
                Some(b) => (next_cost, next_hops) < (b.cost, b.hops),
            };
            if better {
                best.insert(
                    t.to.clone(),
                    Best { cost: next_cost, hops: next_hops, via: Some((state.clone(), t.task.clone())) },
                );
                heap.push(Reverse((next_cost, next_hops, t.to.clone())));
            }
        }
    }

    if !best.contains_key(target) {
        return Err(AuraError::PlanningFailed(format!(
            "no transition path from '{current}' to '{target}'"
        )));
    }

    let mut path = Vec::new();
    let mut cursor = target.to_string();
    while let Some(b) = best.get(&cursor) {
        match &b.via {
            Some((prev, task)) => {
                path.push(task.clone());
                cursor = prev.clone();
            }
            None => break,
        }
    }
    path.reverse();
    Ok(path)
}

/// Bounded re-planning loop (§4.E `execute_plan`): invokes each
/// transition, verifies the destination state after bounded retry, and
/// re-plans from scratch on verification failure, up to `max_replans`.
pub async fn execute_plan(
    map: &StateMap,
    target: &str,
    oracle: Arc<dyn StateOracle>,
    verify_retries: u32,
    max_replans: u32,
) -> Result<(), AuraError> {
    let (mut current, _) = determine_current_state(map, target, oracle.clone()).await?;
    if current == target {
        return Ok(());
    }

    for _replan in 0..=max_replans {
        let path = plan(map, &current, target)?;
        let mut transition_failed = false;

        for transition_task in &path {
            oracle.transition(transition_task).await?;
            let expected = destination_of(map, &current, transition_task)
                .ok_or_else(|| AuraError::internal("transition graph inconsistent with plan"))?;

            // A state with no check task can't be confirmed by
            // `determine_current_state` (it only ever matches
            // `checkable_states()`); the transition's own success is
            // the only signal available, so accept it directly.
            let has_check_task = map.states.get(&expected).is_some_and(|s| s.check_task.is_some());

            let mut verified = !has_check_task;
            if verified {
                current = expected.clone();
            }
            for attempt in 0..=verify_retries {
                if verified {
                    break;
                }
                let (observed, _) = determine_current_state(map, &expected, oracle.clone()).await?;
                if observed == expected {
                    verified = true;
                    current = expected.clone();
                    break;
                }
                if attempt < verify_retries {
                    let backoff_ms = 50u64 * 2u64.pow(attempt);
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                }
            }
            if !verified {
                transition_failed = true;
                break;
            }
        }

        if current == target {
            return Ok(());
        }
        if transition_failed {
            // re-plan from scratch against the freshly observed state.
            let (observed, _) = determine_current_state(map, target, oracle.clone()).await?;
            current = observed;
        }
    }

    Err(AuraError::PlanningFailed(format!(
        "exceeded {max_replans} re-plan attempt(s) targeting '{target}'"
    )))
}

fn destination_of(map: &StateMap, from: &str, task: &str) -> Option<String> {
    map.transitions.iter().find(|t| t.from == from && t.task == task).map(|t| t.to.clone())
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
