// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Worker pools backing the Execution Manager's `ActionRunner` (§4.H
//! step 6, Open Question: CPU isolation is a separate worker set in
//! the same address space, not a separate process).
//!
//! IO-bound actions are already async, so "the IO pool" is a
//! concurrency bound over tasks running inline on the Tokio runtime.
//! CPU-bound actions are dispatched onto Tokio's own blocking thread
//! pool via `spawn_blocking`, the same isolation the adapters crate
//! uses to keep a blocking call off the reactor; a semaphore caps how
//! many of those blocking slots this pool will occupy at once. A
//! panicking action surfaces as a `JoinError`, folded into
//! `AuraError::ActionError` rather than taking the caller down.

use aura_core::AuraError;
use aura_plugins::{Action, ServiceBag};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A bounded pool of `spawn_blocking` slots for CPU-bound action invocations.
pub struct CpuPool {
    permits: Arc<Semaphore>,
}

impl CpuPool {
    /// `handle` is unused now that dispatch goes through
    /// `tokio::task::spawn_blocking`, but stays in the signature so
    /// callers don't need to care whether a pool is backed by Tokio's
    /// blocking pool or a hand-rolled one.
    pub fn new(size: usize, handle: tokio::runtime::Handle) -> Self {
        let _ = handle;
        Self { permits: Arc::new(Semaphore::new(size.max(1))) }
    }

    pub async fn execute(
        &self,
        action: Arc<dyn Action>,
        handle: tokio::runtime::Handle,
        params: IndexMap<String, serde_json::Value>,
        services: ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        let _permit =
            self.permits.acquire().await.map_err(|_| AuraError::internal("cpu pool semaphore closed"))?;

        tokio::task::spawn_blocking(move || handle.block_on(action.invoke(params, &services)))
            .await
            .unwrap_or_else(|join_err| {
                Err(AuraError::ActionError(format!("cpu-bound action panicked: {join_err}")))
            })
    }
}

/// Dispatches an action to the CPU pool when `cpu_bound`, or runs it
/// inline behind an IO concurrency permit otherwise. Implements
/// [`aura_engine::ActionRunner`].
pub struct PooledActionRunner {
    io_permits: Arc<Semaphore>,
    cpu_pool: Arc<CpuPool>,
    runtime: tokio::runtime::Handle,
}

impl PooledActionRunner {
    pub fn new(io_pool_size: usize, cpu_pool: Arc<CpuPool>, runtime: tokio::runtime::Handle) -> Self {
        Self { io_permits: Arc::new(Semaphore::new(io_pool_size.max(1))), cpu_pool, runtime }
    }
}

#[async_trait::async_trait]
impl aura_engine::ActionRunner for PooledActionRunner {
    async fn run(
        &self,
        action: Arc<dyn Action>,
        cpu_bound: bool,
        params: IndexMap<String, serde_json::Value>,
        services: ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        if cpu_bound {
            self.cpu_pool.execute(action, self.runtime.clone(), params, services).await
        } else {
            let _permit = self
                .io_permits
                .acquire()
                .await
                .map_err(|_| AuraError::internal("io permit semaphore closed"))?;
            action.invoke(params, &services).await
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
