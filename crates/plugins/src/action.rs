// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Action and Hook callable traits, and the type-erased service handle
//! actions receive for dependency-injected services (§4.B, §5).

use aura_core::AuraError;
use indexmap::IndexMap;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A type-erased, resolved service instance. Concrete service types are
/// recovered with [`ServiceBag::get`].
pub type AnyService = Arc<dyn Any + Send + Sync>;

/// Services an action asked for by alias, already resolved by the
/// Execution Engine before `invoke` is called.
#[derive(Default, Clone)]
pub struct ServiceBag {
    by_param: HashMap<String, AnyService>,
}

impl ServiceBag {
    pub fn new(by_param: HashMap<String, AnyService>) -> Self {
        Self { by_param }
    }

    /// Recovers a concrete service by the parameter name the action's
    /// `requires_services` map declared it under.
    pub fn get<T: Send + Sync + 'static>(&self, param: &str) -> Option<Arc<T>> {
        self.by_param.get(param).and_then(|svc| svc.clone().downcast::<T>().ok())
    }
}

/// One invocable action. Implementors are registered into the
/// [`crate::registry::Registry`] under a fully-qualified id
/// (`<plugin_name>.<action_name>`).
#[async_trait::async_trait]
pub trait Action: Send + Sync {
    async fn invoke(
        &self,
        params: IndexMap<String, serde_json::Value>,
        services: &ServiceBag,
    ) -> Result<serde_json::Value, AuraError>;
}

/// A lifecycle callback registered against a named hook point
/// (e.g. `before_task_run`, §4.H).
#[async_trait::async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, payload: serde_json::Value) -> Result<(), AuraError>;
}

/// Adapts a plain async closure into an [`Action`], for small built-in
/// actions that don't warrant a dedicated struct.
pub struct FnAction<F>(pub F);

#[async_trait::async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn(IndexMap<String, serde_json::Value>, ServiceBag) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, AuraError>> + Send,
{
    async fn invoke(
        &self,
        params: IndexMap<String, serde_json::Value>,
        services: &ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        (self.0)(params, services.clone()).await
    }
}
