// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! The `aura/core` plugin: always loaded, provides the handful of
//! actions every task tree can assume exist (`core.log`, `core.noop`)
//! without requiring a filesystem manifest.

use aura_core::{AuraError, PluginDefinition, PluginType};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::action::{Action, ServiceBag};
use crate::loader::LoadedPlugin;
use crate::registry::{ActionEntry, Registry};

struct LogAction;

#[async_trait::async_trait]
impl Action for LogAction {
    async fn invoke(
        &self,
        params: IndexMap<String, serde_json::Value>,
        _services: &ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        let message = params
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AuraError::ValidationError("core.log requires a 'message' string param".into()))?;
        let level = params.get("level").and_then(|v| v.as_str()).unwrap_or("INFO");

        match level.to_ascii_uppercase().as_str() {
            "ERROR" => tracing::error!(target: "aura::task", "{message}"),
            "WARN" | "WARNING" => tracing::warn!(target: "aura::task", "{message}"),
            "DEBUG" => tracing::debug!(target: "aura::task", "{message}"),
            _ => tracing::info!(target: "aura::task", "{message}"),
        }
        Ok(serde_json::Value::Null)
    }
}

struct NoopAction;

#[async_trait::async_trait]
impl Action for NoopAction {
    async fn invoke(
        &self,
        _params: IndexMap<String, serde_json::Value>,
        _services: &ServiceBag,
    ) -> Result<serde_json::Value, AuraError> {
        Ok(serde_json::Value::Null)
    }
}

pub struct CorePlugin {
    def: PluginDefinition,
}

impl CorePlugin {
    pub fn new() -> Self {
        Self {
            def: PluginDefinition {
                author: "aura".to_string(),
                name: "core".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                plugin_type: PluginType::Library,
                path: std::path::PathBuf::new(),
                dependencies: BTreeSet::new(),
                external_dependencies: BTreeSet::new(),
                extends: Vec::new(),
                overrides: Vec::new(),
            },
        }
    }
}

impl Default for CorePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadedPlugin for CorePlugin {
    fn definition(&self) -> &PluginDefinition {
        &self.def
    }

    fn register(&self, registry: &Registry) -> Result<(), AuraError> {
        registry.register_action(ActionEntry {
            fqid: "core.log".to_string(),
            owner_plugin: self.def.canonical_id(),
            read_only: true,
            public: true,
            cpu_bound: false,
            requires_services: Default::default(),
            callable: Arc::new(LogAction),
        });
        registry.register_action(ActionEntry {
            fqid: "core.noop".to_string(),
            owner_plugin: self.def.canonical_id(),
            read_only: true,
            public: true,
            cpu_bound: false,
            requires_services: Default::default(),
            callable: Arc::new(NoopAction),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[tokio::test]
    async fn core_log_requires_a_message() {
        let err = LogAction.invoke(IndexMap::new(), &ServiceBag::default()).await.unwrap_err();
        assert!(matches!(err, AuraError::ValidationError(_)));
    }

    #[tokio::test]
    async fn core_log_accepts_a_message_and_level() {
        let mut params = IndexMap::new();
        params.insert("message".to_string(), serde_json::json!("Hello, world!"));
        params.insert("level".to_string(), serde_json::json!("INFO"));
        let result = LogAction.invoke(params, &ServiceBag::default()).await.unwrap();
        assert_eq!(result, serde_json::Value::Null);
    }

    #[test]
    fn registers_core_log_and_core_noop() {
        let registry = Registry::new();
        CorePlugin::new().register(&registry).unwrap();
        assert!(registry.get_action("core.log").is_some());
        assert!(registry.get_action("core.noop").is_some());
    }
}
