// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! The process-wide, writer-locked Registry (§3): actions, services,
//! and hooks populated by the Plugin Loader's Load phase, and consulted
//! by the Execution Engine at run time. Survives hot reloads by being
//! cleared and repopulated in place rather than replaced wholesale, so
//! in-flight `Arc<ActionEntry>` handles held by running steps stay valid.

use aura_core::{AuraError, PluginDefinition, ServiceLifecycle};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::action::{Action, AnyService, Hook};

pub type ServiceConstructor = Arc<
    dyn for<'a> Fn(&'a Registry) -> Pin<Box<dyn Future<Output = Result<AnyService, AuraError>> + Send + 'a>>
        + Send
        + Sync,
>;

pub struct ActionEntry {
    pub fqid: String,
    pub owner_plugin: String,
    pub read_only: bool,
    pub public: bool,
    pub cpu_bound: bool,
    /// action-local parameter name -> service alias to inject.
    pub requires_services: HashMap<String, String>,
    pub callable: Arc<dyn Action>,
}

pub struct ServiceEntry {
    pub alias: String,
    pub owner_plugin: String,
    constructor: ServiceConstructor,
    cell: tokio::sync::OnceCell<AnyService>,
    lifecycle: Mutex<ServiceLifecycle>,
}

pub struct HookEntry {
    pub owner_plugin: String,
    pub callable: Arc<dyn Hook>,
}

#[derive(Default)]
pub struct Registry {
    actions: RwLock<HashMap<String, Arc<ActionEntry>>>,
    services: RwLock<HashMap<String, Arc<ServiceEntry>>>,
    hooks: RwLock<HashMap<String, Vec<Arc<HookEntry>>>>,
    plugins: RwLock<Vec<PluginDefinition>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear phase (§4.B step 1): empties every table. Called at the
    /// start of every load, including hot reloads.
    pub fn clear(&self) {
        self.actions.write().clear();
        self.services.write().clear();
        self.hooks.write().clear();
        self.plugins.write().clear();
    }

    /// Records a plugin as loaded. Errors if a plugin with the same
    /// canonical id is already recorded — the registry is cleared at
    /// the start of every load, so a collision here means two plugins
    /// in the same load resolved to the same id.
    pub fn record_plugin(&self, def: PluginDefinition) -> Result<(), AuraError> {
        let mut plugins = self.plugins.write();
        if let Some(existing) = plugins.iter().find(|p| p.canonical_id() == def.canonical_id()) {
            return Err(AuraError::FatalStartupError(format!(
                "duplicate plugin id '{}' at '{}' and '{}'",
                def.canonical_id(),
                existing.path.display(),
                def.path.display()
            )));
        }
        plugins.push(def);
        Ok(())
    }

    pub fn loaded_plugins(&self) -> Vec<PluginDefinition> {
        self.plugins.read().clone()
    }

    /// Inserts or replaces an action entry. Returns the previous entry,
    /// if any, so the loader can tell a fresh registration from an
    /// override.
    pub fn register_action(&self, entry: ActionEntry) -> Option<Arc<ActionEntry>> {
        self.actions.write().insert(entry.fqid.clone(), Arc::new(entry))
    }

    pub fn get_action(&self, fqid: &str) -> Option<Arc<ActionEntry>> {
        self.actions.read().get(fqid).cloned()
    }

    pub fn action_ids(&self) -> Vec<String> {
        self.actions.read().keys().cloned().collect()
    }

    pub fn register_service(
        &self,
        alias: String,
        owner_plugin: String,
        constructor: ServiceConstructor,
    ) -> Option<Arc<ServiceEntry>> {
        let entry = Arc::new(ServiceEntry {
            alias: alias.clone(),
            owner_plugin,
            constructor,
            cell: tokio::sync::OnceCell::new(),
            lifecycle: Mutex::new(ServiceLifecycle::Defined),
        });
        self.services.write().insert(alias, entry)
    }

    /// `(alias, owner_plugin, lifecycle)` for every registered service,
    /// sorted by alias. Used by introspection surfaces (`aura service
    /// list`) that shouldn't force resolution just to enumerate.
    pub fn service_entries(&self) -> Vec<(String, String, ServiceLifecycle)> {
        let mut entries: Vec<_> = self
            .services
            .read()
            .values()
            .map(|e| (e.alias.clone(), e.owner_plugin.clone(), *e.lifecycle.lock()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn register_hook(&self, point: impl Into<String>, entry: HookEntry) {
        self.hooks.write().entry(point.into()).or_default().push(Arc::new(entry));
    }

    pub fn hooks_for(&self, point: &str) -> Vec<Arc<HookEntry>> {
        self.hooks.read().get(point).cloned().unwrap_or_default()
    }

    /// Resolves a service by alias, constructing it lazily on first use
    /// and caching the instance thereafter (§4.B lazy service
    /// construction). A constructor that re-enters resolution for the
    /// alias it is itself building (directly or transitively) is a
    /// dependency cycle and errors rather than deadlocking.
    pub async fn resolve_service(&self, alias: &str) -> Result<AnyService, AuraError> {
        let entry = self
            .services
            .read()
            .get(alias)
            .cloned()
            .ok_or_else(|| AuraError::InternalError(format!("unknown service '{alias}'")))?;

        if let Some(existing) = entry.cell.get() {
            return Ok(existing.clone());
        }

        {
            let mut lifecycle = entry.lifecycle.lock();
            match *lifecycle {
                ServiceLifecycle::Resolving => {
                    return Err(AuraError::InternalError(format!(
                        "service dependency cycle detected at '{alias}'"
                    )));
                }
                ServiceLifecycle::Failed => {
                    return Err(AuraError::InternalError(format!(
                        "service '{alias}' failed to construct"
                    )));
                }
                ServiceLifecycle::Resolved => {}
                ServiceLifecycle::Defined => *lifecycle = ServiceLifecycle::Resolving,
            }
        }

        if let Some(existing) = entry.cell.get() {
            return Ok(existing.clone());
        }

        match (entry.constructor)(self).await {
            Ok(instance) => {
                let _ = entry.cell.set(instance.clone());
                *entry.lifecycle.lock() = ServiceLifecycle::Resolved;
                Ok(instance)
            }
            Err(e) => {
                *entry.lifecycle.lock() = ServiceLifecycle::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
