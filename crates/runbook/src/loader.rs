// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Task Loader (§4.C): reads, caches, and hot-reloads task definitions.

use aura_core::AuraError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::task::TaskDefinition;

#[derive(Clone)]
struct CacheEntry {
    mtime: SystemTime,
    def: Arc<TaskDefinition>,
}

/// Reads task files from `<plans_dir>/<plan>/tasks/<task>.yaml`, caching
/// the parsed definition keyed by `(plan, task, mtime)`.
pub struct TaskLoader {
    plans_dir: PathBuf,
    cache: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl TaskLoader {
    pub fn new(plans_dir: impl Into<PathBuf>) -> Self {
        Self { plans_dir: plans_dir.into(), cache: Mutex::new(HashMap::new()) }
    }

    fn task_path(&self, plan: &str, task: &str) -> PathBuf {
        self.plans_dir.join(plan).join("tasks").join(format!("{task}.yaml"))
    }

    pub fn get_task_data(&self, plan: &str, task: &str) -> Result<Arc<TaskDefinition>, AuraError> {
        let path = self.task_path(plan, task);
        let mtime = file_mtime(&path)?;

        let key = (plan.to_string(), task.to_string());
        if let Some(entry) = self.cache.lock().get(&key) {
            if entry.mtime == mtime {
                tracing::trace!(plan, task, "task definition cache hit");
                return Ok(entry.def.clone());
            }
        }

        let source = std::fs::read_to_string(&path).map_err(|e| {
            AuraError::ValidationError(format!("reading task {plan}/{task}: {e}"))
        })?;
        let def = Arc::new(TaskDefinition::from_yaml(&source).map_err(|e| {
            AuraError::ValidationError(format!("parsing task {plan}/{task}: {e}"))
        })?);

        tracing::debug!(plan, task, ?mtime, "task definition loaded");
        self.cache.lock().insert(key, CacheEntry { mtime, def: def.clone() });
        Ok(def)
    }

    /// Invalidate a single cached task, used when the hot-reload
    /// supervisor observes its source file change.
    pub fn invalidate(&self, plan: &str, task: &str) {
        tracing::debug!(plan, task, "task definition cache invalidated");
        self.cache.lock().remove(&(plan.to_string(), task.to_string()));
    }

    /// Invalidate every cached task, used on a plugin-tree reload.
    pub fn invalidate_all(&self) {
        tracing::debug!("task definition cache cleared");
        self.cache.lock().clear();
    }
}

fn file_mtime(path: &Path) -> Result<SystemTime, AuraError> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| AuraError::ValidationError(format!("stat {}: {e}", path.display())))
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
