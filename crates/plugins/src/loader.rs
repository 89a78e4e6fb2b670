// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Plugin Loader (§4.B): Clear -> Discover -> Sort -> Load, plus the
//! hot-reload entry point that reruns the same four phases.

use aura_core::{AuraError, PluginDefinition};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::manifest::parse_manifest;
use crate::registry::Registry;

/// A plugin's API descriptor plus the loader hooks it contributes.
/// Concrete plugins implement this to describe what they export;
/// `register` is handed the live registry during the Load phase and
/// performs the actual `register_action`/`register_service` calls,
/// since the action/service closures need the plugin's own Rust types
/// in scope (`unsafe_code = "forbid"` rules out discovering them from
/// the filesystem at runtime — see `aura_core::ActionDescriptor`).
pub trait LoadedPlugin: Send + Sync {
    fn definition(&self) -> &PluginDefinition;
    fn register(&self, registry: &Registry) -> Result<(), AuraError>;
}

/// Discovers manifests under `roots`, builds a [`PluginDefinition`] per
/// manifest, and returns them keyed by canonical id. Fatal on any
/// unparseable manifest (§4.B step 2).
pub fn discover(roots: &[PathBuf]) -> Result<BTreeMap<String, PluginDefinition>, AuraError> {
    let mut found = BTreeMap::new();
    let mut errors = Vec::new();

    for root in roots {
        if !root.is_dir() {
            continue;
        }
        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let manifest_path = dir.join("plugin.toml");
            if manifest_path.is_file() {
                match parse_manifest(&dir) {
                    Ok(def) => {
                        let id = def.canonical_id();
                        if let Some(existing) = found.insert(id.clone(), def) {
                            errors.push(format!(
                                "duplicate plugin id '{id}' at '{}' and '{}'",
                                existing.path.display(),
                                dir.display()
                            ));
                        }
                    }
                    Err(e) => errors.push(e.to_string()),
                }
                continue;
            }
            let Ok(entries) = std::fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                }
            }
        }
    }

    if !errors.is_empty() {
        errors.sort();
        return Err(AuraError::FatalStartupError(format!(
            "failed to parse {} plugin manifest(s): {}",
            errors.len(),
            errors.join("; ")
        )));
    }
    Ok(found)
}

/// Topologically sorts plugins by declared dependency edges
/// (dependency loads before dependent). Deterministic: among plugins
/// with no remaining unmet dependency, the lexicographically smallest
/// canonical id is chosen next. On cycle, fails reporting the cycle
/// path (§4.B step 3).
pub fn topo_sort(plugins: &BTreeMap<String, PluginDefinition>) -> Result<Vec<String>, AuraError> {
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for (id, def) in plugins {
        indegree.entry(id.as_str()).or_insert(0);
        for dep in &def.dependencies {
            if !plugins.contains_key(dep) {
                return Err(AuraError::FatalStartupError(format!(
                    "plugin '{id}' declares a dependency on unknown plugin '{dep}'"
                )));
            }
            *indegree.entry(id.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(id.as_str());
        }
    }

    let mut ready: BTreeSet<&str> =
        indegree.iter().filter(|(_, &d)| d == 0).map(|(id, _)| *id).collect();
    let mut order = Vec::with_capacity(plugins.len());

    while let Some(&next) = ready.iter().next() {
        ready.remove(next);
        order.push(next.to_string());
        if let Some(deps) = dependents.get(next) {
            for &dependent in deps {
                let entry = indegree.get_mut(dependent).expect("tracked above");
                *entry -= 1;
                if *entry == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() != plugins.len() {
        let remaining: BTreeSet<&str> =
            indegree.iter().filter(|(_, &d)| d > 0).map(|(id, _)| *id).collect();
        let cycle = find_cycle_path(&remaining, plugins);
        return Err(AuraError::FatalStartupError(format!(
            "plugin dependency cycle: {}",
            cycle.join(" -> ")
        )));
    }

    Ok(order)
}

fn find_cycle_path(remaining: &BTreeSet<&str>, plugins: &BTreeMap<String, PluginDefinition>) -> Vec<String> {
    let Some(&start) = remaining.iter().next() else { return Vec::new() };
    let mut visited = BTreeSet::new();
    let mut path = vec![start];
    let mut current = start;
    loop {
        if !visited.insert(current) {
            if let Some(pos) = path.iter().position(|&id| id == current) {
                return path[pos..].iter().map(|s| s.to_string()).collect();
            }
            return path.iter().map(|s| s.to_string()).collect();
        }
        let Some(def) = plugins.get(current) else { break };
        let Some(next) = def.dependencies.iter().find(|d| remaining.contains(d.as_str())) else {
            break;
        };
        current = next.as_str();
        path.push(current);
    }
    path.into_iter().map(|s| s.to_string()).collect()
}

/// Runs all four phases against a freshly built set of [`LoadedPlugin`]
/// instances (one per discovered manifest, constructed by the caller
/// since only the caller's compiled-in plugin table can turn a manifest
/// into live action/service callables). `queue` feeds `load_order` for
/// callers that want to inspect it before registering.
pub fn load(registry: &Registry, plugins: Vec<Arc<dyn LoadedPlugin>>) -> Result<Vec<String>, AuraError> {
    registry.clear();

    let defs: BTreeMap<String, PluginDefinition> =
        plugins.iter().map(|p| (p.definition().canonical_id(), p.definition().clone())).collect();
    let order = topo_sort(&defs)?;

    let by_id: HashMap<String, Arc<dyn LoadedPlugin>> =
        plugins.into_iter().map(|p| (p.definition().canonical_id(), p)).collect();

    for id in &order {
        let plugin = by_id.get(id).expect("present from defs");
        plugin.register(registry)?;
        registry.record_plugin(plugin.definition().clone())?;
    }

    Ok(order)
}

/// Discovers manifests under `roots` and loads the subset present in
/// `plugins`, in dependency order. Used by the hot-reload supervisor's
/// full clear + rerun path (§4.B Hot reload) as well as initial
/// startup.
pub fn discover_and_load(
    registry: &Registry,
    roots: &[PathBuf],
    plugins: Vec<Arc<dyn LoadedPlugin>>,
) -> Result<Vec<String>, AuraError> {
    let discovered = discover(roots)?;
    let missing: Vec<String> = plugins
        .iter()
        .map(|p| p.definition().canonical_id())
        .filter(|id| !discovered.contains_key(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !missing.is_empty() {
        return Err(AuraError::FatalStartupError(format!(
            "manifest not found for registered plugin(s): {}",
            missing.join(", ")
        )));
    }
    load(registry, plugins)
}

/// Breadth-first collects every directory under `root` that contains a
/// `plugin.toml`, used by callers that want manifest paths without
/// parsing them (e.g. the hot-reload supervisor's watch list).
pub fn manifest_dirs(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut queue = VecDeque::from([root.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        if dir.join("plugin.toml").is_file() {
            found.push(dir);
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                queue.push_back(path);
            }
        }
    }
    found
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
