// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Plugin manifest parsing (§6): identity, version, dependencies,
//! extends/overrides declarations.

use aura_core::{PluginDefinition, PluginType, ServiceExtension};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("{path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("{path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

#[derive(Debug, Deserialize)]
struct RawExtends {
    service: String,
    from_plugin: String,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    author: String,
    name: String,
    version: String,
    #[serde(rename = "type")]
    plugin_type: RawPluginType,
    #[serde(default)]
    dependencies: HashMap<String, String>,
    #[serde(default)]
    extends: Vec<RawExtends>,
    #[serde(default)]
    overrides: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawPluginType {
    Plan,
    Library,
}

/// Parses `<plugin_root>/plugin.toml` into a [`PluginDefinition`].
/// Missing `author`/`name` surfaces as a [`ManifestError::Parse`], which
/// the loader treats as fatal (§3 invariant, §4.B step 2).
pub fn parse_manifest(root: &Path) -> Result<PluginDefinition, ManifestError> {
    let path = root.join("plugin.toml");
    let contents = std::fs::read_to_string(&path).map_err(|e| ManifestError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawManifest = toml::from_str(&contents).map_err(|e| ManifestError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(PluginDefinition {
        author: raw.author,
        name: raw.name,
        version: raw.version,
        plugin_type: match raw.plugin_type {
            RawPluginType::Plan => PluginType::Plan,
            RawPluginType::Library => PluginType::Library,
        },
        path: root.to_path_buf(),
        dependencies: raw.dependencies.into_keys().collect::<BTreeSet<_>>(),
        external_dependencies: BTreeSet::new(),
        extends: raw
            .extends
            .into_iter()
            .map(|e| ServiceExtension { target_service_alias: e.service, provider_plugin_id: e.from_plugin })
            .collect(),
        overrides: raw.overrides,
    })
}
