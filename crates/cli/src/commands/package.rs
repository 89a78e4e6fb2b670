// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! `aura package` — plugin manifest inspection (§4.B, §6).

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};

use crate::exit_error::ExitError;

#[derive(Args)]
pub struct PackageArgs {
    #[command(subcommand)]
    pub command: PackageCommand,
}

#[derive(Subcommand)]
pub enum PackageCommand {
    /// Validate a plugin's manifest and its place in the dependency
    /// graph without registering it — there is no compiled-code step:
    /// §4.B resolves a plugin's actions/services against a binary's
    /// own compiled-in plugin table at load time, not at build time.
    Build {
        /// Canonical plugin id (`author/name`).
        plugin_id: String,
    },
}

pub fn dispatch(cmd: PackageCommand, plans_dir: &Path, packages_dir: &Path) -> Result<(), ExitError> {
    match cmd {
        PackageCommand::Build { plugin_id } => build(&plugin_id, plans_dir, packages_dir),
    }
}

fn build(plugin_id: &str, plans_dir: &Path, packages_dir: &Path) -> Result<(), ExitError> {
    let roots: Vec<PathBuf> = vec![plans_dir.to_path_buf(), packages_dir.to_path_buf()];
    let defs = aura_plugins::discover(&roots)?;
    let def = defs.get(plugin_id).ok_or_else(|| ExitError::user(format!("unknown plugin id: {plugin_id}")))?;
    let order = aura_plugins::topo_sort(&defs)?;
    let position = order
        .iter()
        .position(|id| id == plugin_id)
        .ok_or_else(|| ExitError::internal("plugin missing from load order after topo sort"))?;

    println!("built {} v{} ({:?})", def.canonical_id(), def.version, def.plugin_type);
    println!("  path: {}", def.path.display());
    println!("  dependencies: {}", def.dependencies.len());
    println!("  load order: {} of {}", position + 1, order.len());
    Ok(())
}

#[cfg(test)]
#[path = "package_tests.rs"]
mod tests;
