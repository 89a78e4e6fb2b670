// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! `aura service` — registry introspection (§3, §6).
//!
//! This binary links in exactly one compiled plugin (the always-on core
//! plugin), so `list` can only ever show services that plugin
//! registers — today, none. A binary that links additional
//! [`aura_plugins::LoadedPlugin`] implementations would see theirs too;
//! there's no way for this CLI to discover services belonging to a
//! plugin it wasn't compiled against.

use clap::{Args, Subcommand};

use crate::exit_error::ExitError;
use crate::runtime;

#[derive(Args)]
pub struct ServiceArgs {
    #[command(subcommand)]
    pub command: ServiceCommand,
}

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// List every service known to the registry, with owner and lifecycle.
    List,
}

pub fn dispatch(cmd: ServiceCommand) -> Result<(), ExitError> {
    match cmd {
        ServiceCommand::List => list(),
    }
}

fn list() -> Result<(), ExitError> {
    let registry = runtime::builtin_registry()?;
    let entries = registry.service_entries();
    if entries.is_empty() {
        println!("no services registered");
        return Ok(());
    }
    for (alias, owner, lifecycle) in entries {
        println!("{alias:<24} {owner:<24} {lifecycle:?}");
    }
    Ok(())
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
