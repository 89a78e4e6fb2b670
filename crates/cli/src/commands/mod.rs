// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! CLI command implementations.

pub mod package;
pub mod service;
pub mod task;

use std::path::Path;

use clap::Subcommand;

use crate::exit_error::ExitError;

#[derive(Subcommand)]
pub enum Command {
    /// Plugin manifest inspection.
    Package(package::PackageArgs),
    /// Ad hoc task submission.
    Task(task::TaskArgs),
    /// Registry introspection.
    Service(service::ServiceArgs),
}

pub fn dispatch(cmd: Command, plans_dir: &Path, packages_dir: &Path) -> Result<(), ExitError> {
    match cmd {
        Command::Package(args) => package::dispatch(args.command, plans_dir, packages_dir),
        Command::Task(args) => task::dispatch(args.command, plans_dir),
        Command::Service(args) => service::dispatch(args.command),
    }
}
