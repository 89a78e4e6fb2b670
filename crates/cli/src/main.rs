// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! `aura`: a one-shot CLI against an in-process execution core (§6). No
//! daemon process backs this binary — every invocation bootstraps its
//! own `Scheduler`, runs the requested command to completion, and tears
//! the core down on exit.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod exit_error;
mod runtime;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use commands::Command;

#[derive(Parser)]
#[command(name = "aura", about = "Asynchronous task automation framework CLI", version)]
struct Cli {
    /// Directory containing one subdirectory per plan, each with a `tasks/` directory.
    #[arg(long, global = true, default_value = "plans")]
    plans_dir: PathBuf,

    /// Additional directory searched for plugin manifests (`aura package build`).
    #[arg(long, global = true, default_value = "packages")]
    packages_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::dispatch(cli.command, &cli.plans_dir, &cli.packages_dir) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.code)
        }
    }
}
