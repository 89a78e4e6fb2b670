// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! `aura task` — ad hoc task submission (§4.I, §5, §6).

use std::path::Path;
use std::time::Duration;

use clap::{Args, Subcommand};

use aura_wire::TfrStatus;

use crate::exit_error::ExitError;
use crate::runtime;

#[derive(Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Submit `<plan>/<task>` for execution.
    Run {
        /// `<plan>/<task>`, e.g. `hello/greet`.
        plan_task: String,

        /// `key=value` input, repeatable. Values that parse as JSON are
        /// passed through as JSON; otherwise as a JSON string.
        #[arg(long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// Block until the run finishes and print/exit on its result.
        /// Without this flag the task still runs to completion inside
        /// this invocation (there is no daemon to hand it off to,
        /// §6 Non-goals), but the caller has opted out of the outcome:
        /// the command exits 0 as soon as submission itself succeeded.
        #[arg(long)]
        wait: bool,

        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

pub fn dispatch(cmd: TaskCommand, plans_dir: &Path) -> Result<(), ExitError> {
    match cmd {
        TaskCommand::Run { plan_task, inputs, wait, timeout_secs } => {
            run(&plan_task, inputs, wait, timeout_secs, plans_dir)
        }
    }
}

fn run(plan_task: &str, raw_inputs: Vec<String>, wait: bool, timeout_secs: u64, plans_dir: &Path) -> Result<(), ExitError> {
    let (plan, task) = plan_task
        .split_once('/')
        .ok_or_else(|| ExitError::user(format!("invalid task reference '{plan_task}': expected <plan>/<task>")))?;

    if !plans_dir.join(plan).is_dir() {
        return Err(ExitError::user(format!("unknown plan '{plan}' under {}", plans_dir.display())));
    }

    let inputs = raw_inputs
        .iter()
        .map(|raw| runtime::parse_input(raw))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ExitError::user)?;
    let inputs = runtime::inputs_map(inputs);

    let rt = tokio::runtime::Runtime::new().map_err(|e| ExitError::internal(format!("tokio runtime: {e}")))?;
    rt.block_on(async move {
        let core = runtime::bootstrap(plans_dir)?;
        let handles = core.scheduler.start_scheduler();
        let run_id = core.scheduler.run_ad_hoc_task(plan, task, inputs).await?;

        if wait {
            let tfr = runtime::await_finish(&core.event_bus, &run_id, Duration::from_secs(timeout_secs))
                .await
                .ok_or_else(|| ExitError::internal(format!("task {run_id} did not finish within {timeout_secs}s")))?;
            print_result(&tfr);
            core.scheduler.stop_scheduler();
            for h in handles {
                h.abort();
            }
            return exit_for_status(tfr.status);
        }

        // Drain silently: give the task a bounded window to finish in
        // the background, but the caller only cares that it was
        // submitted — exit 0 regardless of what the drain observes.
        let _ = runtime::await_finish(&core.event_bus, &run_id, Duration::from_secs(timeout_secs)).await;
        println!("submitted {run_id}");
        core.scheduler.stop_scheduler();
        for h in handles {
            h.abort();
        }
        Ok(())
    })
}

fn print_result(tfr: &aura_wire::TaskFinalResult) {
    match serde_json::to_string_pretty(tfr) {
        Ok(json) => println!("{json}"),
        Err(_) => println!("{tfr:?}"),
    }
}

fn exit_for_status(status: TfrStatus) -> Result<(), ExitError> {
    match status {
        TfrStatus::Success => Ok(()),
        TfrStatus::Failed => Err(ExitError::user("task finished with status FAILED")),
        TfrStatus::Error => Err(ExitError::internal("task finished with status ERROR")),
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
