// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! aura-runbook: task definition parsing, the hot-reloadable Task Loader,
//! and the `{{ expr }}` Template Renderer.

pub mod loader;
pub mod task;
pub mod template;

pub use loader::TaskLoader;
pub use task::{InputSpec, InputType, StepDefinition, TaskDefinition, TaskMeta};
pub use template::{render, render_bool, render_str, Scope, TemplateError, Value};
