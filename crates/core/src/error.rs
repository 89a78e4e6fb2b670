// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! The error taxonomy shared across the execution core.

use thiserror::Error;

/// Unified error type returned by every fallible public operation.
///
/// Only [`AuraError::FatalStartupError`] aborts the scheduler before it
/// starts; everything raised after a Tasklet is admitted is captured by
/// the execution manager and folded into the task's final result instead
/// of being propagated here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuraError {
    #[error("unknown plan or task: {0}")]
    ValidationError(String),

    #[error("admission cancelled before the tasklet started")]
    AdmissionCancelled,

    #[error("state planning failed: {0}")]
    PlanningFailed(String),

    #[error("action error: {0}")]
    ActionError(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("permission denied: {path} escapes plan root {root}")]
    PermissionDenied { path: String, root: String },

    #[error("fatal startup error: {0}")]
    FatalStartupError(String),
}

impl AuraError {
    pub fn internal(msg: impl Into<String>) -> Self {
        AuraError::InternalError(msg.into())
    }
}
