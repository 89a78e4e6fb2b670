// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Carries a process exit code alongside an error message (§6: exit
//! code 0 success, 1 user error, 2 internal error). Commands return
//! this instead of calling `std::process::exit` directly so `main`
//! owns process termination.

use std::fmt;

#[derive(Debug)]
pub struct ExitError {
    pub code: u8,
    pub message: String,
}

impl ExitError {
    pub fn user(message: impl Into<String>) -> Self {
        Self { code: 1, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { code: 2, message: message.into() }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

impl From<aura_core::AuraError> for ExitError {
    fn from(err: aura_core::AuraError) -> Self {
        use aura_core::AuraError::*;
        match err {
            ValidationError(_) | PermissionDenied { .. } => ExitError::user(err.to_string()),
            InternalError(_) | FatalStartupError(_) => ExitError::internal(err.to_string()),
            AdmissionCancelled | PlanningFailed(_) | ActionError(_) | Timeout | Cancelled => {
                ExitError::user(err.to_string())
            }
        }
    }
}
