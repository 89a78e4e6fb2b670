// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

use super::*;

#[test]
fn list_succeeds_with_no_services_registered() {
    assert!(list().is_ok());
}
