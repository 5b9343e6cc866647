// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Free-standing wall-clock helpers for contexts that don't carry a
//! `store::Clock` handle (wire-frame timestamps, locator refresh).
//! `AssignmentStore`/offline-policy timing always goes through `Clock` so
//! tests can control it; this is for framing only.

/// Current Unix time in seconds.
pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
