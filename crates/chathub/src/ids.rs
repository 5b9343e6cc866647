// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monotonic id allocation for `Message`/`ChatSession`/`Transfer` records,
//! shared between both role adapters since sessions and messages are
//! addressed by the same id space regardless of which side persisted them.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::message::{MessageId, SessionId};
use crate::transfer::TransferId;

pub struct IdAllocator {
    message: AtomicU64,
    session: AtomicU64,
    transfer: AtomicU64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { message: AtomicU64::new(1), session: AtomicU64::new(1), transfer: AtomicU64::new(1) }
    }
}

impl IdAllocator {
    pub fn next_message(&self) -> MessageId {
        self.message.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_session(&self) -> SessionId {
        self.session.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_transfer(&self) -> TransferId {
        self.transfer.fetch_add(1, Ordering::Relaxed)
    }
}
