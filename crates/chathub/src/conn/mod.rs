// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Conn`: a live duplex session bound to exactly one `Principal` (§4.1).
//!
//! `Conn` is a handle, not the I/O loop itself — the reader/writer tasks
//! that actually drive the socket live in `transport::ws`, which is the
//! only place that needs to touch the raw WebSocket stream. This mirrors
//! the cyclic-reference guidance in §9: `Conn` holds only its principal,
//! uuid, and a sender used to hand parsed actions back to its `Manager`,
//! never an `Arc<Manager>`.

pub mod shard;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::action::Action;
use crate::error::ChatError;
use crate::principal::{GroupId, Principal};

pub use shard::ConnectionShard;

/// Why a `Conn` was closed. Logged, never surfaced to peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ReadTimeout,
    SlowConsumer,
    Shutdown,
    PeerClose,
    DuplicateLogin,
    ReadError,
    WriteError,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadTimeout => "read-timeout",
            Self::SlowConsumer => "slow-consumer",
            Self::Shutdown => "shutdown",
            Self::PeerClose => "peer-close",
            Self::DuplicateLogin => "duplicate-login",
            Self::ReadError => "read-error",
            Self::WriteError => "write-error",
        }
    }
}

/// A live duplex session. Registered with exactly one `Manager` shard at a
/// time; unregistered on close (§4.1).
pub struct Conn {
    principal: Principal,
    uuid: String,
    group_id: Option<GroupId>,
    outbound: mpsc::Sender<Action>,
    cancel: CancellationToken,
}

impl Conn {
    pub fn new(
        principal: Principal,
        uuid: String,
        group_id: Option<GroupId>,
        outbound: mpsc::Sender<Action>,
        cancel: CancellationToken,
    ) -> Self {
        Self { principal, uuid, group_id, outbound, cancel }
    }

    pub fn principal(&self) -> Principal {
        self.principal
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.group_id
    }

    /// Non-blocking enqueue to the outbound queue. `QueueFull` when the
    /// writer can't keep up; the caller is responsible for closing the Conn
    /// with `SlowConsumer` per §4.1 back-pressure policy.
    pub fn deliver(&self, action: Action) -> Result<(), ChatError> {
        self.outbound.try_send(action).map_err(|_| ChatError::QueueFull)
    }

    /// Idempotent: repeated calls are no-ops after the first (§4.1, §8 property 5).
    pub fn close(&self, reason: CloseReason) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(principal = ?self.principal, uuid = %self.uuid, reason = reason.as_str(), "closing conn");
        }
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
