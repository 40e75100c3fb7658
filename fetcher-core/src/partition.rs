// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! Per-partition data model: identifiers, fetch state, and the small value
//! types exchanged with the leader during truncation and fetching.

use std::fmt;
use std::time::{Duration, Instant};

/// Sentinel leader epoch meaning "the peer does not speak the epoch
/// protocol, or has no opinion".
pub const UNDEFINED_EPOCH: i32 = -1;

/// Sentinel end offset accompanying [`UNDEFINED_EPOCH`] in a leader-epoch
/// response: "I have no record of this epoch at all".
pub const UNDEFINED_EPOCH_OFFSET: i64 = -1;

/// Identifies a single partition of a topic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId {
    pub topic: String,
    pub partition: u32,
}

impl PartitionId {
    pub fn new(topic: impl Into<String>, partition: u32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Identifies the destination of a fetcher: the source broker and the
/// fetcher slot assigned to it within the manager's pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BrokerIdAndFetcherId {
    pub broker_id: i32,
    pub fetcher_id: u32,
}

impl BrokerIdAndFetcherId {
    pub fn new(broker_id: i32, fetcher_id: u32) -> Self {
        Self {
            broker_id,
            fetcher_id,
        }
    }
}

/// An offset together with the leader epoch the caller believes is
/// authoritative for it. A negative `offset` means "no initial offset is
/// known yet; derive one from the leader".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OffsetAndEpoch {
    pub offset: i64,
    pub leader_epoch: i32,
}

impl OffsetAndEpoch {
    pub fn new(offset: i64, leader_epoch: i32) -> Self {
        Self {
            offset,
            leader_epoch,
        }
    }
}

/// Result of the truncation policy: where to truncate to, and whether that
/// is the final word on this partition's divergence point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OffsetTruncationState {
    pub offset: i64,
    pub truncation_completed: bool,
}

impl OffsetTruncationState {
    pub fn new(offset: i64, truncation_completed: bool) -> Self {
        Self {
            offset,
            truncation_completed,
        }
    }
}

/// The phase a partition is in within the replication protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplicaState {
    /// The follower has not yet reconciled its divergence point with the
    /// leader; no appends occur in this phase.
    Truncating,
    /// The follower is caught up on truncation and is pulling records.
    Fetching,
}

/// A partition is delayed (backed off) until `expire_at`. Partitions
/// carrying a live `Delayed` contribute no fetch requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayedItem {
    pub expire_at: Instant,
}

impl DelayedItem {
    pub fn new(delay: Duration) -> Self {
        Self {
            expire_at: Instant::now() + delay,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expire_at
    }
}

/// The per-partition record held in [`crate::state_table::PartitionStateTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionFetchState {
    pub fetch_offset: i64,
    pub current_leader_epoch: i32,
    pub delay: Option<DelayedItem>,
    pub state: ReplicaState,
}

impl PartitionFetchState {
    pub fn truncating(fetch_offset: i64, current_leader_epoch: i32) -> Self {
        Self {
            fetch_offset,
            current_leader_epoch,
            delay: None,
            state: ReplicaState::Truncating,
        }
    }

    pub fn fetching(fetch_offset: i64, current_leader_epoch: i32) -> Self {
        Self {
            fetch_offset,
            current_leader_epoch,
            delay: None,
            state: ReplicaState::Fetching,
        }
    }

    pub fn is_truncating(&self) -> bool {
        matches!(self.state, ReplicaState::Truncating)
    }

    pub fn is_delayed(&self) -> bool {
        match &self.delay {
            Some(d) => !d.is_expired(),
            None => false,
        }
    }

    /// `true` iff this partition should contribute to the next fetch
    /// request: past truncation, and not presently backed off.
    pub fn is_ready_for_fetch(&self) -> bool {
        matches!(self.state, ReplicaState::Fetching) && !self.is_delayed()
    }

    /// Returns a copy with `delay` set, unless already delayed.
    pub fn delayed(&self, delay: Duration) -> Self {
        if self.is_delayed() {
            *self
        } else {
            Self {
                delay: Some(DelayedItem::new(delay)),
                ..*self
            }
        }
    }

    /// Returns a copy transitioned to `Fetching` at `fetch_offset`, clearing
    /// any delay. `current_leader_epoch` is preserved.
    pub fn with_fetch_offset(&self, fetch_offset: i64) -> Self {
        Self {
            fetch_offset,
            delay: None,
            state: ReplicaState::Fetching,
            ..*self
        }
    }
}
