// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! The abstract RPC surface to the source broker.
//!
//! The concrete network client that issues these RPCs is out of scope for
//! this crate. `LeaderClient` is the entire contract the core requires of
//! it, following the same "trait as the seam, no concrete network code in
//! this crate" discipline `link-replication` applies to `Net`/`Refdb`.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{
    error::ClientError,
    partition::{PartitionId, UNDEFINED_EPOCH, UNDEFINED_EPOCH_OFFSET},
};

/// Request half of the OffsetsForLeaderEpoch protocol: what epoch the
/// follower believes is authoritative, and the epoch the follower can
/// currently observe locally (for diagnostics on the leader side).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochData {
    pub requested_leader_epoch: i32,
    pub observed_follower_epoch: i32,
}

impl EpochData {
    pub fn new(requested_leader_epoch: i32, observed_follower_epoch: i32) -> Self {
        Self {
            requested_leader_epoch,
            observed_follower_epoch,
        }
    }
}

/// Response half of the OffsetsForLeaderEpoch protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochEndOffset {
    pub leader_epoch: i32,
    pub end_offset: i64,
    pub error: EpochEndOffsetError,
}

impl EpochEndOffset {
    pub fn ok(leader_epoch: i32, end_offset: i64) -> Self {
        Self {
            leader_epoch,
            end_offset,
            error: EpochEndOffsetError::None,
        }
    }

    pub fn undefined() -> Self {
        Self {
            leader_epoch: UNDEFINED_EPOCH,
            end_offset: UNDEFINED_EPOCH_OFFSET,
            error: EpochEndOffsetError::None,
        }
    }

    pub fn fenced(leader_epoch: i32) -> Self {
        Self {
            leader_epoch,
            end_offset: UNDEFINED_EPOCH_OFFSET,
            error: EpochEndOffsetError::FencedLeaderEpoch,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochEndOffsetError {
    None,
    FencedLeaderEpoch,
    UnknownLeaderEpoch,
    NotLeaderForPartition,
    UnknownTopicOrPartition,
    Other,
}

/// A batch of records plus bookkeeping the leader returns for one
/// partition in a fetch response.
#[derive(Clone, Debug)]
pub struct PartitionData {
    pub records: Vec<u8>,
    pub high_watermark: i64,
    pub error: FetchError,
}

/// Per-partition error code carried in a fetch response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchError {
    None,
    CorruptRecord,
    OffsetOutOfRange,
    UnknownLeaderEpoch,
    FencedLeaderEpoch,
    NotLeaderForPartition,
    UnknownTopicOrPartition,
    StorageError,
    Other,
}

/// Opaque request built by [`crate::log_accessor::LogAccessor::build_fetch`];
/// the core never inspects its contents, only passes it to the leader.
#[derive(Clone, Debug, Default)]
pub struct FetchRequest {
    pub partitions: Vec<PartitionId>,
}

/// The abstract RPC surface to the source broker.
#[async_trait]
pub trait LeaderClient: Send + Sync {
    /// `true` if this leader speaks the OffsetsForLeaderEpoch protocol;
    /// partitions behind a leader that doesn't are truncated to the
    /// high watermark instead.
    fn is_offset_for_leader_epoch_supported(&self) -> bool;

    async fn fetch_from_leader(
        &self,
        request: FetchRequest,
    ) -> Result<Vec<(PartitionId, PartitionData)>, ClientError>;

    async fn fetch_epoch_end_offsets(
        &self,
        requested: BTreeMap<PartitionId, EpochData>,
    ) -> Result<BTreeMap<PartitionId, EpochEndOffset>, ClientError>;

    async fn fetch_latest_offset(
        &self,
        tp: &PartitionId,
        current_leader_epoch: i32,
    ) -> Result<i64, ClientError>;

    async fn fetch_earliest_offset(
        &self,
        tp: &PartitionId,
        current_leader_epoch: i32,
    ) -> Result<i64, ClientError>;
}
