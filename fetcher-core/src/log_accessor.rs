// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! The abstract follower-side log / epoch-cache access.
//!
//! On-disk log append and segment layout are out of scope for this crate;
//! `LogAccessor` is the entire contract the core requires of that layer.

use crate::{
    client::{FetchRequest, PartitionData},
    error::LogError,
    partition::{OffsetAndEpoch, OffsetTruncationState, PartitionId},
    state_table::PartitionStateTable,
};

/// What a successful append reports back: how many bytes were actually
/// valid, the offset of the last record appended, and the partition's
/// current high watermark (used to compute fetcher lag).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogAppendInfo {
    pub valid_bytes: i64,
    pub last_offset: i64,
    pub high_watermark: i64,
}

pub trait LogAccessor: Send + Sync {
    /// Apply a fetched batch at `fetch_offset`. `None` means nothing was
    /// appended (e.g. an empty batch); this is distinct from an error.
    fn process_partition_data(
        &self,
        tp: &PartitionId,
        fetch_offset: i64,
        data: &PartitionData,
    ) -> Result<Option<LogAppendInfo>, LogError>;

    /// Truncate the local log per the divergence policy's verdict.
    fn truncate(&self, tp: &PartitionId, to: OffsetTruncationState) -> Result<(), LogError>;

    /// The follower's log is entirely outside the leader's retention
    /// window: drop everything and start fresh at `offset`.
    fn truncate_fully_and_start_at(&self, tp: &PartitionId, offset: i64) -> Result<(), LogError>;

    /// The latest leader epoch the follower has recorded locally for `tp`,
    /// if any.
    fn latest_epoch(&self, tp: &PartitionId) -> Option<i32>;

    /// The follower's local log end offset (next offset to be appended).
    fn log_end_offset(&self, tp: &PartitionId) -> i64;

    /// The follower's end offset for a given leader epoch, from its local
    /// epoch cache, together with the epoch actually found (which may
    /// differ from `epoch` if the follower never observed it exactly).
    fn end_offset_for_epoch(&self, tp: &PartitionId, epoch: i32) -> Option<OffsetAndEpoch>;

    /// Build at most one fetch request aggregating every partition in
    /// `table` that is ready for fetch and not failed, subject to whatever
    /// size/count limits this implementation enforces. Partitions rejected
    /// due to a recoverable build error (e.g. a too-large next batch) are
    /// returned alongside so the core can back them off rather than drop
    /// them silently.
    fn build_fetch(
        &self,
        table: &PartitionStateTable,
    ) -> (Option<FetchRequest>, Vec<PartitionId>);
}
