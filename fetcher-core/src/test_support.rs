// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! Minimal fakes used by the in-module unit tests in [`crate::core`]. The
//! end-to-end scenarios live in the sibling `t` crate against a more
//! complete pair of fakes; these exist only so `core`'s pure-logic helpers
//! (the divergence policy, fencing, delay bookkeeping) can be exercised
//! without wiring up a real client or log.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::client::{EpochData, EpochEndOffset, FetchRequest, LeaderClient, PartitionData};
use crate::error::{ClientError, LogError};
use crate::log_accessor::{LogAccessor, LogAppendInfo};
use crate::partition::{OffsetAndEpoch, OffsetTruncationState, PartitionId};
use crate::state_table::PartitionStateTable;

#[derive(Default)]
pub struct FakeLeaderClient {
    pub supports_epochs: bool,
}

#[async_trait]
impl LeaderClient for FakeLeaderClient {
    fn is_offset_for_leader_epoch_supported(&self) -> bool {
        self.supports_epochs
    }

    async fn fetch_from_leader(
        &self,
        _request: FetchRequest,
    ) -> Result<Vec<(PartitionId, PartitionData)>, ClientError> {
        Ok(Vec::new())
    }

    async fn fetch_epoch_end_offsets(
        &self,
        _requested: BTreeMap<PartitionId, EpochData>,
    ) -> Result<BTreeMap<PartitionId, EpochEndOffset>, ClientError> {
        Ok(BTreeMap::new())
    }

    async fn fetch_latest_offset(&self, _tp: &PartitionId, _current_leader_epoch: i32) -> Result<i64, ClientError> {
        Ok(0)
    }

    async fn fetch_earliest_offset(&self, _tp: &PartitionId, _current_leader_epoch: i32) -> Result<i64, ClientError> {
        Ok(0)
    }
}

#[derive(Default)]
pub struct FakeLogAccessor {
    log_end_offsets: DashMap<PartitionId, i64>,
    end_offsets_for_epoch: DashMap<(PartitionId, i32), OffsetAndEpoch>,
}

impl FakeLogAccessor {
    pub fn set_log_end_offset(&self, tp: &PartitionId, offset: i64) {
        self.log_end_offsets.insert(tp.clone(), offset);
    }

    pub fn set_end_offset_for_epoch(&self, tp: &PartitionId, epoch: i32, value: OffsetAndEpoch) {
        self.end_offsets_for_epoch.insert((tp.clone(), epoch), value);
    }
}

impl LogAccessor for FakeLogAccessor {
    fn process_partition_data(
        &self,
        _tp: &PartitionId,
        _fetch_offset: i64,
        _data: &PartitionData,
    ) -> Result<Option<LogAppendInfo>, LogError> {
        Ok(None)
    }

    fn truncate(&self, _tp: &PartitionId, _to: OffsetTruncationState) -> Result<(), LogError> {
        Ok(())
    }

    fn truncate_fully_and_start_at(&self, _tp: &PartitionId, _offset: i64) -> Result<(), LogError> {
        Ok(())
    }

    fn latest_epoch(&self, _tp: &PartitionId) -> Option<i32> {
        None
    }

    fn log_end_offset(&self, tp: &PartitionId) -> i64 {
        self.log_end_offsets.get(tp).map(|v| *v).unwrap_or(0)
    }

    fn end_offset_for_epoch(&self, tp: &PartitionId, epoch: i32) -> Option<OffsetAndEpoch> {
        self.end_offsets_for_epoch.get(&(tp.clone(), epoch)).map(|v| *v)
    }

    fn build_fetch(&self, _table: &PartitionStateTable) -> (Option<FetchRequest>, Vec<PartitionId>) {
        (None, Vec::new())
    }
}
