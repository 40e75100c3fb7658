// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! Scriptable `LeaderClient`/`LogAccessor` doubles for the end-to-end
//! scenarios in `tests/scenarios.rs`. Each call records what it saw so a
//! test can assert on interactions, not just on final state.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use fetcher_core::client::{EpochData, EpochEndOffset, FetchRequest, LeaderClient, PartitionData};
use fetcher_core::error::{ClientError, LogError};
use fetcher_core::log_accessor::{LogAccessor, LogAppendInfo};
use fetcher_core::partition::{OffsetAndEpoch, OffsetTruncationState, PartitionId};
use fetcher_core::state_table::PartitionStateTable;

#[derive(Default)]
pub struct FakeLeaderClient {
    supports_epochs: AtomicBool,
    epoch_end_offsets: DashMap<PartitionId, EpochEndOffset>,
    latest_offsets: DashMap<PartitionId, i64>,
    earliest_offsets: DashMap<PartitionId, i64>,
    fetch_queue: Mutex<VecDeque<Vec<(PartitionId, PartitionData)>>>,
}

impl FakeLeaderClient {
    pub fn set_supports_epochs(&self, value: bool) {
        self.supports_epochs.store(value, Ordering::Relaxed);
    }

    pub fn set_epoch_end_offset(&self, tp: &PartitionId, value: EpochEndOffset) {
        self.epoch_end_offsets.insert(tp.clone(), value);
    }

    pub fn set_latest_offset(&self, tp: &PartitionId, offset: i64) {
        self.latest_offsets.insert(tp.clone(), offset);
    }

    pub fn set_earliest_offset(&self, tp: &PartitionId, offset: i64) {
        self.earliest_offsets.insert(tp.clone(), offset);
    }

    pub fn push_fetch_response(&self, response: Vec<(PartitionId, PartitionData)>) {
        self.fetch_queue.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl LeaderClient for FakeLeaderClient {
    fn is_offset_for_leader_epoch_supported(&self) -> bool {
        self.supports_epochs.load(Ordering::Relaxed)
    }

    async fn fetch_from_leader(
        &self,
        _request: FetchRequest,
    ) -> Result<Vec<(PartitionId, PartitionData)>, ClientError> {
        Ok(self.fetch_queue.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn fetch_epoch_end_offsets(
        &self,
        requested: BTreeMap<PartitionId, EpochData>,
    ) -> Result<BTreeMap<PartitionId, EpochEndOffset>, ClientError> {
        Ok(requested
            .into_keys()
            .map(|tp| {
                let response = self
                    .epoch_end_offsets
                    .get(&tp)
                    .map(|v| *v)
                    .unwrap_or_else(EpochEndOffset::undefined);
                (tp, response)
            })
            .collect())
    }

    async fn fetch_latest_offset(&self, tp: &PartitionId, _current_leader_epoch: i32) -> Result<i64, ClientError> {
        Ok(self.latest_offsets.get(tp).map(|v| *v).unwrap_or(0))
    }

    async fn fetch_earliest_offset(&self, tp: &PartitionId, _current_leader_epoch: i32) -> Result<i64, ClientError> {
        Ok(self.earliest_offsets.get(tp).map(|v| *v).unwrap_or(0))
    }
}

#[derive(Default)]
pub struct FakeLogAccessor {
    log_end_offsets: DashMap<PartitionId, i64>,
    latest_epochs: DashMap<PartitionId, i32>,
    end_offsets_for_epoch: DashMap<(PartitionId, i32), OffsetAndEpoch>,
    process_responses: DashMap<PartitionId, Mutex<VecDeque<LogAppendInfo>>>,
    pub truncations: DashMap<PartitionId, Vec<OffsetTruncationState>>,
    pub truncate_fully_calls: DashMap<PartitionId, Vec<i64>>,
}

impl FakeLogAccessor {
    pub fn set_log_end_offset(&self, tp: &PartitionId, offset: i64) {
        self.log_end_offsets.insert(tp.clone(), offset);
    }

    pub fn set_latest_epoch(&self, tp: &PartitionId, epoch: i32) {
        self.latest_epochs.insert(tp.clone(), epoch);
    }

    pub fn set_end_offset_for_epoch(&self, tp: &PartitionId, epoch: i32, value: OffsetAndEpoch) {
        self.end_offsets_for_epoch.insert((tp.clone(), epoch), value);
    }

    pub fn push_process_partition_data_response(&self, tp: &PartitionId, info: LogAppendInfo) {
        self.process_responses
            .entry(tp.clone())
            .or_insert_with(|| Mutex::new(VecDeque::new()))
            .lock()
            .unwrap()
            .push_back(info);
    }
}

/// `FetcherCore` owns its collaborators by value, so a test that wants to
/// script a fake *after* constructing the core it belongs to needs a shared
/// handle rather than the bare fake. Cloning an `Arc` handle is cheap and
/// every clone observes the same interior state.
#[derive(Clone, Default)]
pub struct LeaderClientHandle(Arc<FakeLeaderClient>);

impl LeaderClientHandle {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::ops::Deref for LeaderClientHandle {
    type Target = FakeLeaderClient;

    fn deref(&self) -> &FakeLeaderClient {
        &self.0
    }
}

#[async_trait]
impl LeaderClient for LeaderClientHandle {
    fn is_offset_for_leader_epoch_supported(&self) -> bool {
        self.0.is_offset_for_leader_epoch_supported()
    }

    async fn fetch_from_leader(
        &self,
        request: FetchRequest,
    ) -> Result<Vec<(PartitionId, PartitionData)>, ClientError> {
        self.0.fetch_from_leader(request).await
    }

    async fn fetch_epoch_end_offsets(
        &self,
        requested: BTreeMap<PartitionId, EpochData>,
    ) -> Result<BTreeMap<PartitionId, EpochEndOffset>, ClientError> {
        self.0.fetch_epoch_end_offsets(requested).await
    }

    async fn fetch_latest_offset(&self, tp: &PartitionId, current_leader_epoch: i32) -> Result<i64, ClientError> {
        self.0.fetch_latest_offset(tp, current_leader_epoch).await
    }

    async fn fetch_earliest_offset(&self, tp: &PartitionId, current_leader_epoch: i32) -> Result<i64, ClientError> {
        self.0.fetch_earliest_offset(tp, current_leader_epoch).await
    }
}

#[derive(Clone, Default)]
pub struct LogAccessorHandle(Arc<FakeLogAccessor>);

impl LogAccessorHandle {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::ops::Deref for LogAccessorHandle {
    type Target = FakeLogAccessor;

    fn deref(&self) -> &FakeLogAccessor {
        &self.0
    }
}

impl LogAccessor for LogAccessorHandle {
    fn process_partition_data(
        &self,
        tp: &PartitionId,
        fetch_offset: i64,
        data: &PartitionData,
    ) -> Result<Option<LogAppendInfo>, LogError> {
        self.0.process_partition_data(tp, fetch_offset, data)
    }

    fn truncate(&self, tp: &PartitionId, to: OffsetTruncationState) -> Result<(), LogError> {
        self.0.truncate(tp, to)
    }

    fn truncate_fully_and_start_at(&self, tp: &PartitionId, offset: i64) -> Result<(), LogError> {
        self.0.truncate_fully_and_start_at(tp, offset)
    }

    fn latest_epoch(&self, tp: &PartitionId) -> Option<i32> {
        self.0.latest_epoch(tp)
    }

    fn log_end_offset(&self, tp: &PartitionId) -> i64 {
        self.0.log_end_offset(tp)
    }

    fn end_offset_for_epoch(&self, tp: &PartitionId, epoch: i32) -> Option<OffsetAndEpoch> {
        self.0.end_offset_for_epoch(tp, epoch)
    }

    fn build_fetch(&self, table: &PartitionStateTable) -> (Option<FetchRequest>, Vec<PartitionId>) {
        self.0.build_fetch(table)
    }
}

impl LogAccessor for FakeLogAccessor {
    fn process_partition_data(
        &self,
        tp: &PartitionId,
        _fetch_offset: i64,
        _data: &PartitionData,
    ) -> Result<Option<LogAppendInfo>, LogError> {
        let next = self.process_responses.get(tp).and_then(|q| q.lock().unwrap().pop_front());
        Ok(next)
    }

    fn truncate(&self, tp: &PartitionId, to: OffsetTruncationState) -> Result<(), LogError> {
        self.truncations.entry(tp.clone()).or_default().push(to);
        Ok(())
    }

    fn truncate_fully_and_start_at(&self, tp: &PartitionId, offset: i64) -> Result<(), LogError> {
        self.truncate_fully_calls.entry(tp.clone()).or_default().push(offset);
        Ok(())
    }

    fn latest_epoch(&self, tp: &PartitionId) -> Option<i32> {
        self.latest_epochs.get(tp).map(|v| *v)
    }

    fn log_end_offset(&self, tp: &PartitionId) -> i64 {
        self.log_end_offsets.get(tp).map(|v| *v).unwrap_or(0)
    }

    fn end_offset_for_epoch(&self, tp: &PartitionId, epoch: i32) -> Option<OffsetAndEpoch> {
        self.end_offsets_for_epoch.get(&(tp.clone(), epoch)).map(|v| *v)
    }

    fn build_fetch(&self, table: &PartitionStateTable) -> (Option<FetchRequest>, Vec<PartitionId>) {
        let partitions: Vec<PartitionId> = table
            .stream()
            .filter(|(_, state)| state.is_ready_for_fetch())
            .map(|(tp, _)| tp.clone())
            .collect();
        if partitions.is_empty() {
            (None, Vec::new())
        } else {
            (Some(FetchRequest { partitions }), Vec::new())
        }
    }
}
