// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! The truncate/fetch/append state machine.
//!
//! `FetcherCore` is generic over its two collaborators rather than an
//! inheritance hierarchy with a replica-specific subclass. The
//! source-specific behavior lives entirely in the `L`/`G` implementations,
//! the same move `link-replication` makes generalizing its engine over
//! `Refdb`/`Net`.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::client::{EpochData, EpochEndOffset, EpochEndOffsetError, FetchError, LeaderClient};
use crate::config::ReplicaFetcherConfig;
use crate::error::ClientError;
use crate::event::{FetcherEvent, FollowerPartitionStateInFetcher};
use crate::failed::FailedPartitions;
use crate::log_accessor::LogAccessor;
use crate::metrics::MetricLabels;
use crate::partition::{
    BrokerIdAndFetcherId,
    OffsetTruncationState,
    PartitionFetchState,
    PartitionId,
    ReplicaState,
    UNDEFINED_EPOCH,
    UNDEFINED_EPOCH_OFFSET,
};
use crate::state_table::PartitionStateTable;

/// What the event loop should do with its bus after a call to [`FetcherCore::process`]
/// returns. Scheduling itself is the event loop's job (it's the only thing
/// that holds the bus mutably); the core only reports the verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreAction {
    /// `ModifyPartitions` was handled; nothing further to arm.
    None,
    /// Re-arm `TruncateAndFetch` right away (progress was made).
    RequeueImmediate,
    /// Re-arm `TruncateAndFetch` after the configured back-off (nothing to do this cycle).
    RequeueAfter(Duration),
}

pub struct FetcherCore<L, G> {
    config: ReplicaFetcherConfig,
    client: L,
    log: G,
    table: PartitionStateTable,
    failed: FailedPartitions,
    metrics: MetricLabels,
}

impl<L, G> FetcherCore<L, G>
where
    L: LeaderClient,
    G: LogAccessor,
{
    pub fn new(config: ReplicaFetcherConfig, client: L, log: G, metrics: MetricLabels) -> Self {
        Self {
            config,
            client,
            log,
            table: PartitionStateTable::new(),
            failed: FailedPartitions::new(),
            metrics,
        }
    }

    pub fn table(&self) -> &PartitionStateTable {
        &self.table
    }

    pub fn failed(&self) -> &FailedPartitions {
        &self.failed
    }

    fn destination(&self) -> BrokerIdAndFetcherId {
        BrokerIdAndFetcherId::new(self.config.source_broker.id, self.config.fetcher_id)
    }

    /// Dispatch one event: either run a truncate/fetch cycle or apply a
    /// partition-assignment change.
    #[tracing::instrument(
        level = "debug",
        skip(self, event),
        fields(source_broker_id = self.config.source_broker.id, fetcher_id = self.config.fetcher_id),
    )]
    pub async fn process(&mut self, event: FetcherEvent) -> CoreAction {
        match event {
            FetcherEvent::TruncateAndFetch => {
                if self.truncate_and_fetch().await {
                    CoreAction::RequeueAfter(self.config.fetch_back_off())
                } else {
                    CoreAction::RequeueImmediate
                }
            },
            FetcherEvent::ModifyPartitions {
                to_remove,
                to_add,
                completion,
            } => {
                self.remove_partitions(&to_remove);
                let destination = self.destination();
                let filtered: BTreeMap<PartitionId, FollowerPartitionStateInFetcher> = to_add
                    .into_iter()
                    .filter(|(_, state)| state.broker_id_and_fetcher_id == destination)
                    .collect();
                self.add_partitions(filtered).await;
                // Never fails: the receiver simply stops listening if dropped.
                let _ = completion.send(self.table.len());
                CoreAction::None
            },
        }
    }

    async fn truncate_and_fetch(&mut self) -> bool {
        self.maybe_truncate().await;
        self.maybe_fetch().await
    }

    /// Bring newly assigned partitions under management, deriving an
    /// initial fetch offset from the leader when none was supplied.
    async fn add_partitions(&mut self, initial: BTreeMap<PartitionId, FollowerPartitionStateInFetcher>) {
        for (tp, follower_state) in initial {
            self.failed.remove_all([&tp]);

            let epoch = follower_state.offset_and_epoch.leader_epoch;
            if let Some(existing) = self.table.state_value(&tp) {
                if existing.current_leader_epoch == epoch {
                    continue;
                }
            }

            let requested_offset = follower_state.offset_and_epoch.offset;
            let fetch_offset = if requested_offset < 0 {
                match self.fetch_offset_and_truncate(&tp, epoch).await {
                    Ok(offset) => offset,
                    Err(err) => {
                        tracing::warn!(tp = %tp, error = %err, "could not derive initial offset, marking failed");
                        self.mark_partition_failed(&tp);
                        continue;
                    },
                }
            } else {
                requested_offset
            };

            self.table
                .update_and_move_to_end(tp, PartitionFetchState::truncating(fetch_offset, epoch));
        }
    }

    /// Split truncating partitions by whether the leader's epoch protocol
    /// applies to them, then truncate each group accordingly.
    async fn maybe_truncate(&mut self) {
        let mut with_epochs = Vec::new();
        let mut without_epochs = Vec::new();
        for (tp, state) in self.table.stream() {
            if !state.is_truncating() {
                continue;
            }
            if self.log.latest_epoch(tp).is_some() && self.client.is_offset_for_leader_epoch_supported() {
                with_epochs.push(tp.clone());
            } else {
                without_epochs.push(tp.clone());
            }
        }
        self.truncate_to_epoch_end_offsets(with_epochs).await;
        self.truncate_to_high_watermark(without_epochs);
    }

    /// Ask the leader for epoch-end offsets and truncate each partition to
    /// its verdict.
    async fn truncate_to_epoch_end_offsets(&mut self, requested_tps: Vec<PartitionId>) {
        if requested_tps.is_empty() {
            return;
        }

        let mut requested = BTreeMap::new();
        for tp in &requested_tps {
            if let Some(state) = self.table.state_value(tp) {
                let observed = self.log.latest_epoch(tp).unwrap_or(UNDEFINED_EPOCH);
                requested.insert(tp.clone(), EpochData::new(state.current_leader_epoch, observed));
            }
        }

        let responses = match self.client.fetch_epoch_end_offsets(requested.clone()).await {
            Ok(responses) => responses,
            Err(err) => {
                tracing::warn!(error = %err, "fetch_epoch_end_offsets failed, backing off");
                self.delay_partitions(requested.keys(), self.config.fetch_back_off());
                return;
            },
        };

        let mut fetch_offsets: HashMap<PartitionId, (i64, bool)> = HashMap::new();
        let mut retry = Vec::new();
        let mut to_fail = Vec::new();

        for (tp, epoch_end_offset) in responses {
            let requested_epoch = match requested.get(&tp) {
                Some(data) => data.requested_leader_epoch,
                None => continue,
            };
            // The table changed under us since the request went out; retry later.
            let current = match self.table.state_value(&tp) {
                Some(state) => state,
                None => {
                    retry.push(tp);
                    continue;
                },
            };
            if current.current_leader_epoch != requested_epoch {
                retry.push(tp);
                continue;
            }

            match epoch_end_offset.error {
                EpochEndOffsetError::None => {
                    let truncation =
                        self.get_offset_truncation_state(&tp, &epoch_end_offset, current.fetch_offset);
                    match self.log.truncate(&tp, truncation) {
                        Ok(()) => {
                            fetch_offsets.insert(tp, (truncation.offset, truncation.truncation_completed));
                        },
                        Err(err) => {
                            tracing::warn!(tp = %tp, error = %err, "storage error truncating to epoch end offset");
                            to_fail.push(tp);
                        },
                    }
                },
                EpochEndOffsetError::FencedLeaderEpoch => {
                    if current.current_leader_epoch == requested_epoch {
                        to_fail.push(tp);
                    } else {
                        retry.push(tp);
                    }
                },
                _ => retry.push(tp),
            }
        }

        for tp in &to_fail {
            self.mark_partition_failed(tp);
        }
        self.update_fetch_offset_and_maybe_mark_truncation_complete(&fetch_offsets);
        self.delay_partitions(retry.iter(), self.config.fetch_back_off());
    }

    /// Decide where to truncate given the leader's epoch-end offset.
    fn get_offset_truncation_state(
        &self,
        tp: &PartitionId,
        leader: &EpochEndOffset,
        current_fetch_offset: i64,
    ) -> OffsetTruncationState {
        let replica_leo = self.log.log_end_offset(tp);

        if leader.end_offset == UNDEFINED_EPOCH_OFFSET {
            return OffsetTruncationState::new(current_fetch_offset, true);
        }
        if leader.leader_epoch == UNDEFINED_EPOCH {
            return OffsetTruncationState::new(leader.end_offset.min(replica_leo), true);
        }
        match self.log.end_offset_for_epoch(tp, leader.leader_epoch) {
            Some(follower) if follower.leader_epoch == leader.leader_epoch => {
                OffsetTruncationState::new(follower.offset.min(leader.end_offset).min(replica_leo), true)
            },
            Some(follower) => OffsetTruncationState::new(follower.offset.min(replica_leo), false),
            None => OffsetTruncationState::new(leader.end_offset.min(replica_leo), true),
        }
    }

    /// Truncate partitions whose leader doesn't support the epoch protocol
    /// to their locally known high watermark.
    fn truncate_to_high_watermark(&mut self, partitions: Vec<PartitionId>) {
        let mut fetch_offsets = HashMap::new();
        for tp in partitions {
            let state = match self.table.state_value(&tp) {
                Some(state) => state,
                None => continue,
            };
            let truncation = OffsetTruncationState::new(state.fetch_offset, true);
            match self.log.truncate(&tp, truncation) {
                Ok(()) => {
                    fetch_offsets.insert(tp, (truncation.offset, true));
                },
                Err(err) => {
                    tracing::warn!(tp = %tp, error = %err, "storage error truncating to high watermark");
                    self.mark_partition_failed(&tp);
                },
            }
        }
        self.update_fetch_offset_and_maybe_mark_truncation_complete(&fetch_offsets);
    }

    /// Apply the truncation verdicts: advance each partition's fetch offset
    /// and flip it to `Fetching` once its truncation is complete.
    fn update_fetch_offset_and_maybe_mark_truncation_complete(
        &mut self,
        fetch_offsets: &HashMap<PartitionId, (i64, bool)>,
    ) {
        if fetch_offsets.is_empty() {
            return;
        }
        for (tp, state) in self.table.snapshot() {
            if let Some((offset, completed)) = fetch_offsets.get(&tp) {
                let new_state = PartitionFetchState {
                    fetch_offset: *offset,
                    state: if *completed { ReplicaState::Fetching } else { ReplicaState::Truncating },
                    ..state
                };
                self.table.update(tp, new_state);
            }
        }
    }

    /// Build and issue one fetch request for every partition ready to be
    /// fetched; report whether this fetcher should back off.
    async fn maybe_fetch(&mut self) -> bool {
        let (request, build_errors) = self.log.build_fetch(&self.table);
        self.delay_partitions(build_errors.iter(), self.config.fetch_back_off());

        let request = match request {
            Some(request) => request,
            None => return true,
        };

        let snapshot = self.table.snapshot();
        self.process_fetch_request(snapshot, request).await
    }

    /// Apply a fetch response partition by partition, dispatching on each
    /// partition's error code.
    async fn process_fetch_request(
        &mut self,
        snapshot: HashMap<PartitionId, PartitionFetchState>,
        request: crate::client::FetchRequest,
    ) -> bool {
        let response = match self.client.fetch_from_leader(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "fetch_from_leader failed, backing off all partitions");
                self.metrics.request_failures_per_sec();
                let all: Vec<PartitionId> = self.table.keys().cloned().collect();
                self.delay_partitions(all.iter(), self.config.fetch_back_off());
                return true;
            },
        };
        self.metrics.requests_per_sec();

        let mut retry = Vec::new();
        for (tp, data) in response {
            let current = match self.table.state_value(&tp) {
                Some(state) => state,
                None => continue,
            };
            let requested = match snapshot.get(&tp) {
                Some(state) => *state,
                None => continue,
            };
            // Discard if the partition moved under us while the RPC was outstanding.
            if requested.fetch_offset != current.fetch_offset || !current.is_ready_for_fetch() {
                continue;
            }

            match data.error {
                FetchError::None => self.apply_fetched_data(&tp, &current, &data),
                FetchError::CorruptRecord => {
                    tracing::warn!(tp = %tp, "corrupt record batch, scheduling retry");
                    retry.push(tp);
                },
                FetchError::StorageError => self.mark_partition_failed(&tp),
                FetchError::OffsetOutOfRange => {
                    if self.handle_out_of_range_error(&tp, &current, requested.current_leader_epoch).await {
                        retry.push(tp);
                    }
                },
                FetchError::UnknownLeaderEpoch => retry.push(tp),
                FetchError::FencedLeaderEpoch => {
                    if self.on_partition_fenced(&tp, Some(requested.current_leader_epoch)) {
                        retry.push(tp);
                    }
                },
                FetchError::NotLeaderForPartition | FetchError::UnknownTopicOrPartition | FetchError::Other => {
                    retry.push(tp);
                },
            }
        }

        self.delay_partitions(retry.iter(), self.config.fetch_back_off());
        false
    }

    fn apply_fetched_data(
        &mut self,
        tp: &PartitionId,
        current: &PartitionFetchState,
        data: &crate::client::PartitionData,
    ) {
        match self.log.process_partition_data(tp, current.fetch_offset, data) {
            Ok(Some(info)) => {
                let next_offset = if info.valid_bytes > 0 { info.last_offset + 1 } else { current.fetch_offset };
                self.metrics.set_fetcher_lag(tp, info.high_watermark - next_offset);
                if info.valid_bytes > 0 && self.table.contains(tp) {
                    self.table
                        .update_and_move_to_end(tp.clone(), current.with_fetch_offset(next_offset));
                    self.metrics.bytes_per_sec(info.valid_bytes);
                }
            },
            Ok(None) => {},
            Err(err) => {
                tracing::warn!(tp = %tp, error = %err, "storage error applying fetched data");
                self.mark_partition_failed(tp);
            },
        }
    }

    /// Recover from an out-of-range fetch offset by re-deriving it from the
    /// leader.
    async fn handle_out_of_range_error(
        &mut self,
        tp: &PartitionId,
        fetch_state: &PartitionFetchState,
        request_epoch: i32,
    ) -> bool {
        match self.fetch_offset_and_truncate(tp, fetch_state.current_leader_epoch).await {
            Ok(new_offset) => {
                self.table
                    .update_and_move_to_end(tp.clone(), fetch_state.with_fetch_offset(new_offset));
                false
            },
            Err(ClientError::FencedLeaderEpoch { .. }) => self.on_partition_fenced(tp, Some(request_epoch)),
            Err(
                ClientError::UnknownTopicOrPartition | ClientError::UnknownLeaderEpoch | ClientError::NotLeaderForPartition,
            ) => true,
            Err(ClientError::Other(_)) => true,
        }
    }

    /// Derive a fresh fetch offset from the leader and truncate locally to
    /// match. The unclean-leader-election branch accepts divergence rather
    /// than repairing it.
    async fn fetch_offset_and_truncate(&mut self, tp: &PartitionId, current_leader_epoch: i32) -> Result<i64, ClientError> {
        let replica_leo = self.log.log_end_offset(tp);
        let leader_leo = self.client.fetch_latest_offset(tp, current_leader_epoch).await?;

        if leader_leo < replica_leo {
            tracing::warn!(
                tp = %tp,
                leader_leo,
                replica_leo,
                "unclean leader election detected, accepting divergence"
            );
            self.metrics.unclean_leader_election(tp);
            if let Err(err) = self.log.truncate(tp, OffsetTruncationState::new(leader_leo, true)) {
                tracing::warn!(tp = %tp, error = %err, "storage error truncating for unclean leader election");
            }
            return Ok(leader_leo);
        }

        let leader_start_offset = self.client.fetch_earliest_offset(tp, current_leader_epoch).await?;
        if leader_start_offset > replica_leo {
            if let Err(err) = self.log.truncate_fully_and_start_at(tp, leader_start_offset) {
                tracing::warn!(tp = %tp, error = %err, "storage error truncating fully to leader's earliest offset");
            }
            Ok(leader_start_offset)
        } else {
            Ok(leader_start_offset.max(replica_leo))
        }
    }

    /// Handle a fenced-epoch response: fail the partition if the follower
    /// has no newer epoch to retry with, else signal a retry.
    fn on_partition_fenced(&mut self, tp: &PartitionId, request_epoch: Option<i32>) -> bool {
        let current = match self.table.state_value(tp) {
            Some(state) => state,
            None => return false,
        };
        if request_epoch == Some(current.current_leader_epoch) {
            tracing::warn!(tp = %tp, epoch = current.current_leader_epoch, "partition fenced with no newer local epoch");
            self.mark_partition_failed(tp);
            false
        } else {
            true
        }
    }

    /// Back off the given partitions by `delay`, unless already delayed.
    fn delay_partitions<'a, I>(&mut self, partitions: I, delay: Duration)
    where
        I: IntoIterator<Item = &'a PartitionId>,
    {
        let tps: Vec<PartitionId> = partitions.into_iter().cloned().collect();
        for tp in tps {
            if let Some(state) = self.table.state_value(&tp) {
                self.table.update_and_move_to_end(tp, state.delayed(delay));
            }
        }
    }

    /// Drop the given partitions from the table and their lag metric.
    fn remove_partitions(&mut self, partitions: &[PartitionId]) {
        for tp in partitions {
            if self.table.remove(tp).is_some() {
                self.metrics.remove_fetcher_lag(tp);
            }
        }
    }

    fn mark_partition_failed(&mut self, tp: &PartitionId) {
        if self.table.remove(tp).is_some() {
            self.metrics.remove_fetcher_lag(tp);
        }
        self.failed.add(tp.clone());
    }
}
