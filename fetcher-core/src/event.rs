// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! `FetcherEvent` and the priority rule that lets control pre-empt data.

use std::collections::BTreeMap;

use tokio::sync::oneshot;

use crate::partition::{BrokerIdAndFetcherId, OffsetAndEpoch, PartitionId};

/// Higher value wins. Baked into the variant rather than expressed as a
/// virtual method: a tagged enum is the more idiomatic sum type here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Data = 1,
    Control = 2,
}

/// What the manager attaches to a partition it wants this fetcher to take
/// on: the offset/epoch to start from, and which (broker, fetcher) slot it
/// was addressed to. The fetcher must ignore entries addressed elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FollowerPartitionStateInFetcher {
    pub broker_id_and_fetcher_id: BrokerIdAndFetcherId,
    pub offset_and_epoch: OffsetAndEpoch,
}

impl FollowerPartitionStateInFetcher {
    pub fn new(broker_id_and_fetcher_id: BrokerIdAndFetcherId, offset_and_epoch: OffsetAndEpoch) -> Self {
        Self {
            broker_id_and_fetcher_id,
            offset_and_epoch,
        }
    }
}

/// The two event kinds this core's event loop ever dispatches.
pub enum FetcherEvent {
    /// Run one truncate/fetch cycle.
    TruncateAndFetch,
    /// Add or remove partitions. `completion` is fulfilled with the
    /// resulting table size once applied; it never fails.
    ModifyPartitions {
        to_remove: Vec<PartitionId>,
        to_add: BTreeMap<PartitionId, FollowerPartitionStateInFetcher>,
        completion: oneshot::Sender<usize>,
    },
}

impl FetcherEvent {
    pub fn priority(&self) -> Priority {
        match self {
            FetcherEvent::TruncateAndFetch => Priority::Data,
            FetcherEvent::ModifyPartitions { .. } => Priority::Control,
        }
    }
}
