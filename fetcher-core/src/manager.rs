// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! The thin map from source broker to running fetcher.
//!
//! Maintains `(source_broker_id, fetcher_id) -> FetcherCore`.
//! `parking_lot::RwLock` guards that map: reads (status queries, posting an
//! event to an existing fetcher) vastly outnumber writes (creating or
//! retiring a fetcher), the same lock `link-git::refs::db` reaches for
//! around its ref-db registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::client::LeaderClient;
use crate::config::{ReplicaFetcherConfig, SourceBroker};
use crate::core::FetcherCore;
use crate::event::{FetcherEvent, FollowerPartitionStateInFetcher};
use crate::event_loop::FetcherEventLoop;
use crate::log_accessor::LogAccessor;
use crate::metrics::MetricLabels;
use crate::partition::{BrokerIdAndFetcherId, PartitionId};

/// Builds the collaborators for a newly created fetcher. The manager itself
/// is agnostic to how a `LeaderClient`/`LogAccessor` pair for a given source
/// broker is constructed; that's supplied by the embedder.
pub trait FetcherCollaborators<L, G>: Send + Sync
where
    L: LeaderClient,
    G: LogAccessor,
{
    fn make_client(&self, source_broker: &SourceBroker) -> L;
    fn make_log_accessor(&self, source_broker: &SourceBroker) -> G;
}

pub struct FetcherManager<L, G, C> {
    client_id: String,
    fetch_back_off_ms: u64,
    num_replica_fetchers: u32,
    collaborators: Arc<C>,
    fetchers: RwLock<BTreeMap<BrokerIdAndFetcherId, FetcherEventLoop>>,
    _marker: std::marker::PhantomData<fn() -> (L, G)>,
}

impl<L, G, C> FetcherManager<L, G, C>
where
    L: LeaderClient + 'static,
    G: LogAccessor + 'static,
    C: FetcherCollaborators<L, G>,
{
    pub fn new(client_id: impl Into<String>, fetch_back_off_ms: u64, num_replica_fetchers: u32, collaborators: C) -> Self {
        Self {
            client_id: client_id.into(),
            fetch_back_off_ms,
            num_replica_fetchers,
            collaborators: Arc::new(collaborators),
            fetchers: RwLock::new(BTreeMap::new()),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn fetcher_count(&self) -> usize {
        self.fetchers.read().len()
    }

    /// Build a fresh `FetcherCore` for `source_broker` and spawn its event loop.
    pub fn create_fetcher_thread(&self, fetcher_id: u32, source_broker: SourceBroker) {
        let destination = BrokerIdAndFetcherId::new(source_broker.id, fetcher_id);
        let config = ReplicaFetcherConfig {
            client_id: self.client_id.clone(),
            source_broker: source_broker.clone(),
            fetcher_id,
            fetch_back_off_ms: self.fetch_back_off_ms,
            num_replica_fetchers: self.num_replica_fetchers,
        };
        let metrics = MetricLabels::new(self.client_id.clone(), source_broker.host.clone(), source_broker.port);
        let client = self.collaborators.make_client(&source_broker);
        let log = self.collaborators.make_log_accessor(&source_broker);
        let core = FetcherCore::new(config, client, log, metrics);

        tracing::debug!(?destination, "starting fetcher thread");
        let event_loop = FetcherEventLoop::spawn(core);
        self.fetchers.write().insert(destination, event_loop);
    }

    /// Route each partition's follower-state update to its owning fetcher,
    /// then shut down any fetcher left with no partitions.
    pub async fn modify_partitions_and_shutdown_idle_fetchers(
        &self,
        to_make_follower: BTreeMap<PartitionId, FollowerPartitionStateInFetcher>,
    ) {
        let mut grouped: BTreeMap<BrokerIdAndFetcherId, BTreeMap<PartitionId, FollowerPartitionStateInFetcher>> =
            BTreeMap::new();
        for (tp, state) in to_make_follower {
            grouped.entry(state.broker_id_and_fetcher_id).or_default().insert(tp, state);
        }

        let mut idle = Vec::new();
        for (destination, group) in grouped {
            let handle = self.fetchers.read().get(&destination).map(|f| f.handle());
            let Some(handle) = handle else {
                tracing::warn!(?destination, "modify_partitions addressed to an unknown fetcher, dropping");
                continue;
            };

            let (completion, result) = tokio::sync::oneshot::channel();
            handle.put(FetcherEvent::ModifyPartitions {
                to_remove: Vec::new(),
                to_add: group,
                completion,
            });

            if let Ok(0) = result.await {
                idle.push(destination);
            }
        }

        for destination in idle {
            let event_loop = self.fetchers.write().remove(&destination);
            if let Some(event_loop) = event_loop {
                tracing::debug!(?destination, "shutting down idle fetcher");
                event_loop.close().await;
            }
        }
    }
}
