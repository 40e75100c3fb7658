// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! Rate meters and a per-partition lag gauge, tagged the way
//! `readyset-client-metrics` tags its counters: by the dimensions a
//! dashboard would group on, not by a free-form string key. `radicle-link`
//! itself carries no metrics dependency; the `metrics` crate is imported
//! from the wider example pack for this one ambient concern.
//!
//! These are read by the metrics subsystem from outside the fetcher's
//! event-loop thread while being written from inside it; the `metrics`
//! crate's recorder handles that concurrency for us, so there's nothing
//! here for the core to lock.

use crate::partition::PartitionId;

/// Static tag set for one fetcher: `(clientId, brokerHost, brokerPort)`.
#[derive(Clone, Debug)]
pub struct MetricLabels {
    pub client_id: String,
    pub broker_host: String,
    pub broker_port: u16,
}

impl MetricLabels {
    pub fn new(client_id: impl Into<String>, broker_host: impl Into<String>, broker_port: u16) -> Self {
        Self {
            client_id: client_id.into(),
            broker_host: broker_host.into(),
            broker_port,
        }
    }

    fn broker_port_label(&self) -> String {
        self.broker_port.to_string()
    }

    pub fn requests_per_sec(&self) {
        metrics::counter!(
            "replica_fetcher_requests_total",
            "client_id" => self.client_id.clone(),
            "broker_host" => self.broker_host.clone(),
            "broker_port" => self.broker_port_label(),
        )
        .increment(1);
    }

    pub fn request_failures_per_sec(&self) {
        metrics::counter!(
            "replica_fetcher_request_failures_total",
            "client_id" => self.client_id.clone(),
            "broker_host" => self.broker_host.clone(),
            "broker_port" => self.broker_port_label(),
        )
        .increment(1);
    }

    pub fn bytes_per_sec(&self, valid_bytes: i64) {
        if valid_bytes <= 0 {
            return;
        }
        metrics::counter!(
            "replica_fetcher_bytes_total",
            "client_id" => self.client_id.clone(),
            "broker_host" => self.broker_host.clone(),
            "broker_port" => self.broker_port_label(),
        )
        .increment(valid_bytes as u64);
    }

    /// `FetcherLag{clientId, topic, partition}`: `max(0, highWatermark - nextOffset)`.
    pub fn set_fetcher_lag(&self, tp: &PartitionId, lag: i64) {
        metrics::gauge!(
            "replica_fetcher_lag",
            "client_id" => self.client_id.clone(),
            "topic" => tp.topic.clone(),
            "partition" => tp.partition.to_string(),
        )
        .set(lag.max(0) as f64);
    }

    /// Unclean leader election windows are accepted, not repaired, but
    /// must be observable rather than silently swallowed.
    pub fn unclean_leader_election(&self, tp: &PartitionId) {
        metrics::counter!(
            "replica_fetcher_unclean_leader_elections_total",
            "client_id" => self.client_id.clone(),
            "topic" => tp.topic.clone(),
            "partition" => tp.partition.to_string(),
        )
        .increment(1);
    }

    /// Removing a partition also removes its lag metric.
    pub fn remove_fetcher_lag(&self, tp: &PartitionId) {
        metrics::gauge!(
            "replica_fetcher_lag",
            "client_id" => self.client_id.clone(),
            "topic" => tp.topic.clone(),
            "partition" => tp.partition.to_string(),
        )
        .set(0.0);
    }
}
