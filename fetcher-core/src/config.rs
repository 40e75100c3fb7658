// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! Plain, typed configuration with sane defaults. No file-loading layer:
//! the concrete network client and manager thread pool that would consume
//! such config are out of scope, so this is just the shape the embedder
//! fills in, following `node-lib::cfg`'s preference for typed structs over
//! stringly-typed maps.

use std::time::Duration;

/// The source broker a fetcher pulls from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceBroker {
    pub id: i32,
    pub host: String,
    pub port: u16,
}

impl SourceBroker {
    pub fn new(id: i32, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }
}

/// Per-fetcher configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicaFetcherConfig {
    pub client_id: String,
    pub source_broker: SourceBroker,
    pub fetcher_id: u32,
    pub fetch_back_off_ms: u64,
    pub num_replica_fetchers: u32,
}

impl ReplicaFetcherConfig {
    pub fn new(client_id: impl Into<String>, source_broker: SourceBroker, fetcher_id: u32) -> Self {
        Self {
            client_id: client_id.into(),
            source_broker,
            fetcher_id,
            ..Self::default_tunables()
        }
    }

    pub fn fetch_back_off(&self) -> Duration {
        Duration::from_millis(self.fetch_back_off_ms)
    }

    fn default_tunables() -> Self {
        Self {
            client_id: String::new(),
            source_broker: SourceBroker::new(0, "", 0),
            fetcher_id: 0,
            fetch_back_off_ms: Self::DEFAULT_FETCH_BACK_OFF_MS,
            num_replica_fetchers: Self::DEFAULT_NUM_REPLICA_FETCHERS,
        }
    }
}

impl ReplicaFetcherConfig {
    const DEFAULT_FETCH_BACK_OFF_MS: u64 = 1_000;
    const DEFAULT_NUM_REPLICA_FETCHERS: u32 = 1;
}

impl Default for ReplicaFetcherConfig {
    fn default() -> Self {
        Self::default_tunables()
    }
}
