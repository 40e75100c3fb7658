// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! Error taxonomy. These are *kinds*, not a single flat type: the core
//! branches on specific variants (fenced epoch, out-of-range, ...), so each
//! collaborator gets its own enum with named cases for what the core
//! actually inspects, plus a transparent catch-all for everything else,
//! the same shape as `link-replication::error`.

use thiserror::Error;

/// Type-erased error for conditions the core does not need to distinguish
/// any further than "something went wrong, retry or give up".
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors a [`crate::client::LeaderClient`] RPC may fail with.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error("leader epoch {requested} is fenced by a newer epoch")]
    FencedLeaderEpoch { requested: i32 },

    #[error("unknown topic or partition")]
    UnknownTopicOrPartition,

    #[error("unknown leader epoch")]
    UnknownLeaderEpoch,

    #[error("not leader for partition")]
    NotLeaderForPartition,

    #[error(transparent)]
    Other(#[from] BoxError),
}

/// Errors a [`crate::log_accessor::LogAccessor`] operation may fail with.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogError {
    #[error("storage error")]
    Storage(#[source] BoxError),

    #[error(transparent)]
    Other(#[from] BoxError),
}

// Per-partition outcomes carried inside a fetch response are data returned
// alongside a successful RPC, not an RPC failure. Those live in
// [`crate::client::FetchError`], not here.
