// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! The set of partitions this fetcher has given up on.
//!
//! A partition enters on any non-retriable exception during truncate or
//! append and leaves only when the manager re-adds it via
//! `ModifyPartitions.to_add` (`add_partitions` removes from here
//! unconditionally). This decouples transient retry (handled entirely by
//! delay/back-off) from permanent quarantine.
//!
//! The manager may read this set for status queries from outside the
//! fetcher's event-loop thread, so it must be concurrency-safe even though
//! every *write* happens to originate from that one thread.
//! [`dashmap::DashSet`] gives us that without introducing a coarse lock
//! around an otherwise single-writer structure.

use dashmap::DashSet;

use crate::partition::PartitionId;

#[derive(Default)]
pub struct FailedPartitions {
    inner: DashSet<PartitionId>,
}

impl FailedPartitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, tp: PartitionId) {
        self.inner.insert(tp);
    }

    pub fn contains(&self, tp: &PartitionId) -> bool {
        self.inner.contains(tp)
    }

    /// Remove every member of `tps`, ignoring ones that weren't present.
    pub fn remove_all<'a, I>(&self, tps: I)
    where
        I: IntoIterator<Item = &'a PartitionId>,
    {
        for tp in tps {
            self.inner.remove(tp);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}
