// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! The single consumer that drains a fetcher's bus.
//!
//! One tokio task per fetcher loops `event := bus.take(); core.process(event)`;
//! nothing else ever touches that fetcher's core.

use crate::bus::{FetcherEventBus, FetcherEventBusCloser, FetcherEventBusHandle};
use crate::client::LeaderClient;
use crate::core::{CoreAction, FetcherCore};
use crate::log_accessor::LogAccessor;

/// Owns the spawned consumer task for one fetcher and lets the holder post
/// events into its bus or shut it down.
pub struct FetcherEventLoop {
    bus_handle: FetcherEventBusHandle,
    closer: FetcherEventBusCloser,
    task: tokio::task::JoinHandle<()>,
}

impl FetcherEventLoop {
    /// Spawn the consumer task owning `core` and a fresh bus, kick off its
    /// first `TruncateAndFetch` cycle, and return a handle to it.
    pub fn spawn<L, G>(mut core: FetcherCore<L, G>) -> Self
    where
        L: LeaderClient + 'static,
        G: LogAccessor + 'static,
    {
        let mut bus = FetcherEventBus::new();
        let bus_handle = bus.handle();
        let closer = bus.closer();

        bus.put(crate::event::FetcherEvent::TruncateAndFetch);

        let task = tokio::spawn(async move {
            while let Some(event) = bus.take().await {
                match core.process(event).await {
                    CoreAction::None => {},
                    CoreAction::RequeueImmediate => {
                        bus.put(crate::event::FetcherEvent::TruncateAndFetch);
                    },
                    CoreAction::RequeueAfter(delay) => {
                        bus.schedule(delay);
                    },
                }
            }
        });

        Self {
            bus_handle,
            closer,
            task,
        }
    }

    pub fn handle(&self) -> FetcherEventBusHandle {
        self.bus_handle.clone()
    }

    /// Unblock the bus, then wait for the consumer to drain whatever
    /// `process` call was in flight and exit.
    pub async fn close(self) {
        self.closer.close();
        let _ = self.task.await;
    }
}
