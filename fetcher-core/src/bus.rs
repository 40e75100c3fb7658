// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! The bus a single consumer drains for one fetcher.
//!
//! Taking the higher of (immediate, expired-delayed) needs to happen
//! atomically. We realize the priority queue as two immediate channels
//! (control and data) rather than a literal binary heap, and let
//! `tokio::select!`'s `biased` ordering encode the priority rule: control
//! is polled before data, and both are polled before an expired delay, so
//! an immediate event always wins over a scheduled one that just expired.
//! Since `ModifyPartitions` is never delayed, this reduces exactly to a
//! two-level priority scheme without needing a general-purpose priority
//! queue.

use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;

use crate::event::FetcherEvent;

pub struct FetcherEventBus {
    control_tx: mpsc::UnboundedSender<FetcherEvent>,
    control_rx: mpsc::UnboundedReceiver<FetcherEvent>,
    data_tx: mpsc::UnboundedSender<FetcherEvent>,
    data_rx: mpsc::UnboundedReceiver<FetcherEvent>,
    delayed: DelayQueue<()>,
    shutdown: CancellationToken,
}

/// A handle that can unblock a bus's `take()` from outside the task that
/// owns it, without needing `&mut` access to the bus itself. Unlike
/// `tokio::sync::Notify`, cancellation is remembered, so a `close()` that
/// arrives before the consumer ever calls `take()` still takes effect.
#[derive(Clone)]
pub struct FetcherEventBusCloser {
    shutdown: CancellationToken,
}

impl FetcherEventBusCloser {
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

/// A handle usable from other tasks/threads to post events into the bus.
/// Cloning is cheap; every clone targets the same underlying queues.
#[derive(Clone)]
pub struct FetcherEventBusHandle {
    control_tx: mpsc::UnboundedSender<FetcherEvent>,
    data_tx: mpsc::UnboundedSender<FetcherEvent>,
}

impl FetcherEventBusHandle {
    pub fn put(&self, event: FetcherEvent) {
        match event.priority() {
            crate::event::Priority::Control => {
                let _ = self.control_tx.send(event);
            },
            crate::event::Priority::Data => {
                let _ = self.data_tx.send(event);
            },
        }
    }
}

impl Default for FetcherEventBus {
    fn default() -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        Self {
            control_tx,
            control_rx,
            data_tx,
            data_rx,
            delayed: DelayQueue::new(),
            shutdown: CancellationToken::new(),
        }
    }
}

impl FetcherEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> FetcherEventBusHandle {
        FetcherEventBusHandle {
            control_tx: self.control_tx.clone(),
            data_tx: self.data_tx.clone(),
        }
    }

    /// A cloneable handle that can close this bus from outside whatever
    /// task owns it.
    pub fn closer(&self) -> FetcherEventBusCloser {
        FetcherEventBusCloser {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Add an immediately-eligible event.
    pub fn put(&self, event: FetcherEvent) {
        match event.priority() {
            crate::event::Priority::Control => {
                let _ = self.control_tx.send(event);
            },
            crate::event::Priority::Data => {
                let _ = self.data_tx.send(event);
            },
        }
    }

    /// Schedule a `TruncateAndFetch` to become eligible after `delay`.
    pub fn schedule(&mut self, delay: Duration) {
        self.delayed.insert((), delay);
    }

    /// Block until either an immediate event is available or the delay
    /// queue's head has expired, whichever comes first, and return it.
    ///
    /// Once [`Self::close`] has fired, data events and scheduled delays are
    /// abandoned: only already-pending control events are drained, so an
    /// in-flight `ModifyPartitions` still completes its caller's future
    /// before the loop exits, but a stale `TruncateAndFetch` never runs.
    pub async fn take(&mut self) -> Option<FetcherEvent> {
        loop {
            if self.shutdown.is_cancelled() {
                return self.control_rx.try_recv().ok();
            }

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => continue,

                Some(ev) = self.control_rx.recv() => {
                    return Some(ev);
                }

                Some(ev) = self.data_rx.recv() => {
                    return Some(ev);
                }

                Some(_) = self.delayed.next() => {
                    return Some(FetcherEvent::TruncateAndFetch);
                }
            }
        }
    }

    /// Unblock any in-progress or future `take()` promptly. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}
