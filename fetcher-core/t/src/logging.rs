// Copyright © 2024 The Fetcher Core Contributors
//
// This file is part of fetcher-core, distributed under the terms of the
// GPL-3.0-or-later license. For full terms see the included LICENSE file.

//! Test-only logging init, simplified from the teacher's own
//! `crates/test/src/logging.rs`: capture `tracing` output as part of the
//! test harness's output instead of letting it print unbuffered. `RUST_LOG`
//! is honored if set; otherwise we default to `debug` so a failing scenario
//! carries the `warn!`/`debug!` breadcrumbs `FetcherCore` emits.

use std::env;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub fn init() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "debug");
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .finish();

    // Scenario tests run concurrently on the same process; whichever sets
    // the subscriber first wins. We only want *a* capturing subscriber
    // installed, not one per test.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
