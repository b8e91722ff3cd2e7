// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-client observation hooks.
//
// A client is built with one observer. The default does nothing; the CLI's
// `--debug` flag swaps in `TracingObserver`, and tests use recording
// observers to count dials and requests.

use std::fmt::Debug;

use hyper::{Method, StatusCode};
use tracing::info;

use scanwerk_core::error::ScanwerkError;

use crate::job::JobState;

/// Hooks called at every suspension point of the engine.
///
/// All methods have empty default bodies so implementors only override what
/// they care about.
pub trait ScanObserver: Send + Sync + Debug {
    fn dial_attempt(&self, _candidate: &str) {}

    fn dial_failed(&self, _candidate: &str, _error: &ScanwerkError) {}

    fn dial_succeeded(&self, _candidate: &str) {}

    fn request_sent(&self, _method: &Method, _url: &str) {}

    fn response_received(&self, _method: &Method, _url: &str, _status: StatusCode) {}

    /// A transient "not ready" answer; `attempt` counts from 1.
    fn retry_scheduled(&self, _attempt: u32, _limit: u32) {}

    fn job_state_changed(&self, _location: &str, _from: JobState, _to: JobState) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// Observer that forwards every hook to `tracing` at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ScanObserver for TracingObserver {
    fn dial_attempt(&self, candidate: &str) {
        info!(candidate, "trying candidate");
    }

    fn dial_failed(&self, candidate: &str, error: &ScanwerkError) {
        info!(candidate, error = %error, "candidate unreachable");
    }

    fn dial_succeeded(&self, candidate: &str) {
        info!(candidate, "connected");
    }

    fn request_sent(&self, method: &Method, url: &str) {
        info!("{method} {url}");
    }

    fn response_received(&self, method: &Method, url: &str, status: StatusCode) {
        info!("{method} {url} -> {status}");
    }

    fn retry_scheduled(&self, attempt: u32, limit: u32) {
        info!("ServiceUnavailable: will retry (try {attempt}/{limit})");
    }

    fn job_state_changed(&self, location: &str, from: JobState, to: JobState) {
        info!(location, ?from, ?to, "scan job state changed");
    }
}
