// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fallback dialer for devices reachable under several names.
//
// A discovered scanner can usually be addressed as its DHCP-DNS name, its
// mDNS name, and one or more raw IP addresses. Depending on the local network
// (no DNS registration, no mDNS resolver, stale leases) only some of these
// work. The dialer tries them in order and moves whichever one connected to
// the front, so the next request goes straight to the path that last worked.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use scanwerk_core::error::{Result, ScanwerkError};

use crate::observer::{NoopObserver, ScanObserver};

/// Cancellation and deadline for one dial.
#[derive(Debug, Clone, Default)]
pub struct DialContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl DialContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Give up on every remaining candidate once `deadline` passes.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Outcome of a single candidate.
enum Attempt {
    Connected(TcpStream),
    /// This candidate failed; the next one may still work.
    Failed(ScanwerkError),
    /// Stop dialing altogether.
    Aborted(ScanwerkError),
}

/// Ordered, self-reordering list of `host:port` candidates for one device.
#[derive(Debug)]
pub struct FallbackDialer {
    /// Held for the whole dial (connect + reorder).
    candidates: Mutex<Vec<String>>,
    connect_timeout: Duration,
    observer: Arc<dyn ScanObserver>,
}

impl FallbackDialer {
    pub fn new(candidates: Vec<String>, connect_timeout: Duration) -> Self {
        Self {
            candidates: Mutex::new(candidates),
            connect_timeout,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Snapshot of the current trial order.
    pub async fn candidates(&self) -> Vec<String> {
        self.candidates.lock().await.clone()
    }

    /// Connect to the first reachable candidate.
    ///
    /// Returns the stream and the candidate that produced it. On success that
    /// candidate becomes the first one tried next time; the others keep their
    /// relative order. If every candidate fails, the last candidate's error is
    /// returned.
    #[instrument(skip_all)]
    pub async fn connect(&self, ctx: &DialContext) -> Result<(TcpStream, String)> {
        let mut candidates = self.candidates.lock().await;
        if candidates.is_empty() {
            return Err(ScanwerkError::NoCandidates);
        }

        let mut last_err = None;
        for idx in 0..candidates.len() {
            if ctx.is_cancelled() {
                return Err(ScanwerkError::Cancelled);
            }
            if ctx.expired() {
                return Err(ScanwerkError::DeadlineExceeded);
            }

            let candidate = candidates[idx].clone();
            self.observer.dial_attempt(&candidate);
            debug!(candidate = %candidate, "dialing");

            match self.dial_one(&candidate, idx + 1, ctx).await {
                Attempt::Connected(stream) => {
                    let hit = candidates.remove(idx);
                    candidates.insert(0, hit);
                    self.observer.dial_succeeded(&candidate);
                    debug!(candidate = %candidate, "connected");
                    return Ok((stream, candidate));
                }
                Attempt::Aborted(err) => return Err(err),
                Attempt::Failed(err) => {
                    self.observer.dial_failed(&candidate, &err);
                    debug!(candidate = %candidate, error = %err, "candidate failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or(ScanwerkError::NoCandidates))
    }

    async fn dial_one(&self, candidate: &str, attempts: usize, ctx: &DialContext) -> Attempt {
        let connect = tokio::time::timeout(self.connect_timeout, TcpStream::connect(candidate));
        let deadline = async {
            match ctx.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Attempt::Aborted(ScanwerkError::Cancelled),
            _ = deadline => Attempt::Aborted(ScanwerkError::DeadlineExceeded),
            result = connect => match result {
                Ok(Ok(stream)) => Attempt::Connected(stream),
                Ok(Err(source)) => Attempt::Failed(ScanwerkError::Connect {
                    candidate: candidate.to_string(),
                    attempts,
                    source,
                }),
                Err(_elapsed) => Attempt::Failed(ScanwerkError::ConnectTimeout {
                    candidate: candidate.to_string(),
                    timeout: self.connect_timeout,
                }),
            },
        }
    }
}

/// Reachability of one candidate.
#[derive(Debug, Clone)]
pub struct CandidateProbe {
    pub candidate: String,
    pub reachable: bool,
    pub error: Option<String>,
}

/// Dial every candidate concurrently and report which ones answer.
///
/// Unlike [`FallbackDialer::connect`] this does not stop at the first
/// success; it is meant for diagnosing which naming schemes work on the
/// current network. Results come back in input order.
pub async fn probe_candidates(candidates: &[String], timeout: Duration) -> Vec<CandidateProbe> {
    let mut set = JoinSet::new();
    for (idx, candidate) in candidates.iter().cloned().enumerate() {
        set.spawn(async move {
            let result = tokio::time::timeout(timeout, TcpStream::connect(candidate.as_str())).await;
            let error = match result {
                Ok(Ok(_stream)) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("timed out after {timeout:?}")),
            };
            (
                idx,
                CandidateProbe {
                    reachable: error.is_none(),
                    candidate,
                    error,
                },
            )
        });
    }

    let mut results: Vec<(usize, CandidateProbe)> = Vec::with_capacity(candidates.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => debug!(error = %e, "probe task failed"),
        }
    }
    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, probe)| probe).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use tokio::net::TcpListener;

    #[derive(Debug, Default)]
    struct DialLog(StdMutex<Vec<String>>);

    impl ScanObserver for DialLog {
        fn dial_attempt(&self, candidate: &str) {
            self.0.lock().unwrap().push(candidate.to_string());
        }
    }

    /// An address nothing listens on: bind, note the port, release it.
    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    async fn open_port() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    fn dialer(candidates: Vec<String>) -> FallbackDialer {
        FallbackDialer::new(candidates, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn concurrent_connects_share_one_candidate_order() {
        let (_listener, good) = open_port().await;
        let bad = closed_port().await;
        let dialer = Arc::new(dialer(vec![bad.clone(), good.clone()]));

        let mut set = JoinSet::new();
        for _ in 0..8 {
            let dialer = dialer.clone();
            set.spawn(async move {
                dialer
                    .connect(&DialContext::default())
                    .await
                    .map(|(_stream, used)| used)
            });
        }
        while let Some(joined) = set.join_next().await {
            assert_eq!(joined.unwrap().unwrap(), good);
        }

        assert_eq!(dialer.candidates().await, vec![good, bad]);
    }

    #[tokio::test]
    async fn falls_back_to_reachable_candidate_and_prefers_it() {
        let (_listener, good) = open_port().await;
        let bad = closed_port().await;
        let dialer = dialer(vec![bad.clone(), good.clone()]);

        let (_stream, used) = dialer.connect(&DialContext::default()).await.unwrap();
        assert_eq!(used, good);
        assert_eq!(dialer.candidates().await, vec![good.clone(), bad.clone()]);

        // Second dial goes straight to the winner.
        let log = Arc::new(DialLog::default());
        let dialer = FallbackDialer {
            observer: log.clone(),
            ..dialer
        };
        let (_stream, used) = dialer.connect(&DialContext::default()).await.unwrap();
        assert_eq!(used, good);
        assert_eq!(*log.0.lock().unwrap(), vec![good]);
    }

    #[tokio::test]
    async fn reorder_keeps_relative_order_of_the_rest() {
        let (_listener, good) = open_port().await;
        let a = closed_port().await;
        let b = closed_port().await;
        let c = closed_port().await;
        let dialer = dialer(vec![a.clone(), b.clone(), good.clone(), c.clone()]);

        dialer.connect(&DialContext::default()).await.unwrap();
        assert_eq!(dialer.candidates().await, vec![good, a, b, c]);
    }

    #[tokio::test]
    async fn all_unreachable_reports_last_candidate() {
        let first = closed_port().await;
        let last = closed_port().await;
        let dialer = dialer(vec![first.clone(), last.clone()]);

        let err = dialer.connect(&DialContext::default()).await.unwrap_err();
        match err {
            ScanwerkError::Connect {
                candidate, attempts, ..
            } => {
                assert_eq!(candidate, last);
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing connected, so nothing moved.
        assert_eq!(dialer.candidates().await, vec![first, last]);
    }

    #[tokio::test]
    async fn empty_list_is_an_error() {
        let err = dialer(vec![]).connect(&DialContext::default()).await.unwrap_err();
        assert!(matches!(err, ScanwerkError::NoCandidates));
    }

    #[tokio::test]
    async fn cancelled_context_tries_nothing() {
        let (_listener, good) = open_port().await;
        let log = Arc::new(DialLog::default());
        let dialer = dialer(vec![good]).with_observer(log.clone());

        let token = CancellationToken::new();
        token.cancel();
        let err = dialer.connect(&DialContext::new(token)).await.unwrap_err();
        assert!(matches!(err, ScanwerkError::Cancelled));
        assert!(log.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_deadline_tries_nothing() {
        let (_listener, good) = open_port().await;
        let dialer = dialer(vec![good]);

        let ctx = DialContext::default().with_deadline(Instant::now() - Duration::from_millis(1));
        let err = dialer.connect(&ctx).await.unwrap_err();
        assert!(matches!(err, ScanwerkError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn probe_reports_each_candidate_in_order() {
        let (_listener, good) = open_port().await;
        let bad = closed_port().await;

        let results = probe_candidates(&[bad.clone(), good.clone()], Duration::from_secs(5)).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].candidate, bad);
        assert!(!results[0].reachable);
        assert!(results[0].error.is_some());
        assert_eq!(results[1].candidate, good);
        assert!(results[1].reachable);
    }
}
