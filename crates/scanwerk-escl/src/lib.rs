// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk eSCL engine.
//
// Talks to AirScan/eSCL scanners: finds them over mDNS, reaches them through
// whichever of their names or addresses works, negotiates scan settings, and
// streams scanned pages back to the caller.

pub mod client;
pub mod codec;
pub mod dialer;
pub mod discovery;
pub mod job;
pub mod observer;
pub mod preset;
pub mod probe;
pub mod testing;
pub mod transport;

pub use client::{ClientBuilder, EsclClient};
pub use dialer::{CandidateProbe, DialContext, FallbackDialer, probe_candidates};
pub use discovery::ScannerDiscovery;
pub use job::{JobState, Page, ScanJob};
pub use observer::{NoopObserver, ScanObserver, TracingObserver};
pub use transport::{HttpTransport, ResponseBody, TlsSettings, Transport};
