// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan job negotiation and page iteration.
//
// `EsclClient::scan` validates and encodes the settings, checks the device's
// status and capabilities, and only then creates the job. The returned
// `ScanJob` is a small state machine:
//
//   Negotiating -> Created -> (PageReady <-> Waiting) -> Exhausted
//                       any -> Failed
//                       any -> Closed   (after `close`)
//
// The first error is kept for good: once a job has failed, `scan_page` no
// longer touches the network and only `close` is useful.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::{CONTENT_TYPE, LOCATION};
use hyper::{Method, Response, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};
use url::Url;

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{
    ADF_LOADED, DeviceStatus, InputSource, STATE_IDLE, ScanSettings, ScannerCapabilities,
};

use crate::client::EsclClient;
use crate::codec;
use crate::transport::ResponseBody;

/// How often `NextDocument` is asked before a 503 streak is fatal.
pub const NEXT_DOCUMENT_TRIES: u32 = 10;

/// Pause between two `NextDocument` attempts after a 503.
pub const NEXT_DOCUMENT_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound on the `DELETE` that tears a job down.
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a scan job stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Settings are being checked against the device; no job exists yet.
    Negotiating,
    /// The device accepted the job; no page requested yet.
    Created,
    /// A `NextDocument` request is in flight (including 503 back-off).
    Waiting,
    /// `current_page` holds a page.
    PageReady,
    /// The device reported that no pages are left.
    Exhausted,
    /// An error was recorded; see `ScanJob::err`.
    Failed,
    /// The job was deleted on the device.
    Closed,
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// The device must be idle, and a feeder scan needs paper in the feeder
/// (when the device reports a feeder state at all).
pub fn check_status(settings: &ScanSettings, status: &DeviceStatus) -> Result<()> {
    if status.state != STATE_IDLE {
        return Err(ScanwerkError::NotReady {
            got: status.state.clone(),
            want: STATE_IDLE.into(),
        });
    }
    if settings.input_source == InputSource::Feeder {
        if let Some(adf_state) = &status.adf_state {
            if adf_state != ADF_LOADED {
                return Err(ScanwerkError::FeederEmpty {
                    got: adf_state.clone(),
                    want: ADF_LOADED.into(),
                });
            }
        }
    }
    Ok(())
}

/// A feeder scan needs a feeder with the requested simplex/duplex mode.
pub fn check_capabilities(settings: &ScanSettings, caps: &ScannerCapabilities) -> Result<()> {
    if settings.input_source != InputSource::Feeder {
        return Ok(());
    }
    let adf = caps.adf.as_ref().ok_or(ScanwerkError::NoFeeder)?;
    if settings.duplex && adf.duplex.is_none() {
        return Err(ScanwerkError::DuplexUnsupported);
    }
    if !settings.duplex && adf.simplex.is_none() {
        return Err(ScanwerkError::SimplexUnsupported);
    }
    Ok(())
}

impl EsclClient {
    /// Negotiate and create a scan job.
    ///
    /// Nothing is sent to `ScanJobs` unless every pre-flight check passes.
    #[instrument(skip_all, fields(host = %self.host(), source = ?settings.input_source, duplex = settings.duplex))]
    pub async fn scan(&self, settings: &ScanSettings) -> Result<ScanJob<'_>> {
        settings.validate()?;
        let body = codec::encode_settings(settings)?;

        let status = self.scanner_status().await?;
        check_status(settings, &status)?;

        let caps = self.scanner_capabilities().await?;
        check_capabilities(settings, &caps)?;

        let url = self.endpoint("ScanJobs")?;
        let response = self
            .execute(Method::POST, &url, Some(Bytes::from(body)), &[StatusCode::CREATED])
            .await?;
        let location = location_header(&response)?;
        let location = self.rebase_location(&url, &location)?;

        info!(location = %location, "scan job created");
        self.observer()
            .job_state_changed(location.as_str(), JobState::Negotiating, JobState::Created);
        Ok(ScanJob::new(self, location))
    }

    /// Take over an existing job by its location, e.g. one created by an
    /// earlier run that was interrupted.
    pub fn attach_job(&self, location: &str) -> Result<ScanJob<'_>> {
        let jobs = self.endpoint("ScanJobs")?;
        let location = self.rebase_location(&jobs, location)?;
        Ok(ScanJob::new(self, location))
    }
}

fn location_header(response: &Response<ResponseBody>) -> Result<String> {
    let value = response
        .headers()
        .get(LOCATION)
        .ok_or_else(|| ScanwerkError::MissingLocation("no Location header".into()))?;
    let value = value
        .to_str()
        .map_err(|e| ScanwerkError::MissingLocation(format!("Location is not text: {e}")))?
        .trim();
    if value.is_empty() {
        return Err(ScanwerkError::MissingLocation("empty Location header".into()));
    }
    Ok(value.to_string())
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One scanned page, streamed straight from the device.
pub struct Page {
    number: u32,
    content_type: Option<String>,
    body: ResponseBody,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("number", &self.number)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl Page {
    fn new(number: u32, response: Response<ResponseBody>) -> Self {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self {
            number,
            content_type,
            body: response.into_body(),
        }
    }

    /// 1-based position within the job.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// `Content-Type` the device sent, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Next chunk of page data, or `None` at the end of the page.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        while let Some(frame) = self.body.frame().await {
            let frame = frame.map_err(|e| ScanwerkError::Http(format!("reading page: {e}")))?;
            if let Ok(data) = frame.into_data() {
                if !data.is_empty() {
                    return Ok(Some(data));
                }
            }
        }
        Ok(None)
    }

    /// Read the rest of the page into memory.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Stream the rest of the page into `writer`; returns the byte count.
    pub async fn copy_to<W: AsyncWrite + Unpin>(&mut self, writer: &mut W) -> Result<u64> {
        let mut written = 0u64;
        while let Some(chunk) = self.chunk().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(written)
    }
}

/// An in-progress scan job on the device.
pub struct ScanJob<'a> {
    client: &'a EsclClient,
    location: Url,
    state: JobState,
    error: Option<ScanwerkError>,
    page: Option<Page>,
    pages: u32,
}

impl fmt::Debug for ScanJob<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanJob")
            .field("location", &self.location.as_str())
            .field("state", &self.state)
            .field("error", &self.error)
            .field("pages", &self.pages)
            .finish_non_exhaustive()
    }
}

impl<'a> ScanJob<'a> {
    fn new(client: &'a EsclClient, location: Url) -> Self {
        Self {
            client,
            location,
            state: JobState::Created,
            error: None,
            page: None,
            pages: 0,
        }
    }

    /// Job URL, already pointing at the host this client dials.
    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// The first error this job ran into, if any.
    pub fn err(&self) -> Option<&ScanwerkError> {
        self.error.as_ref()
    }

    /// Consume the job and hand back its first error.
    pub fn into_err(self) -> Option<ScanwerkError> {
        self.error
    }

    /// Pages received so far.
    pub fn pages_received(&self) -> u32 {
        self.pages
    }

    /// The page made available by the last successful `scan_page`.
    pub fn current_page(&mut self) -> Option<&mut Page> {
        self.page.as_mut()
    }

    /// Request the next page.
    ///
    /// Returns `true` when a new page is available via [`current_page`]. A
    /// `false` return means either the job is exhausted (`err()` is `None`)
    /// or it failed (`err()` says why). The previous page is dropped either
    /// way.
    ///
    /// [`current_page`]: ScanJob::current_page
    pub async fn scan_page(&mut self) -> bool {
        match self.state {
            JobState::Failed | JobState::Exhausted => return false,
            JobState::Closed => {
                let err = ScanwerkError::JobClosed(self.location.to_string());
                self.fail(err);
                return false;
            }
            _ => {}
        }
        if self.error.is_some() {
            return false;
        }

        self.page = None;
        match self.next_document().await {
            Ok(Some(response)) => {
                self.pages += 1;
                self.page = Some(Page::new(self.pages, response));
                self.transition(JobState::PageReady);
                true
            }
            Ok(None) => {
                debug!(pages = self.pages, "all pages received");
                self.transition(JobState::Exhausted);
                false
            }
            Err(err) => {
                self.fail(err);
                false
            }
        }
    }

    #[instrument(skip(self), fields(location = %self.location))]
    async fn next_document(&mut self) -> Result<Option<Response<ResponseBody>>> {
        let url = self.next_document_url();
        self.transition(JobState::Waiting);

        let observer = self.client.observer().clone();
        let cancel = self.client.cancellation_token().clone();
        let accept = [
            StatusCode::OK,
            StatusCode::NOT_FOUND,
            StatusCode::SERVICE_UNAVAILABLE,
        ];

        for attempt in 1..=NEXT_DOCUMENT_TRIES {
            let response = self.client.execute(Method::GET, &url, None, &accept).await?;
            match response.status() {
                StatusCode::NOT_FOUND => return Ok(None),
                StatusCode::SERVICE_UNAVAILABLE => {
                    drop(response);
                    debug!("ServiceUnavailable: will retry (try {attempt}/{NEXT_DOCUMENT_TRIES})");
                    observer.retry_scheduled(attempt, NEXT_DOCUMENT_TRIES);
                    if attempt < NEXT_DOCUMENT_TRIES {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(ScanwerkError::Cancelled),
                            _ = tokio::time::sleep(NEXT_DOCUMENT_BACKOFF) => {}
                        }
                    }
                }
                _ => return Ok(Some(response)),
            }
        }

        Err(ScanwerkError::RetryLimit(NEXT_DOCUMENT_TRIES))
    }

    fn next_document_url(&self) -> Url {
        let mut url = self.location.clone();
        let path = format!("{}/NextDocument", self.location.path().trim_end_matches('/'));
        url.set_path(&path);
        url
    }

    /// Delete the job on the device.
    ///
    /// A 404 counts as success, so closing twice (or closing a job the device
    /// already forgot) is fine. This works in every state, including after a
    /// failure or after the client's cancellation token fired; the request
    /// is bounded by [`TEARDOWN_TIMEOUT`] instead.
    #[instrument(skip(self), fields(location = %self.location))]
    pub async fn close(&mut self) -> Result<()> {
        self.page = None;
        debug!("deleting scan job");
        self.client
            .execute_detached(
                Method::DELETE,
                &self.location,
                None,
                &[StatusCode::OK, StatusCode::NO_CONTENT, StatusCode::NOT_FOUND],
                TEARDOWN_TIMEOUT,
            )
            .await?;
        self.transition(JobState::Closed);
        Ok(())
    }

    fn fail(&mut self, err: ScanwerkError) {
        if self.error.is_none() {
            warn!(location = %self.location, error = %err, "scan job failed");
            self.error = Some(err);
        }
        if self.state != JobState::Closed {
            self.transition(JobState::Failed);
        }
    }

    fn transition(&mut self, to: JobState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.client
            .observer()
            .job_state_changed(self.location.as_str(), from, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use hyper::header::LOCATION;
    use scanwerk_core::types::{AdfCaps, InputCaps};
    use tokio_util::sync::CancellationToken;

    use crate::client::ClientBuilder;
    use crate::observer::ScanObserver;
    use crate::preset;
    use crate::testing::{ScriptedResponse, ScriptedTransport, capabilities_xml, status_xml};

    #[derive(Debug, Default)]
    struct Recorder {
        retries: Mutex<Vec<u32>>,
        states: Mutex<Vec<(JobState, JobState)>>,
    }

    impl ScanObserver for Recorder {
        fn retry_scheduled(&self, attempt: u32, _limit: u32) {
            self.retries.lock().unwrap().push(attempt);
        }

        fn job_state_changed(&self, _location: &str, from: JobState, to: JobState) {
            self.states.lock().unwrap().push((from, to));
        }
    }

    fn ok(body: impl Into<Bytes>) -> ScriptedResponse {
        ScriptedResponse::new(StatusCode::OK).body(body)
    }

    fn created(location: &str) -> ScriptedResponse {
        ScriptedResponse::new(StatusCode::CREATED).header(LOCATION, location)
    }

    fn client(transport: &Arc<ScriptedTransport>) -> EsclClient {
        ClientBuilder::new("scanner")
            .transport(transport.clone())
            .build()
            .unwrap()
    }

    fn status(state: &str, adf_state: Option<&str>) -> DeviceStatus {
        DeviceStatus {
            version: "2.63".into(),
            state: state.into(),
            adf_state: adf_state.map(str::to_string),
        }
    }

    #[test]
    fn busy_scanner_is_not_ready() {
        let err = check_status(&preset::grayscale_a4_adf(), &status("Processing", None)).unwrap_err();
        match err {
            ScanwerkError::NotReady { got, want } => {
                assert_eq!(got, "Processing");
                assert_eq!(want, "Idle");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn feeder_state_only_matters_for_feeder_scans() {
        let feeder = preset::grayscale_a4_adf();
        let mut platen = preset::grayscale_a4_adf();
        platen.input_source = InputSource::Platen;
        let empty = status("Idle", Some("ScannerAdfEmpty"));

        assert!(matches!(
            check_status(&feeder, &empty),
            Err(ScanwerkError::FeederEmpty { .. })
        ));
        assert!(check_status(&platen, &empty).is_ok());
        assert!(check_status(&feeder, &status("Idle", None)).is_ok());
        assert!(check_status(&feeder, &status("Idle", Some(ADF_LOADED))).is_ok());
    }

    #[test]
    fn capability_checks() {
        let mut settings = preset::grayscale_a4_adf();
        let no_adf = ScannerCapabilities::default();
        assert!(matches!(
            check_capabilities(&settings, &no_adf),
            Err(ScanwerkError::NoFeeder)
        ));

        let simplex_only = ScannerCapabilities {
            adf: Some(AdfCaps {
                simplex: Some(InputCaps::default()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            check_capabilities(&settings, &simplex_only),
            Err(ScanwerkError::DuplexUnsupported)
        ));

        settings.duplex = false;
        assert!(check_capabilities(&settings, &simplex_only).is_ok());

        let duplex_only = ScannerCapabilities {
            adf: Some(AdfCaps {
                duplex: Some(InputCaps::default()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            check_capabilities(&settings, &duplex_only),
            Err(ScanwerkError::SimplexUnsupported)
        ));

        settings.input_source = InputSource::Platen;
        assert!(check_capabilities(&settings, &no_adf).is_ok());
    }

    #[tokio::test]
    async fn invalid_settings_never_reach_the_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(&transport);
        let mut settings = preset::grayscale_a4_adf();
        settings.regions.clear();

        let err = client.scan(&settings).await.unwrap_err();
        assert!(matches!(err, ScanwerkError::InvalidSettings(_)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn empty_feeder_fails_before_job_creation() {
        let transport = Arc::new(
            ScriptedTransport::new().respond(ok(status_xml("Idle", Some("ScannerAdfEmpty")))),
        );
        let client = client(&transport);

        let err = client.scan(&preset::grayscale_a4_adf()).await.unwrap_err();
        assert!(matches!(err, ScanwerkError::FeederEmpty { .. }));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests.iter().all(|r| r.method != Method::POST));
    }

    #[tokio::test]
    async fn missing_duplex_fails_before_job_creation() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(ok(status_xml("Idle", Some(ADF_LOADED))))
                .respond(ok(capabilities_xml(true, true, false))),
        );
        let client = client(&transport);

        let err = client.scan(&preset::grayscale_a4_adf()).await.unwrap_err();
        assert!(matches!(err, ScanwerkError::DuplexUnsupported));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn full_job_yields_pages_in_order() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(ok(status_xml("Idle", Some(ADF_LOADED))))
                .respond(ok(capabilities_xml(true, true, true)))
                .respond(created("http://192.168.1.50:8080/eSCL/ScanJobs/abc"))
                .respond(ok("first page").header(CONTENT_TYPE, "image/jpeg"))
                .respond(ok("second page"))
                .status(StatusCode::NOT_FOUND)
                .status(StatusCode::NOT_FOUND),
        );
        let client = client(&transport);

        let mut job = client.scan(&preset::grayscale_a4_adf()).await.unwrap();
        assert_eq!(job.state(), JobState::Created);
        assert_eq!(job.location().as_str(), "http://scanner/eSCL/ScanJobs/abc");

        let mut pages = Vec::new();
        while job.scan_page().await {
            let page = job.current_page().unwrap();
            if page.number() == 1 {
                assert_eq!(page.content_type(), Some("image/jpeg"));
            }
            pages.push(page.read_to_end().await.unwrap());
        }
        assert!(job.err().is_none());
        assert_eq!(job.state(), JobState::Exhausted);
        assert_eq!(pages, vec![b"first page".to_vec(), b"second page".to_vec()]);

        job.close().await.unwrap();
        assert_eq!(job.state(), JobState::Closed);

        let requests = transport.requests();
        let post = &requests[2];
        assert_eq!(post.method, Method::POST);
        assert_eq!(post.path, "/eSCL/ScanJobs");
        let sent = String::from_utf8(post.body.to_vec()).unwrap();
        assert!(sent.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>"));

        for request in &requests[3..6] {
            assert_eq!(request.method, Method::GET);
            assert_eq!(request.path, "/eSCL/ScanJobs/abc/NextDocument");
        }
        assert_eq!(requests[6].method, Method::DELETE);
        assert_eq!(requests[6].path, "/eSCL/ScanJobs/abc");
        assert!(requests.iter().all(|r| r.host.as_deref() == Some("scanner")));
    }

    #[tokio::test]
    async fn missing_location_is_an_error() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(ok(status_xml("Idle", None)))
                .respond(ok(capabilities_xml(true, false, false)))
                .status(StatusCode::CREATED),
        );
        let client = client(&transport);
        let mut settings = preset::grayscale_a4_adf();
        settings.input_source = InputSource::Platen;
        settings.duplex = false;

        let err = client.scan(&settings).await.unwrap_err();
        assert!(matches!(err, ScanwerkError::MissingLocation(_)));
    }

    #[tokio::test]
    async fn relative_location_is_resolved() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(ok(status_xml("Idle", None)))
                .respond(ok(capabilities_xml(true, false, false)))
                .respond(created("/eSCL/ScanJobs/7")),
        );
        let client = client(&transport);
        let mut settings = preset::grayscale_a4_adf();
        settings.input_source = InputSource::Platen;

        let job = client.scan(&settings).await.unwrap();
        assert_eq!(job.location().as_str(), "http://scanner/eSCL/ScanJobs/7");
    }

    #[tokio::test(start_paused = true)]
    async fn one_busy_answer_is_retried_transparently() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .status(StatusCode::SERVICE_UNAVAILABLE)
                .respond(ok("page")),
        );
        let client = client(&transport);
        let mut job = client.attach_job("/eSCL/ScanJobs/1").unwrap();

        let started = tokio::time::Instant::now();
        assert!(job.scan_page().await);
        assert!(started.elapsed() >= NEXT_DOCUMENT_BACKOFF);
        assert!(job.err().is_none());
        let bytes = job.current_page().unwrap().read_to_end().await.unwrap();
        assert_eq!(bytes, b"page");
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_limit_is_exact_and_sticky() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(
            ScriptedTransport::new().repeat(StatusCode::SERVICE_UNAVAILABLE, NEXT_DOCUMENT_TRIES as usize),
        );
        let client = ClientBuilder::new("scanner")
            .transport(transport.clone())
            .observer(recorder.clone())
            .build()
            .unwrap();
        let mut job = client.attach_job("/eSCL/ScanJobs/1").unwrap();

        assert!(!job.scan_page().await);
        assert!(matches!(job.err(), Some(ScanwerkError::RetryLimit(10))));
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(transport.request_count(), NEXT_DOCUMENT_TRIES as usize);
        assert_eq!(*recorder.retries.lock().unwrap(), (1..=10).collect::<Vec<u32>>());

        // No further network calls, same error.
        assert!(!job.scan_page().await);
        assert_eq!(transport.request_count(), NEXT_DOCUMENT_TRIES as usize);
        assert!(matches!(job.err(), Some(ScanwerkError::RetryLimit(10))));

        // Teardown is still allowed.
        transport.enqueue(ScriptedResponse::new(StatusCode::NOT_FOUND));
        job.close().await.unwrap();
        assert_eq!(job.state(), JobState::Closed);
        assert!(matches!(job.err(), Some(ScanwerkError::RetryLimit(10))));

        let states = recorder.states.lock().unwrap().clone();
        assert_eq!(
            states,
            vec![
                (JobState::Created, JobState::Waiting),
                (JobState::Waiting, JobState::Failed),
                (JobState::Failed, JobState::Closed),
            ]
        );
    }

    #[tokio::test]
    async fn network_error_is_sticky() {
        let transport = Arc::new(ScriptedTransport::new().fail("connection reset"));
        let client = client(&transport);
        let mut job = client.attach_job("/eSCL/ScanJobs/1").unwrap();

        assert!(!job.scan_page().await);
        assert!(matches!(job.err(), Some(ScanwerkError::Http(_))));
        assert!(!job.scan_page().await);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn unexpected_status_fails_the_job() {
        let transport = Arc::new(ScriptedTransport::new().status(StatusCode::CONFLICT));
        let client = client(&transport);
        let mut job = client.attach_job("/eSCL/ScanJobs/1").unwrap();

        assert!(!job.scan_page().await);
        assert_eq!(job.err().and_then(|e| e.status_code()), Some(409));
        assert_eq!(job.state(), JobState::Failed);
    }

    #[tokio::test]
    async fn closing_twice_is_fine() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .status(StatusCode::NOT_FOUND)
                .status(StatusCode::NOT_FOUND),
        );
        let client = client(&transport);
        let mut job = client.attach_job("/eSCL/ScanJobs/1").unwrap();

        job.close().await.unwrap();
        job.close().await.unwrap();
        assert_eq!(transport.request_count(), 2);
        assert!(job.err().is_none());
    }

    #[tokio::test]
    async fn failed_delete_is_reported() {
        let transport = Arc::new(ScriptedTransport::new().status(StatusCode::INTERNAL_SERVER_ERROR));
        let client = client(&transport);
        let mut job = client.attach_job("/eSCL/ScanJobs/1").unwrap();

        let err = job.close().await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        assert_ne!(job.state(), JobState::Closed);
    }

    #[tokio::test]
    async fn scanning_a_closed_job_is_an_error_without_network() {
        let transport = Arc::new(ScriptedTransport::new().status(StatusCode::NO_CONTENT));
        let client = client(&transport);
        let mut job = client.attach_job("/eSCL/ScanJobs/1").unwrap();

        job.close().await.unwrap();
        assert!(!job.scan_page().await);
        assert!(matches!(job.err(), Some(ScanwerkError::JobClosed(_))));
        assert_eq!(job.state(), JobState::Closed);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_page_requests() {
        let transport = Arc::new(ScriptedTransport::new().respond(ok("page")));
        let cancel = CancellationToken::new();
        let client = ClientBuilder::new("scanner")
            .transport(transport.clone())
            .cancellation_token(cancel.clone())
            .build()
            .unwrap();
        let mut job = client.attach_job("/eSCL/ScanJobs/1").unwrap();

        cancel.cancel();
        assert!(!job.scan_page().await);
        assert!(matches!(job.err(), Some(ScanwerkError::Cancelled)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_back_off() {
        let transport = Arc::new(
            ScriptedTransport::new().repeat(StatusCode::SERVICE_UNAVAILABLE, 10),
        );
        let cancel = CancellationToken::new();
        let client = ClientBuilder::new("scanner")
            .transport(transport.clone())
            .cancellation_token(cancel.clone())
            .build()
            .unwrap();
        let mut job = client.attach_job("/eSCL/ScanJobs/1").unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });

        assert!(!job.scan_page().await);
        assert!(matches!(job.err(), Some(ScanwerkError::Cancelled)));
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn page_can_be_streamed_into_a_writer() {
        let transport = Arc::new(ScriptedTransport::new().respond(ok(vec![7u8; 4096])));
        let client = client(&transport);
        let mut job = client.attach_job("http://elsewhere/eSCL/ScanJobs/9").unwrap();
        assert_eq!(job.location().as_str(), "http://scanner/eSCL/ScanJobs/9");

        assert!(job.scan_page().await);
        let mut sink = Vec::new();
        let written = job.current_page().unwrap().copy_to(&mut sink).await.unwrap();
        assert_eq!(written, 4096);
        assert_eq!(sink, vec![7u8; 4096]);
    }

    #[tokio::test]
    async fn first_error_outlives_teardown() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .status(StatusCode::NO_CONTENT),
        );
        let client = client(&transport);
        let mut job = client.attach_job("/eSCL/ScanJobs/3").unwrap();

        assert!(!job.scan_page().await);
        job.close().await.unwrap();
        assert_eq!(job.state(), JobState::Closed);

        let err = job.into_err().unwrap();
        assert_eq!(err.status_code(), Some(500));
    }

    #[tokio::test]
    async fn interrupted_job_is_still_deleted() {
        let transport = Arc::new(ScriptedTransport::new().status(StatusCode::NOT_FOUND));
        let cancel = CancellationToken::new();
        let client = ClientBuilder::new("scanner")
            .transport(transport.clone())
            .cancellation_token(cancel.clone())
            .build()
            .unwrap();
        let mut job = client.attach_job("/eSCL/ScanJobs/5").unwrap();

        cancel.cancel();
        assert!(!job.scan_page().await);
        assert!(matches!(job.err(), Some(ScanwerkError::Cancelled)));
        assert_eq!(transport.request_count(), 0);

        job.close().await.unwrap();
        assert_eq!(job.state(), JobState::Closed);
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::DELETE);
        assert_eq!(requests[0].path, "/eSCL/ScanJobs/5");
        assert!(matches!(job.err(), Some(ScanwerkError::Cancelled)));
    }
}
