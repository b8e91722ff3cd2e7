// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// eSCL client and request executor.
//
// `EsclClient::execute` is the single choke point for every request: it adds
// the identifying headers, sends the request through the configured
// transport, and turns any status outside the caller's accepted set into a
// descriptive `UnexpectedStatus` error that quotes the device's own message
// when that message is printable text.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::header::{CONTENT_TYPE, HOST, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::{Position, Url};

use scanwerk_core::config::ClientConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::DiscoveredScanner;

use crate::dialer::{DialContext, FallbackDialer};
use crate::observer::{NoopObserver, ScanObserver};
use crate::transport::{HttpTransport, ResponseBody, TlsSettings, Transport};

/// Upper bound on how much of an error body is read for the message.
const ERROR_BODY_LIMIT: usize = 64 * 1024;

/// Placeholder used when the device's error body is not plain text.
pub const NON_PRINTABLE_BODY: &str = "<non-printable body>";

/// Assembles an [`EsclClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    address: String,
    candidates: Option<Vec<String>>,
    config: ClientConfig,
    observer: Arc<dyn ScanObserver>,
    cancel: CancellationToken,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// `address` is the logical device address, `host` or `host:port`. It is
    /// what the `Host` header names, whatever address is actually dialed.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            candidates: None,
            config: ClientConfig::default(),
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
            transport: None,
        }
    }

    /// Builder for a discovered device.
    ///
    /// The device's host name is the logical address; the dialer falls back
    /// from it to the mDNS name and then the advertised IPs. The record's
    /// resource path and TLS flag override `config`.
    pub fn for_service(scanner: &DiscoveredScanner, mut config: ClientConfig) -> Result<Self> {
        config.use_tls = config.use_tls || scanner.tls;
        config.resource_path = scanner.resource_path.clone();
        let host = if scanner.host.is_empty() {
            scanner
                .addresses
                .first()
                .map(|ip| match ip {
                    IpAddr::V6(v6) => format!("[{v6}]"),
                    IpAddr::V4(v4) => v4.to_string(),
                })
                .ok_or(ScanwerkError::NoCandidates)?
        } else {
            scanner.host.clone()
        };
        Ok(Self::new(format!("{host}:{}", scanner.port))
            .candidates(scanner.candidates())
            .config(config))
    }

    /// Dial these `host:port` candidates instead of the logical address.
    pub fn candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Token that aborts dials, requests and retry back-offs when cancelled.
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use a custom transport. Candidates and TLS settings are then ignored.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<EsclClient> {
        let scheme = if self.config.use_tls { "https" } else { "http" };
        let raw = format!("{scheme}://{}/", self.address.trim_end_matches('/'));
        let base = Url::parse(&raw).map_err(|e| ScanwerkError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if base.path() != "/" || base.query().is_some() {
            return Err(ScanwerkError::InvalidUrl {
                url: raw,
                reason: "address must be host or host:port".into(),
            });
        }
        let host = base
            .host_str()
            .ok_or_else(|| ScanwerkError::InvalidUrl {
                url: raw.clone(),
                reason: "no host".into(),
            })?
            .to_string();

        let host_header = match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.clone(),
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let port = base.port_or_known_default().unwrap_or(80);
                let candidates = self
                    .candidates
                    .unwrap_or_else(|| vec![format!("{host}:{port}")]);
                let dialer = FallbackDialer::new(candidates, self.config.connect_timeout())
                    .with_observer(self.observer.clone());
                let tls = if self.config.use_tls {
                    let server_name = host.trim_start_matches('[').trim_end_matches(']');
                    Some(TlsSettings::new(server_name, self.config.skip_cert_verify)?)
                } else {
                    None
                };
                Arc::new(HttpTransport::new(dialer, tls)) as Arc<dyn Transport>
            }
        };

        debug!(base = %base, "eSCL client ready");
        Ok(EsclClient {
            base,
            host_header,
            config: self.config,
            transport,
            observer: self.observer,
            cancel: self.cancel,
        })
    }
}

/// Client for one eSCL device.
#[derive(Debug)]
pub struct EsclClient {
    /// `scheme://host[:port]/`
    base: Url,
    host_header: String,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn ScanObserver>,
    cancel: CancellationToken,
}

impl EsclClient {
    /// Client for a device at `address` with default settings.
    pub fn new(address: &str) -> Result<Self> {
        ClientBuilder::new(address).build()
    }

    /// Client for a discovered device with default hooks.
    pub fn for_service(scanner: &DiscoveredScanner, config: ClientConfig) -> Result<Self> {
        ClientBuilder::for_service(scanner, config)?.build()
    }

    pub fn builder(address: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(address)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Value of the `Host` header on every request.
    pub fn host(&self) -> &str {
        &self.host_header
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn observer(&self) -> &Arc<dyn ScanObserver> {
        &self.observer
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// URL of an eSCL endpoint, e.g. `endpoint("ScannerStatus")`.
    pub fn endpoint(&self, name: &str) -> Result<Url> {
        let prefix = self.config.resource_path.trim_matches('/');
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        };
        self.base.join(&path).map_err(|e| ScanwerkError::InvalidUrl {
            url: format!("{}{path}", self.base),
            reason: e.to_string(),
        })
    }

    /// Resolve a job `Location` against the request that created it, then
    /// point it back at this client's own host and port.
    ///
    /// The scheme is forced to the client's own scheme as well, so a device
    /// that advertises `http://` locations while spoken to over TLS is still
    /// reached over TLS.
    pub fn rebase_location(&self, request_url: &Url, location: &str) -> Result<Url> {
        let missing = |reason: String| ScanwerkError::MissingLocation(format!("{location:?}: {reason}"));

        let mut url = request_url.join(location).map_err(|e| missing(e.to_string()))?;
        url.set_scheme(self.base.scheme())
            .map_err(|()| missing(format!("cannot use scheme {}", self.base.scheme())))?;
        url.set_host(self.base.host_str())
            .map_err(|e| missing(e.to_string()))?;
        url.set_port(self.base.port())
            .map_err(|()| missing("cannot set port".into()))?;
        Ok(url)
    }

    /// Send one request and check its status.
    ///
    /// A status in `accept` is returned as-is, body unread. Anything else
    /// becomes [`ScanwerkError::UnexpectedStatus`]. Network failures are
    /// returned as transport-class errors.
    #[instrument(skip(self, url, body, accept), fields(url = %url))]
    pub async fn execute(
        &self,
        method: Method,
        url: &Url,
        body: Option<Bytes>,
        accept: &[StatusCode],
    ) -> Result<Response<ResponseBody>> {
        let ctx = DialContext::new(self.cancel.clone());
        self.send(method, url, body, accept, &ctx).await
    }

    /// Like [`execute`](Self::execute), but not tied to the client's
    /// cancellation token. The whole exchange is bounded by `timeout`
    /// instead. Used for job teardown, which must still reach the device
    /// after a scan was interrupted.
    pub async fn execute_detached(
        &self,
        method: Method,
        url: &Url,
        body: Option<Bytes>,
        accept: &[StatusCode],
        timeout: Duration,
    ) -> Result<Response<ResponseBody>> {
        let ctx = DialContext::new(CancellationToken::new()).with_timeout(timeout);
        tokio::time::timeout(timeout, self.send(method, url, body, accept, &ctx))
            .await
            .map_err(|_| ScanwerkError::DeadlineExceeded)?
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<Bytes>,
        accept: &[StatusCode],
        ctx: &DialContext,
    ) -> Result<Response<ResponseBody>> {
        let request = self.build_request(&method, url, body)?;
        self.observer.request_sent(&method, url.as_str());

        let response = tokio::select! {
            biased;
            _ = ctx.cancel_token().cancelled() => return Err(ScanwerkError::Cancelled),
            result = self.transport.execute(request, ctx) => result?,
        };

        let status = response.status();
        self.observer.response_received(&method, url.as_str(), status);
        debug!(%status, "response");
        if accept.contains(&status) {
            return Ok(response);
        }

        let message = error_message(response.into_body()).await;
        Err(ScanwerkError::UnexpectedStatus {
            url: url.to_string(),
            code: status.as_u16(),
            status: status.to_string(),
            message,
            want: describe_accepted(accept),
        })
    }

    fn build_request(
        &self,
        method: &Method,
        url: &Url,
        body: Option<Bytes>,
    ) -> Result<Request<Full<Bytes>>> {
        let target = &url[Position::BeforePath..];
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(target)
            .header(HOST, self.host_header.as_str())
            .header(USER_AGENT, self.config.user_agent.as_str());
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "text/xml");
        }
        builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| ScanwerkError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Read a whole response body.
pub async fn collect_body(body: ResponseBody) -> Result<Bytes> {
    body.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| ScanwerkError::Http(format!("reading response body: {e}")))
}

/// Best-effort text of an error response.
async fn error_message(body: ResponseBody) -> String {
    let bytes = match Limited::new(body, ERROR_BODY_LIMIT).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(error = %e, "could not read error body");
            return String::new();
        }
    };
    match std::str::from_utf8(&bytes) {
        Ok(text) if is_printable(text.trim()) => text.trim().to_string(),
        _ => NON_PRINTABLE_BODY.to_string(),
    }
}

/// Whether every character is visible text or a plain space.
pub fn is_printable(text: &str) -> bool {
    text.chars()
        .all(|c| !c.is_control() && (c == ' ' || !c.is_whitespace()))
}

fn describe_accepted(accept: &[StatusCode]) -> String {
    match accept {
        [single] => single.as_u16().to_string(),
        many => {
            let codes: Vec<String> = many.iter().map(|s| s.as_u16().to_string()).collect();
            format!("one of [{}]", codes.join(" "))
        }
    }
}
