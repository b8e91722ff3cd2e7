// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory transport and device documents for tests.
//
// `ScriptedTransport` replays canned responses in order and records every
// request it receives, so tests can assert on exactly which calls reached the
// "network" (and, just as often, that none did).

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_TYPE, HOST, HeaderName, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode};

use scanwerk_core::error::{Result, ScanwerkError};

use crate::dialer::DialContext;
use crate::transport::{ResponseBody, Transport};

/// What the scripted device answers next.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    status: StatusCode,
    headers: Vec<(HeaderName, String)>,
    body: Bytes,
}

impl ScriptedResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn into_response(self) -> Result<Response<ResponseBody>> {
        let mut builder = Response::builder().status(self.status);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        let body = Full::new(self.body)
            .map_err(|never| match never {})
            .boxed_unsync();
        builder
            .body(body)
            .map_err(|e| ScanwerkError::Http(format!("scripted response: {e}")))
    }
}

#[derive(Debug)]
enum Step {
    Respond(ScriptedResponse),
    Fail(String),
}

/// A request as the transport saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Origin-form target, e.g. `/eSCL/ScannerStatus`.
    pub path: String,
    pub host: Option<String>,
    pub user_agent: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Transport that answers from a script instead of the network.
///
/// Running out of script is an error, which makes unexpected extra requests
/// fail loudly.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn respond(self, response: ScriptedResponse) -> Self {
        self.push(Step::Respond(response));
        self
    }

    /// Queue a bare status with an empty body.
    pub fn status(self, status: StatusCode) -> Self {
        self.respond(ScriptedResponse::new(status))
    }

    /// Queue the same status `times` times.
    pub fn repeat(self, status: StatusCode, times: usize) -> Self {
        (0..times).fold(self, |transport, _| transport.status(status))
    }

    /// Queue a network-level failure.
    pub fn fail(self, reason: impl Into<String>) -> Self {
        self.push(Step::Fail(reason.into()));
        self
    }

    /// Queue a response on an already-shared transport.
    pub fn enqueue(&self, response: ScriptedResponse) {
        self.push(Step::Respond(response));
    }

    fn push(&self, step: Step) {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn header_text(request: &Request<Full<Bytes>>, name: HeaderName) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: Request<Full<Bytes>>,
        ctx: &DialContext,
    ) -> Result<Response<ResponseBody>> {
        if ctx.is_cancelled() {
            return Err(ScanwerkError::Cancelled);
        }

        let method = request.method().clone();
        let path = request.uri().to_string();
        let host = header_text(&request, HOST);
        let user_agent = header_text(&request, USER_AGENT);
        let content_type = header_text(&request, CONTENT_TYPE);
        let body = match request.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };

        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                method: method.clone(),
                path: path.clone(),
                host,
                user_agent,
                content_type,
                body,
            });

        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match step {
            Some(Step::Respond(response)) => response.into_response(),
            Some(Step::Fail(reason)) => Err(ScanwerkError::Http(reason)),
            None => Err(ScanwerkError::Http(format!(
                "script exhausted at {method} {path}"
            ))),
        }
    }
}

/// A `ScannerStatus` document.
pub fn status_xml(state: &str, adf_state: Option<&str>) -> String {
    let adf = adf_state
        .map(|s| format!("<scan:AdfState>{s}</scan:AdfState>"))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><scan:ScannerStatus xmlns:pwg="http://www.pwg.org/schemas/2010/12/sm" xmlns:scan="http://schemas.hp.com/imaging/escl/2011/05/03"><pwg:Version>2.63</pwg:Version><pwg:State>{state}</pwg:State>{adf}<scan:Jobs></scan:Jobs></scan:ScannerStatus>"#
    )
}

/// A `ScannerCapabilities` document with the chosen input sources.
pub fn capabilities_xml(platen: bool, adf_simplex: bool, adf_duplex: bool) -> String {
    let input_caps = |tag: &str| {
        format!(
            "<scan:{tag}><scan:MaxWidth>2550</scan:MaxWidth><scan:MaxHeight>3507</scan:MaxHeight>\
             <scan:SettingProfiles><scan:SettingProfile><scan:ColorModes>\
             <scan:ColorMode>Grayscale8</scan:ColorMode><scan:ColorMode>RGB24</scan:ColorMode>\
             </scan:ColorModes><scan:DocumentFormats><pwg:DocumentFormat>image/jpeg</pwg:DocumentFormat>\
             </scan:DocumentFormats></scan:SettingProfile></scan:SettingProfiles></scan:{tag}>"
        )
    };

    let mut body = String::new();
    if platen {
        body.push_str(&format!(
            "<scan:Platen>{}</scan:Platen>",
            input_caps("PlatenInputCaps")
        ));
    }
    if adf_simplex || adf_duplex {
        body.push_str("<scan:Adf>");
        if adf_simplex {
            body.push_str(&input_caps("AdfSimplexInputCaps"));
        }
        if adf_duplex {
            body.push_str(&input_caps("AdfDuplexInputCaps"));
        }
        body.push_str("<scan:FeederCapacity>50</scan:FeederCapacity></scan:Adf>");
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><scan:ScannerCapabilities xmlns:pwg="http://www.pwg.org/schemas/2010/12/sm" xmlns:scan="http://schemas.hp.com/imaging/escl/2011/05/03"><pwg:Version>2.63</pwg:Version><pwg:MakeAndModel>Test Scanner</pwg:MakeAndModel>{body}</scan:ScannerCapabilities>"#
    )
}
