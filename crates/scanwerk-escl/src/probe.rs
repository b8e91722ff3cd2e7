// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Status and capability queries.
//
// Both are plain GETs with no side effects on the device, and neither result
// is cached: the scanner's state can change between any two calls.

use hyper::{Method, StatusCode};
use tracing::{debug, instrument};

use scanwerk_core::error::Result;
use scanwerk_core::types::{DeviceStatus, ScannerCapabilities};

use crate::client::{EsclClient, collect_body};
use crate::codec;

impl EsclClient {
    /// Fetch `/eSCL/ScannerStatus`.
    #[instrument(skip(self), fields(host = %self.host()))]
    pub async fn scanner_status(&self) -> Result<DeviceStatus> {
        let body = self.fetch_document("ScannerStatus").await?;
        let status = codec::decode_status(&body)?;
        debug!(state = %status.state, adf_state = ?status.adf_state, "scanner status");
        Ok(status)
    }

    /// Fetch `/eSCL/ScannerCapabilities`.
    #[instrument(skip(self), fields(host = %self.host()))]
    pub async fn scanner_capabilities(&self) -> Result<ScannerCapabilities> {
        let body = self.fetch_document("ScannerCapabilities").await?;
        let caps = codec::decode_capabilities(&body)?;
        debug!(
            model = caps.make_and_model.as_deref().unwrap_or("unknown"),
            platen = caps.platen.is_some(),
            adf = caps.adf.is_some(),
            "scanner capabilities"
        );
        Ok(caps)
    }

    async fn fetch_document(&self, name: &str) -> Result<bytes::Bytes> {
        let url = self.endpoint(name)?;
        let response = self
            .execute(Method::GET, &url, None, &[StatusCode::OK])
            .await?;
        collect_body(response.into_body()).await
    }
}
