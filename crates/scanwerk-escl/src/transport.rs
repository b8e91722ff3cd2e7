// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The "send one request, get one response" capability.
//
// `HttpTransport` is the production implementation: every request dials
// through the `FallbackDialer`, optionally upgrades to TLS, and performs one
// HTTP/1.1 exchange on that connection. The `Host` header is left to the
// caller, so the logical device name is preserved no matter which candidate
// address the dialer actually used.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};

use scanwerk_core::error::{Result, ScanwerkError};

use crate::dialer::{DialContext, FallbackDialer};

/// Streaming response body shared by every transport.
pub type ResponseBody = UnsyncBoxBody<Bytes, hyper::Error>;

/// Execute one HTTP request.
///
/// Implementations must not interpret the status code; that is the request
/// executor's job.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn execute(
        &self,
        request: Request<Full<Bytes>>,
        ctx: &DialContext,
    ) -> Result<Response<ResponseBody>>;
}

/// Anything we can speak HTTP over.
trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

/// TLS settings, fixed at construction.
#[derive(Clone)]
pub struct TlsSettings {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl std::fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSettings")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl TlsSettings {
    /// Build a TLS client for `server_name`.
    ///
    /// With `skip_cert_verify` any certificate is accepted (handshake
    /// signatures are still checked); otherwise the Mozilla root set is used.
    pub fn new(server_name: &str, skip_cert_verify: bool) -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| ScanwerkError::Tls(e.to_string()))?;

        let config = if skip_cert_verify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
                .with_no_client_auth()
        } else {
            let roots = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        };

        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|e| ScanwerkError::Tls(format!("invalid server name '{server_name}': {e}")))?;

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
        })
    }
}

/// Certificate verifier for devices with self-signed certificates.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// HTTP/1.1 over connections obtained from a [`FallbackDialer`].
#[derive(Debug)]
pub struct HttpTransport {
    dialer: FallbackDialer,
    tls: Option<TlsSettings>,
}

impl HttpTransport {
    pub fn new(dialer: FallbackDialer, tls: Option<TlsSettings>) -> Self {
        Self { dialer, tls }
    }

    pub fn dialer(&self) -> &FallbackDialer {
        &self.dialer
    }

    async fn open(&self, ctx: &DialContext) -> Result<Box<dyn Connection>> {
        let (stream, candidate) = self.dialer.connect(ctx).await?;
        match &self.tls {
            None => Ok(Box::new(stream)),
            Some(tls) => {
                let stream = tls
                    .connector
                    .connect(tls.server_name.clone(), stream)
                    .await
                    .map_err(|e| ScanwerkError::Tls(format!("handshake with {candidate}: {e}")))?;
                Ok(Box::new(stream))
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip_all, fields(method = %request.method(), path = %request.uri()))]
    async fn execute(
        &self,
        request: Request<Full<Bytes>>,
        ctx: &DialContext,
    ) -> Result<Response<ResponseBody>> {
        let io = TokioIo::new(self.open(ctx).await?);
        let (mut sender, connection) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ScanwerkError::Http(format!("handshake: {e}")))?;

        // The connection future owns the socket; it finishes once the
        // response body has been read or dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "connection closed with error");
            }
        });

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| ScanwerkError::Http(e.to_string()))?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, body.boxed_unsync()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn tls_settings_build_in_both_modes() {
        assert!(TlsSettings::new("scanner.local", false).is_ok());
        assert!(TlsSettings::new("192.168.1.20", true).is_ok());
    }

    #[test]
    fn invalid_server_name_is_a_tls_error() {
        let err = TlsSettings::new("not a host", false).unwrap_err();
        assert!(matches!(err, ScanwerkError::Tls(_)));
    }

    #[tokio::test]
    async fn plain_exchange_over_dialed_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            assert!(String::from_utf8_lossy(&buf[..n]).starts_with("GET /eSCL/ScannerStatus HTTP/1.1"));
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                .await
                .unwrap();
        });

        let dialer = FallbackDialer::new(vec![addr], Duration::from_secs(5));
        let transport = HttpTransport::new(dialer, None);
        let request = Request::get("/eSCL/ScannerStatus")
            .header(hyper::header::HOST, "scanner")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let ctx = DialContext::new(CancellationToken::new());

        let response = transport.execute(request, &ctx).await.unwrap();
        assert_eq!(response.status(), hyper::StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }
}
