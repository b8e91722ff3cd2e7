// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk: scan from AirScan (eSCL) network scanners.
//
// Entry point. Initialises logging, wires Ctrl-C to the client's cancellation
// token, and dispatches the subcommand.

mod cli;
mod pages;

use std::net::{Ipv6Addr, SocketAddr};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scanwerk_core::config::ClientConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::human_errors::humanize_error;
use scanwerk_core::types::{DiscoveredScanner, DocumentFormat};
use scanwerk_escl::{
    ClientBuilder, EsclClient, ScanJob, ScannerDiscovery, TracingObserver, probe_candidates,
};

use cli::{Args, Command, ScanOptions, Target};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping");
            on_interrupt.cancel();
        }
    });

    match run(args, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let human = humanize_error(&err);
            eprintln!("error: {}", human.message);
            eprintln!("  {}", human.suggestion);
            eprintln!("  ({err})");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, cancel: CancellationToken) -> Result<()> {
    match args.command {
        Command::Discover { timeout, json } => {
            let scanners = browse(std::time::Duration::from_secs(timeout)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&scanners)?);
            } else if scanners.is_empty() {
                println!("no scanners found");
            } else {
                for scanner in &scanners {
                    let scheme = if scanner.tls { "https" } else { "http" };
                    println!(
                        "{}\t{scheme}://{}:{}/{}",
                        scanner.display_name(),
                        scanner.host,
                        scanner.port,
                        scanner.resource_path
                    );
                }
            }
            Ok(())
        }

        Command::Status { target, json } => {
            let scanner = locate(&target).await?;
            let client = connect(&target, scanner.as_ref(), args.debug, cancel)?;
            let status = client.scanner_status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("version: {}", status.version);
                println!("state:   {}", status.state);
                println!("feeder:  {}", status.adf_state.as_deref().unwrap_or("-"));
            }
            Ok(())
        }

        Command::Conntest { target } => {
            let scanner = locate(&target).await?;
            let candidates = match &scanner {
                Some(scanner) => scanner.candidates(),
                None => vec![with_default_port(&target.host, target.tls)],
            };
            let timeout = ClientConfig::default().connect_timeout();
            for probe in probe_candidates(&candidates, timeout).await {
                match probe.error {
                    None => println!("ok    {}", probe.candidate),
                    Some(error) => println!("fail  {}  ({error})", probe.candidate),
                }
            }
            Ok(())
        }

        Command::Scan { target, options } => {
            let scanner = locate(&target).await?;
            let client = connect(&target, scanner.as_ref(), args.debug, cancel)?;
            scan(&client, &options).await
        }
    }
}

fn config_for(target: &Target) -> ClientConfig {
    ClientConfig {
        use_tls: target.tls,
        skip_cert_verify: target.skip_cert_verify,
        ..ClientConfig::default()
    }
}

/// Build a client for `target`, preferring the discovery record when the
/// scanner was found on the network.
fn connect(
    target: &Target,
    scanner: Option<&DiscoveredScanner>,
    debug: bool,
    cancel: CancellationToken,
) -> Result<EsclClient> {
    let config = config_for(target);
    let builder = match scanner {
        Some(scanner) => ClientBuilder::for_service(scanner, config)?,
        None => ClientBuilder::new(target.host.clone()).config(config),
    };
    let builder = builder.cancellation_token(cancel);
    let builder = if debug {
        builder.observer(Arc::new(TracingObserver))
    } else {
        builder
    };
    builder.build()
}

/// Look `target.host` up on the network, unless browsing is switched off.
async fn locate(target: &Target) -> Result<Option<DiscoveredScanner>> {
    let Some(timeout) = target.browse_timeout() else {
        return Ok(None);
    };
    let wanted = target.host.clone();
    let found = tokio::task::spawn_blocking(move || {
        let mut discovery = ScannerDiscovery::new()?;
        let found = discovery.find(&wanted, timeout);
        if let Err(err) = discovery.shutdown() {
            warn!(error = %err, "could not stop mDNS browsing");
        }
        found
    })
    .await
    .map_err(|e| ScanwerkError::Discovery(format!("browse task: {e}")))??;

    match &found {
        Some(scanner) => info!(
            scanner = %scanner.display_name(),
            candidates = ?scanner.candidates(),
            "found scanner on the network"
        ),
        None => warn!(host = %target.host, "scanner not announced on the network, dialing it directly"),
    }
    Ok(found)
}

async fn browse(timeout: std::time::Duration) -> Result<Vec<DiscoveredScanner>> {
    tokio::task::spawn_blocking(move || {
        let mut discovery = ScannerDiscovery::new()?;
        let scanners = discovery.discover(Some(timeout));
        if let Err(err) = discovery.shutdown() {
            warn!(error = %err, "could not stop mDNS browsing");
        }
        scanners
    })
    .await
    .map_err(|e| ScanwerkError::Discovery(format!("browse task: {e}")))?
}

/// `host` with the scheme's default port unless it already names one.
fn with_default_port(host: &str, tls: bool) -> String {
    let port = if tls { 443 } else { 80 };
    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }
    if host.parse::<Ipv6Addr>().is_ok() {
        return format!("[{host}]:{port}");
    }
    match host.rsplit_once(':') {
        Some((_, p)) if p.parse::<u16>().is_ok() => host.to_string(),
        _ => format!("{host}:{port}"),
    }
}

/// Run one scan job into `options.scan_dir`. The job is always deleted on the
/// device, whatever happened while pages were fetched.
async fn scan(client: &EsclClient, options: &ScanOptions) -> Result<()> {
    let settings = options.settings();
    tokio::fs::create_dir_all(&options.scan_dir).await?;

    let mut job = client.scan(&settings).await?;
    let saved = save_pages(&mut job, &options.scan_dir, settings.document_format).await;
    let closed = job.close().await;
    let job_error = job.into_err();

    let result = match (saved, job_error) {
        (Err(err), _) | (Ok(_), Some(err)) => Err(err),
        (Ok(pages), None) => Ok(pages),
    };
    match (result, closed) {
        (Ok(pages), Ok(())) => {
            info!(pages, dir = %options.scan_dir.display(), "scan finished");
            Ok(())
        }
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "could not delete the scan job");
            Err(err)
        }
    }
}

async fn save_pages(job: &mut ScanJob<'_>, dir: &Path, requested: DocumentFormat) -> Result<u32> {
    let mut next = 1;
    let mut saved = 0;
    while job.scan_page().await {
        let Some(page) = job.current_page() else {
            break;
        };
        let ext = pages::page_extension(page, requested);
        let (n, path) = pages::next_free_path(dir, next, ext).await?;
        let bytes = pages::write_page(page, &path).await?;
        info!(page = page.number(), bytes, path = %path.display(), "page written");
        println!("{}", path.display());
        next = n + 1;
        saved += 1;
    }
    Ok(saved)
}
