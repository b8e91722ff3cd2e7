// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mDNS discovery of eSCL (AirScan) scanners on the local network.
//
// We browse for `_uscan._tcp.local.` (plain HTTP) and `_uscans._tcp.local.`
// (HTTPS) using the `mdns-sd` crate. Resolved services become
// `DiscoveredScanner` values, whose `candidates()` feed the fallback dialer.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, info, warn};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::DiscoveredScanner;

/// mDNS service type for plain eSCL.
pub const USCAN_SERVICE: &str = "_uscan._tcp.local.";

/// mDNS service type for TLS-secured eSCL.
pub const USCANS_SERVICE: &str = "_uscans._tcp.local.";

/// Default browse duration before the initial snapshot is returned.
pub const DEFAULT_BROWSE_TIMEOUT: Duration = Duration::from_secs(5);

type ScannerMap = Arc<Mutex<HashMap<String, DiscoveredScanner>>>;

/// Scanner discovery engine using mDNS-SD.
///
/// Discovered scanners are kept in a map keyed by their full service name,
/// so repeated announcements update rather than duplicate an entry.
pub struct ScannerDiscovery {
    daemon: ServiceDaemon,
    scanners: ScannerMap,
    browsing: bool,
}

impl ScannerDiscovery {
    /// Start the mDNS daemon thread. Browsing starts with [`start`].
    ///
    /// [`start`]: ScannerDiscovery::start
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| ScanwerkError::Discovery(format!("failed to start mDNS daemon: {e}")))?;
        Ok(Self {
            daemon,
            scanners: Arc::new(Mutex::new(HashMap::new())),
            browsing: false,
        })
    }

    /// Start browsing for both service types. Returns immediately.
    pub fn start(&mut self) -> Result<()> {
        if self.browsing {
            debug!("scanner discovery already running");
            return Ok(());
        }

        for (service_type, tls) in [(USCAN_SERVICE, false), (USCANS_SERVICE, true)] {
            let receiver = self
                .daemon
                .browse(service_type)
                .map_err(|e| ScanwerkError::Discovery(format!("browse {service_type}: {e}")))?;
            spawn_listener(service_type, tls, receiver, Arc::clone(&self.scanners))?;
        }

        self.browsing = true;
        info!("mDNS scanner discovery started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if !self.browsing {
            return Ok(());
        }
        for service_type in [USCAN_SERVICE, USCANS_SERVICE] {
            self.daemon.stop_browse(service_type).map_err(|e| {
                ScanwerkError::Discovery(format!("stop browse {service_type}: {e}"))
            })?;
        }
        self.browsing = false;
        info!("mDNS scanner discovery stopped");
        Ok(())
    }

    /// Shut down the daemon; the instance cannot be reused afterwards.
    pub fn shutdown(self) -> Result<()> {
        let _status_rx = self
            .daemon
            .shutdown()
            .map_err(|e| ScanwerkError::Discovery(format!("daemon shutdown: {e}")))?;
        info!("mDNS daemon shut down");
        Ok(())
    }

    /// Snapshot of every scanner seen so far, sorted by display name.
    pub fn scanners(&self) -> Vec<DiscoveredScanner> {
        let mut list: Vec<DiscoveredScanner> = self
            .scanners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        list.sort_by_key(|s| s.display_name());
        list
    }

    /// Browse for `timeout` (blocking the calling thread) and return what was
    /// found. Browsing continues in the background afterwards.
    pub fn discover(&mut self, timeout: Option<Duration>) -> Result<Vec<DiscoveredScanner>> {
        self.start()?;
        std::thread::sleep(timeout.unwrap_or(DEFAULT_BROWSE_TIMEOUT));
        Ok(self.scanners())
    }

    /// Browse until a scanner matching `wanted` shows up or `timeout` passes.
    ///
    /// `wanted` may be the host name, the service instance name, the model
    /// name, or one of the advertised IP addresses.
    pub fn find(&mut self, wanted: &str, timeout: Duration) -> Result<Option<DiscoveredScanner>> {
        self.start()?;
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(hit) = self.scanners().into_iter().find(|s| matches_scanner(s, wanted)) {
                return Ok(Some(hit));
            }
            if std::time::Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    pub fn is_browsing(&self) -> bool {
        self.browsing
    }
}

/// Drain one browse channel on a dedicated thread.
fn spawn_listener(
    service_type: &'static str,
    tls: bool,
    receiver: mdns_sd::Receiver<ServiceEvent>,
    scanners: ScannerMap,
) -> Result<()> {
    std::thread::Builder::new()
        .name(format!("mdns-{service_type}"))
        .spawn(move || {
            while let Ok(event) = receiver.recv() {
                match event {
                    ServiceEvent::SearchStarted(stype) => {
                        debug!(service_type = %stype, "mDNS search started");
                    }
                    ServiceEvent::ServiceFound(stype, fullname) => {
                        debug!(service_type = %stype, name = %fullname, "service found");
                    }
                    ServiceEvent::ServiceResolved(info) => {
                        let fullname = info.get_fullname().to_owned();
                        match scanner_from_service(&info, tls) {
                            Ok(scanner) => {
                                info!(
                                    name = %scanner.display_name(),
                                    host = %scanner.host,
                                    port = scanner.port,
                                    tls,
                                    "scanner resolved"
                                );
                                scanners
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .insert(fullname, scanner);
                            }
                            Err(e) => {
                                warn!(fullname = %fullname, error = %e, "ignoring unusable scanner record");
                            }
                        }
                    }
                    ServiceEvent::ServiceRemoved(stype, fullname) => {
                        info!(service_type = %stype, name = %fullname, "scanner removed");
                        scanners
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&fullname);
                    }
                    ServiceEvent::SearchStopped(stype) => {
                        debug!(service_type = %stype, "mDNS search stopped");
                        break;
                    }
                }
            }
        })
        .map(|_handle| ())
        .map_err(|e| ScanwerkError::Discovery(format!("failed to spawn mDNS listener: {e}")))
}

/// Convert a resolved service into a `DiscoveredScanner`.
///
/// TXT keys used (as published by Mopria for eSCL scanners):
///   - `ty`     human-readable make and model
///   - `rs`     resource path, default "eSCL"
///   - `UUID`   device UUID
///   - `is`     comma-separated input sources, e.g. "platen,adf"
///   - `duplex` "T" or "F"
fn scanner_from_service(info: &ServiceInfo, tls: bool) -> Result<DiscoveredScanner> {
    let name = info.get_fullname().to_owned();
    let (host, domain) = split_hostname(info.get_hostname());
    let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();

    if host.is_empty() && addresses.is_empty() {
        return Err(ScanwerkError::Discovery(format!(
            "service {name} has neither a host name nor an address"
        )));
    }

    let resource_path = info
        .get_property_val_str("rs")
        .map(|rs| rs.trim_matches('/').to_string())
        .filter(|rs| !rs.is_empty())
        .unwrap_or_else(|| "eSCL".into());

    let input_sources = info
        .get_property_val_str("is")
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Ok(DiscoveredScanner {
        name,
        human_name: info.get_property_val_str("ty").map(String::from),
        host,
        domain,
        port: info.get_port(),
        addresses,
        tls,
        resource_path,
        uuid: info
            .get_property_val_str("UUID")
            .or_else(|| info.get_property_val_str("uuid"))
            .map(String::from),
        input_sources,
        supports_duplex: txt_bool(info, "duplex"),
        last_seen: Utc::now(),
    })
}

/// "scanner.local." -> ("scanner", "local")
fn split_hostname(hostname: &str) -> (String, String) {
    let trimmed = hostname.trim_end_matches('.');
    match trimmed.split_once('.') {
        Some((host, domain)) => (host.to_string(), domain.to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}

/// Read a boolean TXT record value ("T"/"F").
fn txt_bool(info: &ServiceInfo, key: &str) -> bool {
    info.get_property_val_str(key)
        .map(|v| v.eq_ignore_ascii_case("t") || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn matches_scanner(scanner: &DiscoveredScanner, wanted: &str) -> bool {
    let wanted = wanted.trim_end_matches('.');
    scanner.host.eq_ignore_ascii_case(wanted)
        || format!("{}.{}", scanner.host, scanner.domain).eq_ignore_ascii_case(wanted)
        || scanner.name.trim_end_matches('.').eq_ignore_ascii_case(wanted)
        || scanner
            .name
            .split("._")
            .next()
            .is_some_and(|instance| instance.replace('\\', "").eq_ignore_ascii_case(wanted))
        || scanner
            .human_name
            .as_deref()
            .is_some_and(|ty| ty.eq_ignore_ascii_case(wanted))
        || scanner.addresses.iter().any(|ip| ip.to_string() == wanted)
}
