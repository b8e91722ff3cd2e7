// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk eSCL client.

use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanwerkError};

/// Scanner state reported while no job is running.
pub const STATE_IDLE: &str = "Idle";

/// Feeder state reported when paper is waiting in the ADF.
pub const ADF_LOADED: &str = "ScannerAdfLoaded";

/// Region units used by every known eSCL client: 1/300 inch.
pub const THREE_HUNDREDTHS_OF_INCHES: &str = "escl:ThreeHundredthsOfInches";

/// Classification of errors by their nature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Could not reach the device, or the connection broke mid-request.
    Transport,
    /// The device answered with a status we did not accept.
    Protocol,
    /// The device kept saying "try again later" until we gave up.
    Transient,
    /// Settings do not fit the device's state or capabilities.
    Negotiation,
    /// Malformed document on the wire.
    Decode,
    /// Local problem (file system, misuse of a closed job, discovery).
    Local,
}

/// Paper input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    /// Flatbed glass.
    Platen,
    /// Automatic Document Feeder.
    Feeder,
    Camera,
}

impl InputSource {
    /// eSCL `pwg:InputSource` keyword.
    pub fn escl_keyword(&self) -> &'static str {
        match self {
            Self::Platen => "Platen",
            Self::Feeder => "Feeder",
            Self::Camera => "Camera",
        }
    }

    pub fn from_escl_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "Platen" => Some(Self::Platen),
            "Feeder" => Some(Self::Feeder),
            "Camera" => Some(Self::Camera),
            _ => None,
        }
    }
}

/// Color mode requested from the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    BlackAndWhite1,
    Grayscale8,
    Grayscale16,
    Rgb24,
    Rgb48,
}

impl ColorMode {
    /// eSCL `scan:ColorMode` keyword.
    pub fn escl_keyword(&self) -> &'static str {
        match self {
            Self::BlackAndWhite1 => "BlackAndWhite1",
            Self::Grayscale8 => "Grayscale8",
            Self::Grayscale16 => "Grayscale16",
            Self::Rgb24 => "RGB24",
            Self::Rgb48 => "RGB48",
        }
    }

    pub fn from_escl_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "BlackAndWhite1" => Some(Self::BlackAndWhite1),
            "Grayscale8" => Some(Self::Grayscale8),
            "Grayscale16" => Some(Self::Grayscale16),
            "RGB24" => Some(Self::Rgb24),
            "RGB48" => Some(Self::Rgb48),
            _ => None,
        }
    }
}

/// Output document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentFormat {
    Jpeg,
    Pdf,
    Png,
    Tiff,
}

impl DocumentFormat {
    /// MIME type sent as `pwg:DocumentFormat`.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Tiff => "image/tiff",
        }
    }

    /// File extension for saved pages.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Tiff => "tif",
        }
    }

    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "application/pdf" => Some(Self::Pdf),
            "image/png" => Some(Self::Png),
            "image/tiff" => Some(Self::Tiff),
            _ => None,
        }
    }
}

/// Standard paper sizes, expressed as scan regions at 300 dpi.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    Letter,
    /// Width and height in 1/300 inch.
    Custom { width: u32, height: u32 },
}

impl PaperSize {
    /// (width, height) in 1/300 inch.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            // https://www.papersizes.org/a-sizes-in-pixels.htm
            Self::A4 => (2480, 3508),
            Self::Letter => (2550, 3300),
            Self::Custom { width, height } => (*width, *height),
        }
    }

    /// Full-page region anchored at the top-left corner.
    pub fn region(&self) -> ScanRegion {
        let (width, height) = self.dimensions();
        ScanRegion {
            units: THREE_HUNDREDTHS_OF_INCHES.into(),
            width,
            height,
            x_offset: 0,
            y_offset: 0,
        }
    }
}

/// One rectangular area to scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRegion {
    /// `pwg:ContentRegionUnits`, normally [`THREE_HUNDREDTHS_OF_INCHES`].
    pub units: String,
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
}

/// Scan request descriptor, serialized as the `scan:ScanSettings` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// eSCL protocol version we speak (`pwg:Version`).
    pub version: String,
    /// `pwg:MustHonor` attribute of the region list.
    pub must_honor: bool,
    pub regions: Vec<ScanRegion>,
    pub document_format: DocumentFormat,
    pub input_source: InputSource,
    pub color_mode: ColorMode,
    pub x_resolution: u32,
    pub y_resolution: u32,
    pub duplex: bool,
}

impl ScanSettings {
    /// Reject combinations no device could honour.
    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            return Err(ScanwerkError::InvalidSettings(
                "at least one scan region is required".into(),
            ));
        }
        for (idx, region) in self.regions.iter().enumerate() {
            if region.width == 0 || region.height == 0 {
                return Err(ScanwerkError::InvalidSettings(format!(
                    "scan region {idx} has zero size ({}x{})",
                    region.width, region.height
                )));
            }
            if region.units.trim().is_empty() {
                return Err(ScanwerkError::InvalidSettings(format!(
                    "scan region {idx} has no units"
                )));
            }
        }
        if self.x_resolution == 0 || self.y_resolution == 0 {
            return Err(ScanwerkError::InvalidSettings(format!(
                "resolution must be positive, got {}x{}",
                self.x_resolution, self.y_resolution
            )));
        }
        if self.version.trim().is_empty() {
            return Err(ScanwerkError::InvalidSettings("protocol version is empty".into()));
        }
        Ok(())
    }
}

/// Snapshot of `/eSCL/ScannerStatus`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub version: String,
    /// Operational state, e.g. "Idle" or "Processing".
    pub state: String,
    /// Feeder state; absent on devices without an ADF.
    pub adf_state: Option<String>,
}

impl DeviceStatus {
    pub fn is_idle(&self) -> bool {
        self.state == STATE_IDLE
    }
}

/// One `DiscreteResolution` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub x: u32,
    pub y: u32,
}

/// One `SettingProfile` of an input source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingProfile {
    pub color_modes: Vec<String>,
    pub content_types: Vec<String>,
    pub document_formats: Vec<String>,
    pub resolutions: Vec<Resolution>,
}

/// Limits and profiles of one input source (platen, ADF simplex, ADF duplex).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputCaps {
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_height: Option<u32>,
    pub max_optical_x_resolution: Option<u32>,
    pub max_optical_y_resolution: Option<u32>,
    pub setting_profiles: Vec<SettingProfile>,
    pub intents: Vec<String>,
}

impl InputCaps {
    /// Whether any profile advertises this color mode.
    pub fn supports_color_mode(&self, mode: ColorMode) -> bool {
        self.setting_profiles
            .iter()
            .any(|p| p.color_modes.iter().any(|m| m == mode.escl_keyword()))
    }

    /// Whether any profile advertises this document format.
    pub fn supports_format(&self, format: DocumentFormat) -> bool {
        self.setting_profiles.iter().any(|p| {
            p.document_formats
                .iter()
                .any(|f| f.eq_ignore_ascii_case(format.mime_type()))
        })
    }

    /// All discrete resolutions across profiles, deduplicated, in order seen.
    pub fn resolutions(&self) -> Vec<Resolution> {
        let mut out: Vec<Resolution> = Vec::new();
        for res in self.setting_profiles.iter().flat_map(|p| p.resolutions.iter()) {
            if !out.contains(res) {
                out.push(*res);
            }
        }
        out
    }
}

/// The `scan:Adf` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdfCaps {
    pub simplex: Option<InputCaps>,
    pub duplex: Option<InputCaps>,
    pub feeder_capacity: Option<u32>,
    pub options: Vec<String>,
}

/// Snapshot of `/eSCL/ScannerCapabilities`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerCapabilities {
    pub version: String,
    pub make_and_model: Option<String>,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
    pub uuid: Option<String>,
    pub admin_uri: Option<String>,
    pub icon_uri: Option<String>,
    pub platen: Option<InputCaps>,
    pub adf: Option<AdfCaps>,
}

impl ScannerCapabilities {
    /// Whether the device has the given input source at all.
    pub fn has_source(&self, source: InputSource) -> bool {
        match source {
            InputSource::Platen => self.platen.is_some(),
            InputSource::Feeder => self.adf.is_some(),
            InputSource::Camera => false,
        }
    }

    /// Capabilities that apply to a (source, duplex) combination.
    pub fn input_caps(&self, source: InputSource, duplex: bool) -> Option<&InputCaps> {
        match source {
            InputSource::Platen => self.platen.as_ref(),
            InputSource::Feeder => {
                let adf = self.adf.as_ref()?;
                if duplex {
                    adf.duplex.as_ref()
                } else {
                    adf.simplex.as_ref()
                }
            }
            InputSource::Camera => None,
        }
    }
}

/// A scanner discovered on the local network via mDNS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredScanner {
    /// Full mDNS service instance name.
    pub name: String,
    /// Human-readable model name from the `ty` TXT key, if any.
    pub human_name: Option<String>,
    /// Host name without the mDNS domain, e.g. "scanner".
    pub host: String,
    /// mDNS domain, normally "local".
    pub domain: String,
    pub port: u16,
    pub addresses: Vec<IpAddr>,
    /// Advertised via `_uscans._tcp`.
    pub tls: bool,
    /// eSCL resource path from the `rs` TXT key (default "eSCL").
    pub resource_path: String,
    pub uuid: Option<String>,
    /// Input sources from the `is` TXT key.
    pub input_sources: Vec<String>,
    pub supports_duplex: bool,
    /// When this scanner was last seen on the network.
    pub last_seen: DateTime<Utc>,
}

impl DiscoveredScanner {
    /// Name to show a person.
    pub fn display_name(&self) -> String {
        match &self.human_name {
            Some(ty) if !ty.is_empty() => ty.clone(),
            // DNS labels escape whitespace with backslashes; they only look
            // wrong in a UI.
            _ => self.name.replace('\\', ""),
        }
    }

    /// Ordered connection candidates: DHCP-DNS name, mDNS name, then every
    /// advertised address (IPv4 first).
    pub fn candidates(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.host.is_empty() {
            out.push(format!("{}:{}", self.host, self.port));
            if !self.domain.is_empty() {
                out.push(format!("{}.{}:{}", self.host, self.domain, self.port));
            }
        }
        let mut addresses = self.addresses.clone();
        addresses.sort_by_key(|ip| (ip.is_ipv6(), *ip));
        for ip in addresses {
            out.push(SocketAddr::new(ip, self.port).to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn reference_settings() -> ScanSettings {
        ScanSettings {
            version: "2.0".into(),
            must_honor: true,
            regions: vec![PaperSize::A4.region()],
            document_format: DocumentFormat::Jpeg,
            input_source: InputSource::Feeder,
            color_mode: ColorMode::Grayscale8,
            x_resolution: 300,
            y_resolution: 300,
            duplex: true,
        }
    }

    #[test]
    fn valid_settings_pass() {
        assert!(reference_settings().validate().is_ok());
    }

    #[test]
    fn settings_without_regions_are_rejected() {
        let mut settings = reference_settings();
        settings.regions.clear();
        assert!(matches!(
            settings.validate(),
            Err(ScanwerkError::InvalidSettings(_))
        ));
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let mut settings = reference_settings();
        settings.y_resolution = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_sized_region_is_rejected() {
        let mut settings = reference_settings();
        settings.regions[0].height = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn letter_region_matches_300dpi() {
        let region = PaperSize::Letter.region();
        assert_eq!((region.width, region.height), (2550, 3300));
        assert_eq!(region.units, THREE_HUNDREDTHS_OF_INCHES);
    }

    #[test]
    fn keywords_round_trip() {
        for mode in [ColorMode::Grayscale8, ColorMode::Rgb24, ColorMode::BlackAndWhite1] {
            assert_eq!(ColorMode::from_escl_keyword(mode.escl_keyword()), Some(mode));
        }
        assert_eq!(InputSource::from_escl_keyword("Feeder"), Some(InputSource::Feeder));
        assert_eq!(DocumentFormat::from_mime_type("IMAGE/JPEG"), Some(DocumentFormat::Jpeg));
    }

    #[test]
    fn candidates_are_ordered_names_then_ipv4_then_ipv6() {
        let scanner = DiscoveredScanner {
            name: "Office\\ Scanner._uscan._tcp.local.".into(),
            human_name: None,
            host: "office-scanner".into(),
            domain: "local".into(),
            port: 8080,
            addresses: vec![
                IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            ],
            tls: false,
            resource_path: "eSCL".into(),
            uuid: None,
            input_sources: vec![],
            supports_duplex: false,
            last_seen: Utc::now(),
        };
        assert_eq!(
            scanner.candidates(),
            vec![
                "office-scanner:8080".to_string(),
                "office-scanner.local:8080".to_string(),
                "192.168.1.20:8080".to_string(),
                "[fe80::1]:8080".to_string(),
            ]
        );
        assert_eq!(scanner.display_name(), "Office Scanner._uscan._tcp.local.");
    }

    #[test]
    fn feeder_caps_follow_duplex_flag() {
        let caps = ScannerCapabilities {
            adf: Some(AdfCaps {
                simplex: Some(InputCaps::default()),
                duplex: None,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(caps.has_source(InputSource::Feeder));
        assert!(!caps.has_source(InputSource::Platen));
        assert!(caps.input_caps(InputSource::Feeder, false).is_some());
        assert!(caps.input_caps(InputSource::Feeder, true).is_none());
    }
}
