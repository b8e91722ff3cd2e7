// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand, ValueEnum};

use scanwerk_core::types::{ColorMode, DocumentFormat, InputSource, PaperSize, ScanSettings};
use scanwerk_escl::preset;

/// Scan documents from AirScan (eSCL) network scanners.
#[derive(Parser, Debug)]
#[command(name = "scanwerk")]
#[command(author, version, about)]
pub struct Args {
    /// Log every dial attempt, request, retry and job state change
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List scanners announced on the local network
    Discover {
        /// How long to browse, in seconds
        #[arg(long, default_value_t = 3)]
        timeout: u64,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the scanner's current state and feeder status
    Status {
        #[command(flatten)]
        target: Target,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check which names and addresses of the scanner accept connections
    Conntest {
        #[command(flatten)]
        target: Target,
    },

    /// Scan pages into a directory
    Scan {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        options: ScanOptions,
    },
}

/// Which scanner to talk to and how.
#[derive(ClapArgs, Debug, Clone)]
pub struct Target {
    /// Scanner host name, service name, model name or IP address
    #[arg(long)]
    pub host: String,

    /// Seconds to look for the scanner on the network (0 to dial --host directly)
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,

    /// Speak HTTPS to the scanner
    #[arg(long)]
    pub tls: bool,

    /// Accept any certificate the scanner presents
    #[arg(long)]
    pub skip_cert_verify: bool,
}

impl Target {
    pub fn browse_timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ScanOptions {
    /// Directory the page files are written to
    #[arg(long, default_value = "/tmp")]
    pub scan_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Source::Platen)]
    pub source: Source,

    #[arg(long, value_enum, default_value_t = Size::A4)]
    pub size: Size,

    #[arg(long, value_enum, default_value_t = Format::Jpeg)]
    pub format: Format,

    #[arg(long, value_enum, default_value_t = Color::Grayscale8)]
    pub color: Color,

    /// Scan both sides of each sheet (feeder only)
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub duplex: bool,
}

impl ScanOptions {
    /// Scan settings for these options.
    pub fn settings(&self) -> ScanSettings {
        preset::custom(
            self.source.into(),
            self.size.into(),
            self.format.into(),
            self.color.into(),
            self.duplex,
        )
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Platen,
    Adf,
}

impl From<Source> for InputSource {
    fn from(source: Source) -> Self {
        match source {
            Source::Platen => InputSource::Platen,
            Source::Adf => InputSource::Feeder,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    A4,
    Letter,
}

impl From<Size> for PaperSize {
    fn from(size: Size) -> Self {
        match size {
            Size::A4 => PaperSize::A4,
            Size::Letter => PaperSize::Letter,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Jpeg,
    Pdf,
}

impl From<Format> for DocumentFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Jpeg => DocumentFormat::Jpeg,
            Format::Pdf => DocumentFormat::Pdf,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Grayscale8,
    Rgb24,
}

impl From<Color> for ColorMode {
    fn from(color: Color) -> Self {
        match color {
            Color::Grayscale8 => ColorMode::Grayscale8,
            Color::Rgb24 => ColorMode::Rgb24,
        }
    }
}
