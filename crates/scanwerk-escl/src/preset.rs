// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Known-good scan settings.
//
// These match, element for element, the requests that widely deployed eSCL
// clients send, which is the safest starting point for devices in the wild.
// Each call returns a fresh value that is safe to modify.

use scanwerk_core::types::{ColorMode, DocumentFormat, InputSource, PaperSize, ScanSettings};

/// Protocol version advertised in every request.
pub const ESCL_VERSION: &str = "2.0";

/// A4 at 300 dpi from the document feeder, grayscale JPEG, both sides.
pub fn grayscale_a4_adf() -> ScanSettings {
    ScanSettings {
        version: ESCL_VERSION.into(),
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

/// Settings for an arbitrary source/size/format/colour combination at 300 dpi.
pub fn custom(
    source: InputSource,
    size: PaperSize,
    format: DocumentFormat,
    color_mode: ColorMode,
    duplex: bool,
) -> ScanSettings {
    ScanSettings {
        regions: vec![size.region()],
        document_format: format,
        input_source: source,
        color_mode,
        // The platen has only one side.
        duplex: duplex && source == InputSource::Feeder,
        ..grayscale_a4_adf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_preset_is_valid() {
        let settings = grayscale_a4_adf();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.regions[0].width, 2480);
        assert_eq!(settings.regions[0].height, 3508);
        assert!(settings.duplex);
    }

    #[test]
    fn platen_never_requests_duplex() {
        let settings = custom(
            InputSource::Platen,
            PaperSize::Letter,
            DocumentFormat::Pdf,
            ColorMode::Rgb24,
            true,
        );
        assert!(!settings.duplex);
        assert_eq!(settings.regions, vec![PaperSize::Letter.region()]);
        assert_eq!(settings.x_resolution, 300);
    }
}
