// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// eSCL XML codec.
//
// Encodes `ScanSettings` into the `scan:ScanSettings` request body and decodes
// the `ScannerStatus` and `ScannerCapabilities` documents. The encoder's
// output is byte-for-byte what other eSCL clients send; some devices reject
// anything else. The decoder matches on local names only, since devices
// disagree on whether a given element lives in the `scan:` or `pwg:`
// namespace.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{
    AdfCaps, DeviceStatus, InputCaps, Resolution, ScanSettings, ScannerCapabilities,
    SettingProfile,
};

pub const NS_SCAN: &str = "http://schemas.hp.com/imaging/escl/2011/05/03";
pub const NS_PWG: &str = "http://www.pwg.org/schemas/2010/12/sm";

/// How much of an undecodable payload is quoted in the error.
const PAYLOAD_EXCERPT_CHARS: usize = 512;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialize scan settings as an eSCL `ScanSettings` document.
pub fn encode_settings(settings: &ScanSettings) -> Result<Vec<u8>> {
    write_settings(settings).map_err(|e| ScanwerkError::Encode(e.to_string()))
}

fn write_settings(settings: &ScanSettings) -> std::io::Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))?;

    let root = BytesStart::new("scan:ScanSettings")
        .with_attributes([("xmlns:scan", NS_SCAN), ("xmlns:pwg", NS_PWG)]);
    writer.write_event(Event::Start(root))?;

    text_element(&mut writer, "pwg:Version", &settings.version)?;

    let must_honor = bool_text(settings.must_honor);
    writer.write_event(Event::Start(
        BytesStart::new("pwg:ScanRegions").with_attributes([("pwg:MustHonor", must_honor)]),
    ))?;
    for region in &settings.regions {
        writer.write_event(Event::Start(BytesStart::new("pwg:ScanRegion")))?;
        text_element(&mut writer, "pwg:ContentRegionUnits", &region.units)?;
        text_element(&mut writer, "pwg:Width", &region.width.to_string())?;
        text_element(&mut writer, "pwg:Height", &region.height.to_string())?;
        text_element(&mut writer, "pwg:XOffset", &region.x_offset.to_string())?;
        text_element(&mut writer, "pwg:YOffset", &region.y_offset.to_string())?;
        writer.write_event(Event::End(BytesEnd::new("pwg:ScanRegion")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("pwg:ScanRegions")))?;

    text_element(&mut writer, "pwg:DocumentFormat", settings.document_format.mime_type())?;
    text_element(&mut writer, "pwg:InputSource", settings.input_source.escl_keyword())?;
    text_element(&mut writer, "scan:ColorMode", settings.color_mode.escl_keyword())?;
    text_element(&mut writer, "scan:XResolution", &settings.x_resolution.to_string())?;
    text_element(&mut writer, "scan:YResolution", &settings.y_resolution.to_string())?;
    text_element(&mut writer, "scan:Duplex", bool_text(settings.duplex))?;

    writer.write_event(Event::End(BytesEnd::new("scan:ScanSettings")))?;
    Ok(writer.into_inner())
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))
}

fn bool_text(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Minimal element tree; names are local (prefix stripped).
#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn text(&self) -> &str {
        self.text.trim()
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(|c| c.text().to_string())
    }

    /// Texts of every `item` under the `list` child, e.g. ColorModes/ColorMode.
    fn list(&self, list: &str, item: &str) -> Vec<String> {
        self.child(list)
            .map(|l| l.children(item).map(|c| c.text().to_string()).collect())
            .unwrap_or_default()
    }
}

/// Decoder for one payload; keeps the raw bytes around for error reports.
struct Decoder<'a> {
    payload: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload }
    }

    fn error(&self, reason: impl Into<String>) -> ScanwerkError {
        let text = String::from_utf8_lossy(self.payload);
        let mut excerpt: String = text.chars().take(PAYLOAD_EXCERPT_CHARS).collect();
        if text.chars().count() > PAYLOAD_EXCERPT_CHARS {
            excerpt.push_str("...");
        }
        ScanwerkError::Decode {
            reason: reason.into(),
            payload: excerpt,
        }
    }

    fn parse(&self, expected_root: &str) -> Result<Element> {
        let text = std::str::from_utf8(self.payload)
            .map_err(|e| self.error(format!("payload is not UTF-8: {e}")))?;
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| self.error(format!("at byte {}: {e}", reader.buffer_position())))?;
            match event {
                Event::Start(e) => stack.push(Element {
                    name: local_name(&e),
                    ..Default::default()
                }),
                Event::Empty(e) => {
                    let element = Element {
                        name: local_name(&e),
                        ..Default::default()
                    };
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(e) => {
                    let text = e
                        .unescape()
                        .map_err(|e| self.error(format!("bad text content: {e}")))?;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text);
                    }
                }
                Event::CData(e) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Event::End(_) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(self.error("unexpected end of document"));
        }
        let root = root.ok_or_else(|| self.error("document has no root element"))?;
        if root.name != expected_root {
            return Err(self.error(format!(
                "root element is <{}>, want <{expected_root}>",
                root.name
            )));
        }
        Ok(root)
    }

    fn number(&self, element: &Element, name: &str) -> Result<Option<u32>> {
        match element.child(name) {
            None => Ok(None),
            Some(child) if child.text().is_empty() => Ok(None),
            Some(child) => child.text().parse().map(Some).map_err(|e| {
                self.error(format!("<{name}> is not a number ({:?}): {e}", child.text()))
            }),
        }
    }

    fn input_caps(&self, element: &Element) -> Result<InputCaps> {
        let setting_profiles = element
            .child("SettingProfiles")
            .map(|profiles| {
                profiles
                    .children("SettingProfile")
                    .map(|p| self.setting_profile(p))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(InputCaps {
            min_width: self.number(element, "MinWidth")?,
            max_width: self.number(element, "MaxWidth")?,
            min_height: self.number(element, "MinHeight")?,
            max_height: self.number(element, "MaxHeight")?,
            max_optical_x_resolution: self.number(element, "MaxOpticalXResolution")?,
            max_optical_y_resolution: self.number(element, "MaxOpticalYResolution")?,
            setting_profiles,
            intents: element.list("SupportedIntents", "Intent"),
        })
    }

    fn setting_profile(&self, element: &Element) -> Result<SettingProfile> {
        let mut document_formats = element.list("DocumentFormats", "DocumentFormat");
        for ext in element.list("DocumentFormats", "DocumentFormatExt") {
            if !document_formats.contains(&ext) {
                document_formats.push(ext);
            }
        }

        let mut resolutions = Vec::new();
        if let Some(discrete) = element
            .child("SupportedResolutions")
            .and_then(|s| s.child("DiscreteResolutions"))
        {
            for res in discrete.children("DiscreteResolution") {
                if let (Some(x), Some(y)) = (
                    self.number(res, "XResolution")?,
                    self.number(res, "YResolution")?,
                ) {
                    resolutions.push(Resolution { x, y });
                }
            }
        }

        Ok(SettingProfile {
            color_modes: element.list("ColorModes", "ColorMode"),
            content_types: element.list("ContentTypes", "ContentType"),
            document_formats,
            resolutions,
        })
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Decode a `ScannerStatus` document.
pub fn decode_status(payload: &[u8]) -> Result<DeviceStatus> {
    let decoder = Decoder::new(payload);
    let root = decoder.parse("ScannerStatus")?;
    Ok(DeviceStatus {
        version: root.child_text("Version").unwrap_or_default(),
        state: root.child_text("State").unwrap_or_default(),
        adf_state: root.child_text("AdfState").filter(|s| !s.is_empty()),
    })
}

/// Decode a `ScannerCapabilities` document.
pub fn decode_capabilities(payload: &[u8]) -> Result<ScannerCapabilities> {
    let decoder = Decoder::new(payload);
    let root = decoder.parse("ScannerCapabilities")?;

    let platen = root
        .child("Platen")
        .and_then(|p| p.child("PlatenInputCaps"))
        .map(|caps| decoder.input_caps(caps))
        .transpose()?;

    let adf = match root.child("Adf") {
        None => None,
        Some(adf) => Some(AdfCaps {
            simplex: adf
                .child("AdfSimplexInputCaps")
                .map(|caps| decoder.input_caps(caps))
                .transpose()?,
            duplex: adf
                .child("AdfDuplexInputCaps")
                .map(|caps| decoder.input_caps(caps))
                .transpose()?,
            feeder_capacity: decoder.number(adf, "FeederCapacity")?,
            options: adf.list("AdfOptions", "AdfOption"),
        }),
    };

    let optional = |name: &str| root.child_text(name).filter(|s| !s.is_empty());
    Ok(ScannerCapabilities {
        version: root.child_text("Version").unwrap_or_default(),
        make_and_model: optional("MakeAndModel"),
        manufacturer: optional("Manufacturer"),
        serial_number: optional("SerialNumber"),
        uuid: optional("UUID"),
        admin_uri: optional("AdminURI"),
        icon_uri: optional("IconURI"),
        platen,
        adf,
    })
}
