//! Application-manifest decoder.
//!
//! Encoding is detected by BOM sniffing; attribute extraction is a targeted
//! substring search with matching-quote scanning, deliberately not an XML
//! parser.

use serde::{Deserialize, Serialize};

use crate::error::PeResult;
use crate::pe::Image;
use crate::resources::{items_of_type, resource_type, ResourceItem};

/// Text encoding detected for the manifest blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
}

/// Decoded manifest resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub encoding: ManifestEncoding,
    pub text: String,
    pub requested_execution_level: Option<String>,
    pub ui_access: Option<String>,
}

/// Decode the first MANIFEST resource of the image, if one exists.
pub fn decode(image: &Image, items: &[ResourceItem]) -> PeResult<Option<ManifestInfo>> {
    let item = match items_of_type(items, resource_type::MANIFEST).first() {
        Some(item) => (*item).clone(),
        None => return Ok(None),
    };
    let data = item.data(image)?;
    Ok(Some(decode_bytes(data)))
}

/// Decode a raw manifest blob.
pub fn decode_bytes(data: &[u8]) -> ManifestInfo {
    let (encoding, text) = sniff_and_decode(data);
    let requested_execution_level = find_attribute(&text, "requestedExecutionLevel", "level")
        .or_else(|| find_attribute_value(&text, "level"));
    let ui_access = find_attribute_value(&text, "uiAccess");
    ManifestInfo { encoding, text, requested_execution_level, ui_access }
}

/// BOM sniffing: UTF-16LE BOM, UTF-8 BOM, or the BOM-less UTF-16 heuristic
/// of a leading `<` followed by a zero byte. Everything else is UTF-8.
fn sniff_and_decode(data: &[u8]) -> (ManifestEncoding, String) {
    if data.len() >= 2 && data[0] == 0xFF && data[1] == 0xFE {
        return (ManifestEncoding::Utf16Le, decode_utf16le(&data[2..]));
    }
    if data.len() >= 3 && data[0] == 0xEF && data[1] == 0xBB && data[2] == 0xBF {
        return (ManifestEncoding::Utf8Bom, String::from_utf8_lossy(&data[3..]).into_owned());
    }
    if data.len() >= 2 && data[0] == b'<' && data[1] == 0 {
        return (ManifestEncoding::Utf16Le, decode_utf16le(data));
    }
    (ManifestEncoding::Utf8, String::from_utf8_lossy(data).into_owned())
}

fn decode_utf16le(data: &[u8]) -> String {
    let units: Vec<u16> =
        data.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16_lossy(&units)
}

/// Find `attr="value"` inside the first element named `element`.
fn find_attribute(text: &str, element: &str, attr: &str) -> Option<String> {
    let start = text.find(&format!("<{element}"))?;
    let rest = &text[start..];
    let end = rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
    find_attribute_value(&rest[..end], attr)
}

/// Find the quoted value of `attr` by substring plus matching-quote search.
fn find_attribute_value(text: &str, attr: &str) -> Option<String> {
    let mut search = text;
    loop {
        let pos = search.find(attr)?;
        let after = &search[pos + attr.len()..];
        let trimmed = after.trim_start();
        if let Some(rest) = trimmed.strip_prefix('=') {
            let rest = rest.trim_start();
            let quote = rest.chars().next()?;
            if quote == '"' || quote == '\'' {
                let body = &rest[1..];
                let close = body.find(quote)?;
                return Some(body[..close].to_string());
            }
        }
        // Attribute name matched some other text; keep searching.
        search = &search[pos + attr.len()..];
    }
}
