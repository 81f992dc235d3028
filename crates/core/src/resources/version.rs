//! VS_VERSIONINFO decoder.
//!
//! The version resource is a tree of variable-length blocks:
//! `(wLength, wValueLength, wType, zero-terminated UTF-16 key, padded value,
//! padded children...)`. The root block carries the fixed
//! `VS_FIXEDFILEINFO` struct; nested text blocks contribute the string table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bytes::{read_u16_le, read_u32_le};
use crate::error::{PeError, PeResult};
use crate::pe::Image;
use crate::resources::{items_of_type, resource_type, ResourceItem};

const FIXEDFILEINFO_SIGNATURE: u32 = 0xFEEF_04BD;
const FIXEDFILEINFO_SIZE: usize = 52;

/// Decoded version resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub file_version: (u16, u16, u16, u16),
    pub product_version: (u16, u16, u16, u16),
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    /// String table (e.g. "CompanyName" -> "..."). Key order is irrelevant
    /// in the format; stored sorted for stable output.
    pub strings: BTreeMap<String, String>,
}

impl VersionInfo {
    /// Dotted display form of the file version quad.
    pub fn file_version_string(&self) -> String {
        let (a, b, c, d) = self.file_version;
        format!("{a}.{b}.{c}.{d}")
    }

    pub fn product_version_string(&self) -> String {
        let (a, b, c, d) = self.product_version;
        format!("{a}.{b}.{c}.{d}")
    }
}

/// Decode the first VERSION resource of the image, if one exists.
pub fn decode(image: &Image, items: &[ResourceItem]) -> PeResult<Option<VersionInfo>> {
    let item = match items_of_type(items, resource_type::VERSION).first() {
        Some(item) => (*item).clone(),
        None => return Ok(None),
    };
    let data = item.data(image)?;
    decode_block_tree(data).map(Some)
}

/// Parse a raw VS_VERSIONINFO blob.
pub fn decode_block_tree(data: &[u8]) -> PeResult<VersionInfo> {
    let root = Block::parse(data, 0)?;
    if root.key != "VS_VERSION_INFO" || root.value_type != 0 {
        return Err(PeError::malformed("VS_VERSION_INFO root key", 0));
    }
    let fixed = root.value(data)?;
    if fixed.len() < FIXEDFILEINFO_SIZE {
        return Err(PeError::malformed("VS_FIXEDFILEINFO size", root.value_offset as u64));
    }
    if read_u32_le(fixed, 0)? != FIXEDFILEINFO_SIGNATURE {
        return Err(PeError::malformed("VS_FIXEDFILEINFO signature", root.value_offset as u64));
    }

    let file_version = version_quad(read_u32_le(fixed, 8)?, read_u32_le(fixed, 12)?);
    let product_version = version_quad(read_u32_le(fixed, 16)?, read_u32_le(fixed, 20)?);
    let file_flags = read_u32_le(fixed, 28)? & read_u32_le(fixed, 24)?;
    let file_os = read_u32_le(fixed, 32)?;
    let file_type = read_u32_le(fixed, 36)?;

    let mut strings = BTreeMap::new();
    for child in root.children(data)? {
        if child.key == "StringFileInfo" {
            collect_string_tables(data, &child, &mut strings)?;
        }
    }

    Ok(VersionInfo { file_version, product_version, file_flags, file_os, file_type, strings })
}

fn version_quad(ms: u32, ls: u32) -> (u16, u16, u16, u16) {
    ((ms >> 16) as u16, (ms & 0xFFFF) as u16, (ls >> 16) as u16, (ls & 0xFFFF) as u16)
}

/// Walk StringFileInfo -> StringTable -> String blocks; every block of
/// `wType == 1` at the leaf level contributes one key/value pair.
fn collect_string_tables(
    data: &[u8],
    string_file_info: &Block,
    out: &mut BTreeMap<String, String>,
) -> PeResult<()> {
    for table in string_file_info.children(data)? {
        for entry in table.children(data)? {
            if entry.value_type != 1 {
                continue;
            }
            let value = entry.value(data)?;
            out.insert(entry.key.clone(), decode_utf16z_value(value));
        }
    }
    Ok(())
}

/// Text block values are UTF-16 with an optional trailing NUL.
fn decode_utf16z_value(value: &[u8]) -> String {
    let units: Vec<u16> =
        value.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// One version-resource block header plus the offsets needed to slice its
/// value and children out of the containing blob.
struct Block {
    /// Offset of the block within the blob.
    start: usize,
    /// Total length of the block including children.
    length: usize,
    /// Byte length of the value (text blocks declare it in u16 units).
    value_len: usize,
    value_type: u16,
    key: String,
    value_offset: usize,
}

impl Block {
    fn parse(data: &[u8], start: usize) -> PeResult<Self> {
        let length = read_u16_le(data, start)? as usize;
        let raw_value_len = read_u16_le(data, start + 2)? as usize;
        let value_type = read_u16_le(data, start + 4)?;
        if length < 6 || start + length > data.len() {
            return Err(PeError::malformed("version block length", start as u64));
        }

        // Zero-terminated UTF-16 key immediately after the three words.
        let mut key_units = Vec::new();
        let mut pos = start + 6;
        loop {
            let unit = read_u16_le(data, pos)?;
            pos += 2;
            if unit == 0 {
                break;
            }
            if pos > start + length {
                return Err(PeError::malformed("version block key", start as u64));
            }
            key_units.push(unit);
        }
        let key = String::from_utf16_lossy(&key_units);

        let value_offset = align4(pos);
        let value_len = if value_type == 1 { raw_value_len * 2 } else { raw_value_len };
        Ok(Self { start, length, value_len, value_type, key, value_offset })
    }

    fn value<'a>(&self, data: &'a [u8]) -> PeResult<&'a [u8]> {
        let end = self.value_offset + self.value_len;
        if end > data.len() || end > self.start + self.length {
            return Err(PeError::malformed("version block value", self.value_offset as u64));
        }
        Ok(&data[self.value_offset..end])
    }

    /// Child blocks start 4-byte aligned after the value and run to the end
    /// of this block.
    fn children(&self, data: &[u8]) -> PeResult<Vec<Block>> {
        let mut out = Vec::new();
        let mut pos = align4(self.value_offset + self.value_len);
        let end = self.start + self.length;
        while pos + 6 <= end {
            let child = Block::parse(data, pos)?;
            if child.length == 0 {
                break;
            }
            pos = align4(child.start + child.length);
            out.push(child);
        }
        Ok(out)
    }
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}
