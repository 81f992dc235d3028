//! Icon-group (GRPICONDIR) decoder.

use serde::{Deserialize, Serialize};

use crate::bytes::{read_u16_le, read_u32_le};
use crate::error::{PeError, PeResult};
use crate::pe::Image;
use crate::resources::{items_of_type, resource_type, ResourceItem};

const HEADER_SIZE: usize = 6;
const ENTRY_SIZE: usize = 14;

/// One icon image descriptor inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconEntry {
    /// Pixel width; a stored 0 means 256.
    pub width: u16,
    /// Pixel height; a stored 0 means 256.
    pub height: u16,
    pub color_count: u8,
    pub planes: u16,
    pub bit_count: u16,
    pub bytes_in_res: u32,
    /// Resource id of the RT_ICON entry holding the image bytes.
    pub icon_id: u16,
}

/// Ordered icon-group directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconGroup {
    pub group_id: Option<String>,
    pub entries: Vec<IconEntry>,
}

/// Decode every GROUP_ICON resource of the image.
pub fn decode(image: &Image, items: &[ResourceItem]) -> PeResult<Vec<IconGroup>> {
    let mut groups = Vec::new();
    for item in items_of_type(items, resource_type::GROUP_ICON) {
        let data = item.data(image)?;
        let entries = decode_group(data)?;
        groups.push(IconGroup {
            group_id: item.name_id().map(|id| id.to_string()),
            entries,
        });
    }
    Ok(groups)
}

/// Parse one raw GRPICONDIR blob: `{reserved, type == 1, count}` followed by
/// `count` fixed packed entries.
pub fn decode_group(data: &[u8]) -> PeResult<Vec<IconEntry>> {
    if data.len() < HEADER_SIZE {
        return Err(PeError::malformed("icon group header", 0));
    }
    if read_u16_le(data, 0)? != 0 || read_u16_le(data, 2)? != 1 {
        return Err(PeError::malformed("icon group type", 0));
    }
    let count = read_u16_le(data, 4)? as usize;

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let off = HEADER_SIZE + i * ENTRY_SIZE;
        if off + ENTRY_SIZE > data.len() {
            return Err(PeError::malformed("icon group entry", off as u64));
        }
        let raw_width = data[off];
        let raw_height = data[off + 1];
        entries.push(IconEntry {
            width: if raw_width == 0 { 256 } else { u16::from(raw_width) },
            height: if raw_height == 0 { 256 } else { u16::from(raw_height) },
            color_count: data[off + 2],
            planes: read_u16_le(data, off + 4)?,
            bit_count: read_u16_le(data, off + 6)?,
            bytes_in_res: read_u32_le(data, off + 8)?,
            icon_id: read_u16_le(data, off + 12)?,
        });
    }
    Ok(entries)
}
