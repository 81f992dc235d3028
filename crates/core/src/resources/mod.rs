//! Resource-directory tree enumeration and the decoders built on top of it.
//!
//! The walk is generic over the directory tree; the VERSION, MANIFEST and
//! icon-group decoders are pure functions over already-enumerated items and
//! each is independently absent when its resource type is missing.

pub mod icons;
pub mod manifest;
pub mod version;

use serde::{Deserialize, Serialize};

use crate::error::{PeError, PeResult};
use crate::pe::{directory, Image};

/// Well-known resource type ids.
pub mod resource_type {
    pub const ICON: u16 = 3;
    pub const GROUP_ICON: u16 = 14;
    pub const VERSION: u16 = 16;
    pub const MANIFEST: u16 = 24;
}

const DIRECTORY_HEADER_SIZE: u64 = 16;
const ENTRY_SIZE: u64 = 8;
const DATA_ENTRY_SIZE: u64 = 16;
const MAX_NAME_UNITS: u64 = 1024;

/// Defensive caps against malformed or hostile trees. These are not format
/// requirements; exceeding either is a hard failure, not silent truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_depth: u32,
    pub max_items: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self { max_depth: 16, max_items: 200_000 }
    }
}

/// Identifier of one directory level: a 16-bit numeric id or a
/// length-prefixed UTF-16 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceId {
    Id(u16),
    Name(String),
}

impl ResourceId {
    pub fn as_id(&self) -> Option<u16> {
        match self {
            ResourceId::Id(id) => Some(*id),
            ResourceId::Name(_) => None,
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceId::Id(id) => write!(f, "#{id}"),
            ResourceId::Name(name) => write!(f, "{name}"),
        }
    }
}

/// One leaf of the resource tree with the identifier path that led to it.
///
/// A well-formed tree is three levels deep (type / name / language) but the
/// walk does not assume that; the accessors below return `None` for levels
/// the tree did not provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceItem {
    pub path: Vec<ResourceId>,
    pub rva: u32,
    pub size: u32,
    pub code_page: u32,
}

impl ResourceItem {
    pub fn type_id(&self) -> Option<&ResourceId> {
        self.path.first()
    }

    pub fn name_id(&self) -> Option<&ResourceId> {
        self.path.get(1)
    }

    pub fn language(&self) -> Option<&ResourceId> {
        self.path.get(2)
    }

    /// Resolve this item's byte range through the image's section table.
    pub fn data<'a>(&self, image: &'a Image) -> PeResult<&'a [u8]> {
        let off = image
            .rva_to_offset(self.rva)
            .ok_or(PeError::malformed("resource data RVA", u64::from(self.rva)))?;
        image.bytes().read_at(off, u64::from(self.size))
    }
}

/// Enumerate every leaf of the resource directory tree.
///
/// Returns an empty list when the image has no resource directory. The walk
/// is bounded by `limits`; a tree deeper than `max_depth` or with more than
/// `max_items` leaves is rejected outright.
pub fn enumerate(image: &Image, limits: &ResourceLimits) -> PeResult<Vec<ResourceItem>> {
    let dir = match image.directory(directory::RESOURCE) {
        Some(d) => d,
        None => return Ok(Vec::new()),
    };
    let base = image
        .rva_to_offset(dir.rva)
        .ok_or(PeError::malformed("resource directory RVA", u64::from(dir.rva)))?;

    let mut items = Vec::new();
    walk_directory(image, base, 0, Vec::new(), 0, limits, &mut items)?;
    Ok(items)
}

/// Recursive walk of one directory node. Each call owns its cloned path
/// context; `dir_offset` is relative to the resource directory base.
fn walk_directory(
    image: &Image,
    base: u64,
    dir_offset: u64,
    path: Vec<ResourceId>,
    depth: u32,
    limits: &ResourceLimits,
    items: &mut Vec<ResourceItem>,
) -> PeResult<()> {
    if depth >= limits.max_depth {
        return Err(PeError::malformed("resource tree too deep", base + dir_offset));
    }

    let node = base + dir_offset;
    let named_entries = u64::from(image.bytes().read_u16(node + 12)?);
    let id_entries = u64::from(image.bytes().read_u16(node + 14)?);

    for i in 0..named_entries + id_entries {
        let entry = node + DIRECTORY_HEADER_SIZE + i * ENTRY_SIZE;
        let name_field = image.bytes().read_u32(entry)?;
        let data_field = image.bytes().read_u32(entry + 4)?;

        let id = if name_field & 0x8000_0000 != 0 {
            let name_off = base + u64::from(name_field & 0x7FFF_FFFF);
            let units = u64::from(image.bytes().read_u16(name_off)?);
            if units > MAX_NAME_UNITS {
                return Err(PeError::malformed("resource name length", name_off));
            }
            ResourceId::Name(image.bytes().read_utf16(name_off + 2, units)?)
        } else {
            ResourceId::Id((name_field & 0xFFFF) as u16)
        };

        let mut child_path = path.clone();
        child_path.push(id);

        if data_field & 0x8000_0000 != 0 {
            let sub_offset = u64::from(data_field & 0x7FFF_FFFF);
            walk_directory(image, base, sub_offset, child_path, depth + 1, limits, items)?;
        } else {
            let data_entry = base + u64::from(data_field);
            // Touch the whole entry first so a truncated leaf fails cleanly.
            image.bytes().read_at(data_entry, DATA_ENTRY_SIZE)?;
            if items.len() >= limits.max_items {
                return Err(PeError::malformed("resource item count", data_entry));
            }
            items.push(ResourceItem {
                path: child_path,
                rva: image.bytes().read_u32(data_entry)?,
                size: image.bytes().read_u32(data_entry + 4)?,
                code_page: image.bytes().read_u32(data_entry + 8)?,
            });
        }
    }
    Ok(())
}

/// All enumerated items whose type level is the given numeric id.
pub fn items_of_type<'a>(items: &'a [ResourceItem], type_id: u16) -> Vec<&'a ResourceItem> {
    items
        .iter()
        .filter(|item| item.type_id().and_then(ResourceId::as_id) == Some(type_id))
        .collect()
}
