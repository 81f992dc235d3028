//! Debug metadata: the embedded CodeView RSDS record linking a PE image to
//! its PDB, plus the standalone MSF/PDB container reader in [`msf`].

pub mod msf;

use serde::{Deserialize, Serialize};

use crate::error::{PeError, PeResult};
use crate::pe::{directory, Image};

const DEBUG_ENTRY_SIZE: u64 = 28;
const DEBUG_TYPE_CODEVIEW: u32 = 2;
const RSDS_MAGIC: u32 = 0x5344_5352; // "RSDS"
const MAX_PDB_PATH_LEN: u64 = 4096;

/// A Windows GUID held as its 16 raw bytes.
///
/// The canonical text form renders the first three fields little-endian and
/// the trailing eight bytes in order, matching how the OS displays them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Canonical dashed form, uppercase: `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.
    pub fn to_dashed(&self) -> String {
        let b = &self.0;
        let data1 = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let data2 = u16::from_le_bytes([b[4], b[5]]);
        let data3 = u16::from_le_bytes([b[6], b[7]]);
        format!(
            "{data1:08X}-{data2:04X}-{data3:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_dashed())
    }
}

/// Embedded CodeView RSDS record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugRecord {
    pub guid: Guid,
    pub age: u32,
    /// PDB path as written by the linker.
    pub pdb_path: String,
}

impl DebugRecord {
    /// Symbol-server key: GUID without dashes, uppercased, concatenated with
    /// the age in lowercase hex.
    pub fn symbol_key(&self) -> String {
        symbol_key(&self.guid, self.age)
    }

    /// Symbol-server-style relative path `name.pdb/KEY/name.pdb`.
    pub fn symbol_server_path(&self) -> String {
        let file = self
            .pdb_path
            .rsplit(['\\', '/'])
            .next()
            .unwrap_or(self.pdb_path.as_str());
        format!("{file}/{}/{file}", self.symbol_key())
    }
}

/// Derive the symbol-server key for any GUID+age pair.
pub fn symbol_key(guid: &Guid, age: u32) -> String {
    let dashless: String = guid.to_dashed().chars().filter(|&c| c != '-').collect();
    format!("{dashless}{age:x}")
}

/// Verdict of comparing a PE's RSDS record against a PDB's info stream.
///
/// A pair matches iff GUID and age are bit-identical; the mismatch variants
/// name which of the two disagreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchVerdict {
    Matched,
    GuidMismatch,
    AgeMismatch,
}

/// Compare GUID+age pairs from a PE image and a PDB container.
pub fn match_pe_pdb(pe_guid: &Guid, pe_age: u32, pdb_guid: &Guid, pdb_age: u32) -> MatchVerdict {
    if pe_guid != pdb_guid {
        MatchVerdict::GuidMismatch
    } else if pe_age != pdb_age {
        MatchVerdict::AgeMismatch
    } else {
        MatchVerdict::Matched
    }
}

/// Scan the debug directory for a CodeView entry and decode its RSDS record.
///
/// Returns `None` when the image has no debug directory or no CodeView entry
/// in it; a CodeView entry with a broken RSDS payload is an error.
pub fn find_codeview_record(image: &Image) -> PeResult<Option<DebugRecord>> {
    let dir = match image.directory(directory::DEBUG) {
        Some(d) => d,
        None => return Ok(None),
    };
    let base = image
        .rva_to_offset(dir.rva)
        .ok_or(PeError::malformed("debug directory RVA", u64::from(dir.rva)))?;

    let entry_count = u64::from(dir.size) / DEBUG_ENTRY_SIZE;
    for i in 0..entry_count {
        let entry = base + i * DEBUG_ENTRY_SIZE;
        let entry_type = image.bytes().read_u32(entry + 12)?;
        if entry_type != DEBUG_TYPE_CODEVIEW {
            continue;
        }
        let size = image.bytes().read_u32(entry + 16)?;
        let pointer = u64::from(image.bytes().read_u32(entry + 24)?);
        return parse_rsds(image, pointer, size).map(Some);
    }
    Ok(None)
}

/// Decode an RSDS region: magic, GUID, age, then a NUL-terminated path.
fn parse_rsds(image: &Image, offset: u64, size: u32) -> PeResult<DebugRecord> {
    if size < 24 {
        return Err(PeError::malformed("CodeView record size", offset));
    }
    if image.bytes().read_u32(offset)? != RSDS_MAGIC {
        return Err(PeError::malformed("RSDS magic", offset));
    }
    let mut guid = [0u8; 16];
    guid.copy_from_slice(image.bytes().read_at(offset + 4, 16)?);
    let age = image.bytes().read_u32(offset + 20)?;
    let pdb_path = image.bytes().read_cstr(offset + 24, MAX_PDB_PATH_LEN)?;
    Ok(DebugRecord { guid: Guid(guid), age, pdb_path })
}
