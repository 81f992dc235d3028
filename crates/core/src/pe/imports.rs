//! Import and delay-import table walks.

use serde::{Deserialize, Serialize};

use crate::error::{PeError, PeResult};
use crate::pe::{directory, Image};

const IMPORT_DESCRIPTOR_SIZE: u64 = 20;
const DELAY_DESCRIPTOR_SIZE: u64 = 32;

// Defensive caps against descriptor/thunk arrays that never terminate
// inside the mapped range.
const MAX_IMPORT_MODULES: usize = 4096;
const MAX_FUNCTIONS_PER_MODULE: usize = 65536;

const MAX_NAME_LEN: u64 = 4096;

/// One imported function: either a name (with hint) or a bare ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedFunction {
    pub name: Option<String>,
    pub ordinal: Option<u16>,
    /// RVA of the thunk slot this function was read from.
    pub thunk_rva: u32,
}

/// One imported module and its functions, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedModule {
    pub name: String,
    pub functions: Vec<ImportedFunction>,
    /// True when this module came from the delay-import table.
    pub delayed: bool,
}

/// Walk the import directory. Returns an empty list when the directory is
/// absent; a structurally broken table is an error, never a partial result.
pub fn parse_imports(image: &Image) -> PeResult<Vec<ImportedModule>> {
    let dir = match image.directory(directory::IMPORT) {
        Some(d) => d,
        None => return Ok(Vec::new()),
    };
    let base = image
        .rva_to_offset(dir.rva)
        .ok_or(PeError::malformed("import directory RVA", u64::from(dir.rva)))?;

    let mut modules = Vec::new();
    for index in 0..=MAX_IMPORT_MODULES as u64 {
        if index == MAX_IMPORT_MODULES as u64 {
            return Err(PeError::malformed("unterminated import descriptor array", base));
        }
        let desc = base + index * IMPORT_DESCRIPTOR_SIZE;
        let original_first_thunk = image.bytes().read_u32(desc)?;
        let name_rva = image.bytes().read_u32(desc + 12)?;
        let first_thunk = image.bytes().read_u32(desc + 16)?;

        // Zero-filled descriptor terminates the array.
        if original_first_thunk == 0 && name_rva == 0 && first_thunk == 0 {
            break;
        }

        let name_off = image
            .rva_to_offset(name_rva)
            .ok_or(PeError::malformed("import module name RVA", u64::from(name_rva)))?;
        let name = image.bytes().read_cstr(name_off, MAX_NAME_LEN)?;

        // Prefer the import name table; fall back to the IAT when absent.
        let thunk_rva = if original_first_thunk != 0 { original_first_thunk } else { first_thunk };
        let functions = walk_thunks(image, thunk_rva)?;
        modules.push(ImportedModule { name, functions, delayed: false });
    }
    Ok(modules)
}

/// Walk the delay-import directory.
///
/// Delay descriptors declare their addressing mode in the attributes field:
/// bit 0 set means the descriptor fields are RVAs, clear means they are
/// virtual addresses that must be rebased against the image base before the
/// shared thunk walk can be reused.
pub fn parse_delay_imports(image: &Image) -> PeResult<Vec<ImportedModule>> {
    let dir = match image.directory(directory::DELAY_IMPORT) {
        Some(d) => d,
        None => return Ok(Vec::new()),
    };
    let base = image
        .rva_to_offset(dir.rva)
        .ok_or(PeError::malformed("delay-import directory RVA", u64::from(dir.rva)))?;

    let mut modules = Vec::new();
    for index in 0..=MAX_IMPORT_MODULES as u64 {
        if index == MAX_IMPORT_MODULES as u64 {
            return Err(PeError::malformed("unterminated delay-import descriptor array", base));
        }
        let desc = base + index * DELAY_DESCRIPTOR_SIZE;
        let attributes = image.bytes().read_u32(desc)?;
        let name_field = image.bytes().read_u32(desc + 4)?;
        let name_table_field = image.bytes().read_u32(desc + 16)?;

        if name_field == 0 && name_table_field == 0 {
            break;
        }

        let name_rva = normalize_delay_field(image, attributes, name_field)?;
        let thunk_rva = normalize_delay_field(image, attributes, name_table_field)?;

        let name_off = image
            .rva_to_offset(name_rva)
            .ok_or(PeError::malformed("delay-import module name RVA", u64::from(name_rva)))?;
        let name = image.bytes().read_cstr(name_off, MAX_NAME_LEN)?;

        let functions = walk_thunks(image, thunk_rva)?;
        modules.push(ImportedModule { name, functions, delayed: true });
    }
    Ok(modules)
}

/// Normalize a delay-descriptor address field to an RVA.
fn normalize_delay_field(image: &Image, attributes: u32, field: u32) -> PeResult<u32> {
    if attributes & 1 != 0 {
        return Ok(field);
    }
    // VA-relative descriptor (legacy VC6 layout): rebase against image base.
    u64::from(field)
        .checked_sub(image.image_base())
        .and_then(|rva| u32::try_from(rva).ok())
        .ok_or(PeError::malformed("delay-import VA below image base", u64::from(field)))
}

/// Walk one thunk array until its zero terminator.
fn walk_thunks(image: &Image, thunk_rva: u32) -> PeResult<Vec<ImportedFunction>> {
    let start = image
        .rva_to_offset(thunk_rva)
        .ok_or(PeError::malformed("import thunk RVA", u64::from(thunk_rva)))?;
    let thunk_size: u64 = if image.is_64bit() { 8 } else { 4 };
    let ordinal_flag: u64 = if image.is_64bit() { 1 << 63 } else { 1 << 31 };

    let mut functions = Vec::new();
    for index in 0..=MAX_FUNCTIONS_PER_MODULE as u64 {
        if index == MAX_FUNCTIONS_PER_MODULE as u64 {
            return Err(PeError::malformed("unterminated import thunk array", start));
        }
        let off = start + index * thunk_size;
        let value = if image.is_64bit() {
            image.bytes().read_u64(off)?
        } else {
            u64::from(image.bytes().read_u32(off)?)
        };
        if value == 0 {
            break;
        }

        let slot_rva = u32::try_from(u64::from(thunk_rva) + index * thunk_size)
            .map_err(|_| PeError::malformed("import thunk RVA overflow", off))?;
        if value & ordinal_flag != 0 {
            functions.push(ImportedFunction {
                name: None,
                ordinal: Some((value & 0xFFFF) as u16),
                thunk_rva: slot_rva,
            });
        } else {
            // Name thunk: the RVA points at a hint/name entry; the name
            // string begins 2 bytes past the hint field.
            let name_rva = (value & 0x7FFF_FFFF) as u32;
            let hint_off = image
                .rva_to_offset(name_rva)
                .ok_or(PeError::malformed("import name RVA", u64::from(name_rva)))?;
            let name = image.bytes().read_cstr(hint_off + 2, MAX_NAME_LEN)?;
            functions.push(ImportedFunction { name: Some(name), ordinal: None, thunk_rva: slot_rva });
        }
    }
    Ok(functions)
}
