//! Export directory parsing, including forwarder detection.

use serde::{Deserialize, Serialize};

use crate::error::{PeError, PeResult};
use crate::pe::{directory, Image};

const MAX_EXPORT_FUNCTIONS: u32 = 65536;
const MAX_EXPORT_NAME_LEN: u64 = 512;
const MAX_FORWARDER_LEN: u64 = 512;

/// One exported symbol.
///
/// Ordinals are not required to be unique or contiguous by the format, so
/// this is a plain list in function-array order, not a map keyed by ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedFunction {
    pub ordinal: u32,
    pub rva: u32,
    pub name: Option<String>,
    /// `"Dll.Symbol"` or `"Dll.#Ordinal"` when this entry redirects to
    /// another module instead of providing code.
    pub forwarder: Option<String>,
}

/// Parsed export directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTable {
    pub module_name: Option<String>,
    pub ordinal_base: u32,
    pub functions: Vec<ExportedFunction>,
}

/// Parse the export directory. Returns `None` when the image exports nothing.
pub fn parse_exports(image: &Image) -> PeResult<Option<ExportTable>> {
    let dir = match image.directory(directory::EXPORT) {
        Some(d) => d,
        None => return Ok(None),
    };
    let base = image
        .rva_to_offset(dir.rva)
        .ok_or(PeError::malformed("export directory RVA", u64::from(dir.rva)))?;

    let name_rva = image.bytes().read_u32(base + 12)?;
    let ordinal_base = image.bytes().read_u32(base + 16)?;
    let num_functions = image.bytes().read_u32(base + 20)?;
    let num_names = image.bytes().read_u32(base + 24)?;
    let functions_rva = image.bytes().read_u32(base + 28)?;
    let names_rva = image.bytes().read_u32(base + 32)?;
    let name_ordinals_rva = image.bytes().read_u32(base + 36)?;

    if num_functions > MAX_EXPORT_FUNCTIONS {
        return Err(PeError::malformed("export function count", base + 20));
    }

    let module_name = match image.rva_to_offset(name_rva) {
        Some(off) => Some(image.bytes().read_cstr(off, MAX_EXPORT_NAME_LEN)?),
        None => None,
    };

    let functions_off = image
        .rva_to_offset(functions_rva)
        .ok_or(PeError::malformed("export address table RVA", u64::from(functions_rva)))?;

    let mut functions = Vec::new();
    // Indices into the function array that carry entries; zero RVAs are
    // unused ordinal slots and produce no export.
    let mut slot_to_index = vec![None; num_functions as usize];
    for i in 0..num_functions {
        let rva = image.bytes().read_u32(functions_off + u64::from(i) * 4)?;
        if rva == 0 {
            continue;
        }
        let forwarder = decode_forwarder(image, dir.rva, dir.size, rva)?;
        slot_to_index[i as usize] = Some(functions.len());
        functions.push(ExportedFunction {
            ordinal: ordinal_base.wrapping_add(i),
            rva,
            name: None,
            forwarder,
        });
    }

    // Cross-reference the parallel name and name-ordinal arrays. The
    // name-ordinal values are raw indices into the function array (not
    // biased by the ordinal base) and arrive in no guaranteed order, so this
    // is an arbitrary index map, never a binary search.
    if num_names > 0 {
        let names_off = image
            .rva_to_offset(names_rva)
            .ok_or(PeError::malformed("export name table RVA", u64::from(names_rva)))?;
        let ords_off = image
            .rva_to_offset(name_ordinals_rva)
            .ok_or(PeError::malformed("export name-ordinal table RVA", u64::from(name_ordinals_rva)))?;

        for j in 0..u64::from(num_names) {
            let name_rva = image.bytes().read_u32(names_off + j * 4)?;
            let index = image.bytes().read_u16(ords_off + j * 2)? as usize;
            if index >= slot_to_index.len() {
                return Err(PeError::malformed("export name-ordinal index", ords_off + j * 2));
            }
            let name_off = image
                .rva_to_offset(name_rva)
                .ok_or(PeError::malformed("export name RVA", u64::from(name_rva)))?;
            let name = image.bytes().read_cstr(name_off, MAX_EXPORT_NAME_LEN)?;
            if let Some(func_index) = slot_to_index[index] {
                functions[func_index].name = Some(name);
            }
        }
    }

    Ok(Some(ExportTable { module_name, ordinal_base, functions }))
}

/// An export whose RVA lands inside the export directory's own byte range is
/// a forwarder; its target decodes as `"Dll.Symbol"` or `"Dll.#Ordinal"`.
fn decode_forwarder(
    image: &Image,
    dir_rva: u32,
    dir_size: u32,
    rva: u32,
) -> PeResult<Option<String>> {
    let in_directory = rva >= dir_rva && u64::from(rva) < u64::from(dir_rva) + u64::from(dir_size);
    if !in_directory {
        return Ok(None);
    }
    let off = image
        .rva_to_offset(rva)
        .ok_or(PeError::malformed("forwarder RVA", u64::from(rva)))?;
    Ok(Some(image.bytes().read_cstr(off, MAX_FORWARDER_LEN)?))
}
