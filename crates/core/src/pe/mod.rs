//! PE/COFF container parsing: headers, section table, data directories,
//! and RVA-to-file-offset translation.
//!
//! The import and export table walks live in the submodules; both consume the
//! parsed [`Image`].

pub mod exports;
pub mod imports;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bytes::ByteSource;
use crate::error::{PeError, PeResult};

const DOS_MAGIC: u16 = 0x5A4D; // "MZ"
const NT_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
const OPTIONAL_MAGIC_PE32: u16 = 0x10B;
const OPTIONAL_MAGIC_PE32_PLUS: u16 = 0x20B;
const OPTIONAL_MAGIC_ROM: u16 = 0x107;

const DOS_HEADER_SIZE: u64 = 64;
const COFF_HEADER_SIZE: u64 = 20;
const SECTION_HEADER_SIZE: u64 = 40;
pub const DATA_DIRECTORY_COUNT: usize = 16;

/// Well-known data-directory slots.
pub mod directory {
    pub const EXPORT: usize = 0;
    pub const IMPORT: usize = 1;
    pub const RESOURCE: usize = 2;
    pub const SECURITY: usize = 4;
    pub const DEBUG: usize = 6;
    pub const DELAY_IMPORT: usize = 13;
}

/// One of the 16 Optional-Header data-directory slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDirectory {
    pub rva: u32,
    pub size: u32,
}

impl DataDirectory {
    /// A slot with RVA 0 points at nothing; the directory is absent.
    pub fn is_present(&self) -> bool {
        self.rva != 0 && self.size != 0
    }
}

/// Section-table entry. Sections are the only valid basis for RVA-to-offset
/// translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub raw_offset: u32,
    pub raw_size: u32,
    pub characteristics: u32,
}

impl Section {
    /// Whether `rva` falls inside this section's virtual range.
    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.virtual_address
            && u64::from(rva) < u64::from(self.virtual_address) + u64::from(self.virtual_size)
    }

    /// Whether `offset` falls inside this section's raw file range.
    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= u64::from(self.raw_offset)
            && offset < u64::from(self.raw_offset) + u64::from(self.raw_size)
    }
}

/// Parsed, immutable view of one PE image.
///
/// Owns the raw byte buffer; all structure reads go through the bounds-checked
/// [`ByteSource`]. Created by [`Image::load`]/[`Image::parse`], never mutated
/// afterwards.
#[derive(Debug)]
pub struct Image {
    source: ByteSource,
    machine: u16,
    file_characteristics: u16,
    timestamp: u32,
    pe32_plus: bool,
    entry_point: u32,
    image_base: u64,
    section_alignment: u32,
    subsystem: u16,
    directories: [DataDirectory; DATA_DIRECTORY_COUNT],
    sections: Vec<Section>,
}

impl Image {
    /// Load and parse a PE image from disk.
    pub fn load(path: &Path) -> PeResult<Self> {
        if !path.exists() {
            return Err(PeError::NotFound(path.to_path_buf()));
        }
        let data = std::fs::read(path)?;
        Self::parse(data)
    }

    /// Parse a PE image from an already loaded buffer.
    ///
    /// Validates, in order: room for a DOS header, the `MZ` magic, an
    /// `e_lfanew` that stays within the file and leaves room for the NT
    /// headers, the `PE\0\0` signature, and the Optional-Header magic. Each
    /// violation fails with a specific error so callers can report why.
    pub fn parse(data: Vec<u8>) -> PeResult<Self> {
        let source = ByteSource::new(data);

        if source.len() < DOS_HEADER_SIZE {
            return Err(PeError::malformed("DOS header", 0));
        }
        if source.read_u16(0)? != DOS_MAGIC {
            return Err(PeError::malformed("DOS magic", 0));
        }

        let e_lfanew = u64::from(source.read_u32(0x3C)?);
        // Signature + COFF header + optional-header magic must all fit.
        let min_nt = 4 + COFF_HEADER_SIZE + 2;
        if e_lfanew.checked_add(min_nt).map_or(true, |end| end > source.len()) {
            return Err(PeError::malformed("e_lfanew", 0x3C));
        }
        if source.read_u32(e_lfanew)? != NT_SIGNATURE {
            return Err(PeError::malformed("NT signature", e_lfanew));
        }

        let coff = e_lfanew + 4;
        let machine = source.read_u16(coff)?;
        let num_sections = source.read_u16(coff + 2)?;
        let timestamp = source.read_u32(coff + 4)?;
        let optional_size = u64::from(source.read_u16(coff + 16)?);
        let file_characteristics = source.read_u16(coff + 18)?;

        // Bitness comes from the Optional-Header magic, not the machine
        // field: the magic determines the actual field layout below.
        let opt = coff + COFF_HEADER_SIZE;
        let magic = source.read_u16(opt)?;
        let pe32_plus = match magic {
            OPTIONAL_MAGIC_PE32 => false,
            OPTIONAL_MAGIC_PE32_PLUS => true,
            OPTIONAL_MAGIC_ROM => return Err(PeError::Unsupported("ROM optional header")),
            _ => return Err(PeError::malformed("optional header magic", opt)),
        };

        let entry_point = source.read_u32(opt + 16)?;
        let (image_base, dir_count_off, dirs_off) = if pe32_plus {
            (source.read_u64(opt + 24)?, opt + 108, opt + 112)
        } else {
            (u64::from(source.read_u32(opt + 28)?), opt + 92, opt + 96)
        };
        let section_alignment = source.read_u32(opt + 32)?;
        let subsystem = source.read_u16(opt + 68)?;

        let declared_dirs = source.read_u32(dir_count_off)? as usize;
        let mut directories = [DataDirectory::default(); DATA_DIRECTORY_COUNT];
        for (i, slot) in directories.iter_mut().enumerate().take(declared_dirs.min(DATA_DIRECTORY_COUNT)) {
            let entry = dirs_off + (i as u64) * 8;
            slot.rva = source.read_u32(entry)?;
            slot.size = source.read_u32(entry + 4)?;
        }

        let table = opt + optional_size;
        let mut sections = Vec::with_capacity(usize::from(num_sections));
        for i in 0..u64::from(num_sections) {
            let hdr = table + i * SECTION_HEADER_SIZE;
            let name_bytes = source.read_at(hdr, 8)?;
            let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(8);
            let name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();
            sections.push(Section {
                name,
                virtual_size: source.read_u32(hdr + 8)?,
                virtual_address: source.read_u32(hdr + 12)?,
                raw_size: source.read_u32(hdr + 16)?,
                raw_offset: source.read_u32(hdr + 20)?,
                characteristics: source.read_u32(hdr + 36)?,
            });
        }

        Ok(Self {
            source,
            machine,
            file_characteristics,
            timestamp,
            pe32_plus,
            entry_point,
            image_base,
            section_alignment,
            subsystem,
            directories,
            sections,
        })
    }

    pub fn bytes(&self) -> &ByteSource {
        &self.source
    }

    pub fn is_32bit(&self) -> bool {
        !self.pe32_plus
    }

    pub fn is_64bit(&self) -> bool {
        self.pe32_plus
    }

    /// COFF machine field (CPU architecture only; never used for layout).
    pub fn machine(&self) -> u16 {
        self.machine
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn entry_point(&self) -> u32 {
        self.entry_point
    }

    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    pub fn section_alignment(&self) -> u32 {
        self.section_alignment
    }

    pub fn subsystem(&self) -> u16 {
        self.subsystem
    }

    pub fn is_dll(&self) -> bool {
        self.file_characteristics & 0x2000 != 0
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Data-directory slot by index, if present in the image.
    pub fn directory(&self, index: usize) -> Option<DataDirectory> {
        self.directories.get(index).copied().filter(DataDirectory::is_present)
    }

    /// All 16 slots, present or not.
    pub fn directories(&self) -> &[DataDirectory; DATA_DIRECTORY_COUNT] {
        &self.directories
    }

    /// Whether the image carries an embedded Authenticode signature blob.
    pub fn has_security_directory(&self) -> bool {
        self.directory(directory::SECURITY).is_some()
    }

    /// Translate an RVA to a file offset via the section table.
    ///
    /// An RVA outside every section's virtual range has no mapping; this
    /// returns `None` rather than a guessed or clamped offset.
    pub fn rva_to_offset(&self, rva: u32) -> Option<u64> {
        self.sections.iter().find(|s| s.contains_rva(rva)).map(|s| {
            u64::from(s.raw_offset) + u64::from(rva - s.virtual_address)
        })
    }

    /// The section whose virtual range contains `rva`, if any.
    pub fn section_for_rva(&self, rva: u32) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains_rva(rva))
    }

    /// The section whose raw file range contains `offset`, if any. Used to
    /// enrich string-scan hits with section name / RVA / VA.
    pub fn section_for_offset(&self, offset: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains_offset(offset))
    }

    /// Human-readable name for the COFF machine field.
    pub fn machine_name(&self) -> &'static str {
        match self.machine {
            0x014C => "x86",
            0x8664 => "x64",
            0x01C0 => "ARM",
            0x01C4 => "ARM Thumb-2",
            0xAA64 => "ARM64",
            0x0200 => "Itanium",
            _ => "unknown",
        }
    }

    /// Human-readable name for the subsystem field.
    pub fn subsystem_name(&self) -> &'static str {
        match self.subsystem {
            1 => "Native",
            2 => "Windows GUI",
            3 => "Windows console",
            5 => "OS/2 console",
            7 => "POSIX console",
            9 => "Windows CE GUI",
            10 => "EFI application",
            11 => "EFI boot driver",
            12 => "EFI runtime driver",
            13 => "EFI ROM",
            14 => "Xbox",
            16 => "Windows boot application",
            _ => "unknown",
        }
    }

    /// Serializable summary of the parsed headers.
    pub fn summary(&self) -> ImageSummary {
        ImageSummary {
            machine: self.machine,
            machine_name: self.machine_name().to_string(),
            is_64bit: self.pe32_plus,
            is_dll: self.is_dll(),
            timestamp: self.timestamp,
            entry_point: self.entry_point,
            image_base: self.image_base,
            section_alignment: self.section_alignment,
            subsystem: self.subsystem,
            subsystem_name: self.subsystem_name().to_string(),
            sections: self.sections.clone(),
        }
    }
}

/// Owned, serializable header summary for reports and JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub machine: u16,
    pub machine_name: String,
    pub is_64bit: bool,
    pub is_dll: bool,
    pub timestamp: u32,
    pub entry_point: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub subsystem: u16,
    pub subsystem_name: String,
    pub sections: Vec<Section>,
}
