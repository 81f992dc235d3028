//! Shared fixture builder: synthesizes minimal PE images byte by byte so
//! tests control every header field and directory layout exactly.
#![allow(dead_code)]

pub const IMAGE_BASE_32: u64 = 0x0040_0000;
pub const IMAGE_BASE_64: u64 = 0x1_4000_0000;

const E_LFANEW: usize = 0x40;
const FILE_ALIGN: u32 = 0x200;
const FIRST_RAW_OFFSET: u32 = 0x400;

pub struct SectionSpec {
    pub name: String,
    pub va: u32,
    pub vsize: u32,
    pub data: Vec<u8>,
    pub characteristics: u32,
}

/// Built image plus the raw file offset assigned to each section.
pub struct BuiltPe {
    pub bytes: Vec<u8>,
    pub raw_offsets: Vec<u32>,
}

pub struct PeBuilder {
    pe32_plus: bool,
    machine: Option<u16>,
    directories: [(u32, u32); 16],
    sections: Vec<SectionSpec>,
}

impl PeBuilder {
    pub fn new_32() -> Self {
        Self { pe32_plus: false, machine: None, directories: [(0, 0); 16], sections: Vec::new() }
    }

    pub fn new_64() -> Self {
        Self { pe32_plus: true, machine: None, directories: [(0, 0); 16], sections: Vec::new() }
    }

    /// Override the COFF machine field (defaults to x86 / x64 by bitness).
    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = Some(machine);
        self
    }

    pub fn directory(mut self, index: usize, rva: u32, size: u32) -> Self {
        self.directories[index] = (rva, size);
        self
    }

    /// Add a section whose virtual size equals its data length.
    pub fn section(self, name: &str, va: u32, data: Vec<u8>) -> Self {
        let vsize = data.len() as u32;
        self.section_with_vsize(name, va, vsize, data)
    }

    pub fn section_with_vsize(mut self, name: &str, va: u32, vsize: u32, data: Vec<u8>) -> Self {
        self.sections.push(SectionSpec {
            name: name.to_string(),
            va,
            vsize,
            data,
            characteristics: 0x4000_0040, // initialized data, readable
        });
        self
    }

    pub fn build(self) -> BuiltPe {
        let opt_size: usize = if self.pe32_plus { 0xF0 } else { 0xE0 };
        let table = E_LFANEW + 4 + 20 + opt_size;
        assert!(
            table + self.sections.len() * 40 <= FIRST_RAW_OFFSET as usize,
            "too many sections for the fixed fixture layout"
        );

        // Assign raw offsets sequentially, file-aligned.
        let mut raw_offsets = Vec::new();
        let mut cursor = FIRST_RAW_OFFSET;
        for section in &self.sections {
            raw_offsets.push(cursor);
            let len = section.data.len() as u32;
            cursor = (cursor + len + FILE_ALIGN - 1) / FILE_ALIGN * FILE_ALIGN;
        }

        let mut bytes = vec![0u8; cursor as usize];
        bytes[0] = b'M';
        bytes[1] = b'Z';
        put_u32(&mut bytes, 0x3C, E_LFANEW as u32);

        put_u32(&mut bytes, E_LFANEW, 0x0000_4550); // "PE\0\0"
        let coff = E_LFANEW + 4;
        let machine =
            self.machine.unwrap_or(if self.pe32_plus { 0x8664 } else { 0x014C });
        put_u16(&mut bytes, coff, machine);
        put_u16(&mut bytes, coff + 2, self.sections.len() as u16);
        put_u16(&mut bytes, coff + 16, opt_size as u16);
        put_u16(&mut bytes, coff + 18, 0x0002); // executable image

        let opt = coff + 20;
        if self.pe32_plus {
            put_u16(&mut bytes, opt, 0x20B);
            put_u32(&mut bytes, opt + 16, 0x1000); // entry point
            put_u64(&mut bytes, opt + 24, IMAGE_BASE_64);
            put_u32(&mut bytes, opt + 32, 0x1000); // section alignment
            put_u32(&mut bytes, opt + 36, FILE_ALIGN);
            put_u16(&mut bytes, opt + 68, 3); // console subsystem
            put_u32(&mut bytes, opt + 108, 16);
            for (i, (rva, size)) in self.directories.iter().enumerate() {
                put_u32(&mut bytes, opt + 112 + i * 8, *rva);
                put_u32(&mut bytes, opt + 116 + i * 8, *size);
            }
        } else {
            put_u16(&mut bytes, opt, 0x10B);
            put_u32(&mut bytes, opt + 16, 0x1000);
            put_u32(&mut bytes, opt + 28, IMAGE_BASE_32 as u32);
            put_u32(&mut bytes, opt + 32, 0x1000);
            put_u32(&mut bytes, opt + 36, FILE_ALIGN);
            put_u16(&mut bytes, opt + 68, 3);
            put_u32(&mut bytes, opt + 92, 16);
            for (i, (rva, size)) in self.directories.iter().enumerate() {
                put_u32(&mut bytes, opt + 96 + i * 8, *rva);
                put_u32(&mut bytes, opt + 100 + i * 8, *size);
            }
        }

        for (i, section) in self.sections.iter().enumerate() {
            let hdr = table + i * 40;
            let name = section.name.as_bytes();
            bytes[hdr..hdr + name.len().min(8)].copy_from_slice(&name[..name.len().min(8)]);
            put_u32(&mut bytes, hdr + 8, section.vsize);
            put_u32(&mut bytes, hdr + 12, section.va);
            put_u32(&mut bytes, hdr + 16, section.data.len() as u32);
            put_u32(&mut bytes, hdr + 20, raw_offsets[i]);
            put_u32(&mut bytes, hdr + 36, section.characteristics);

            let start = raw_offsets[i] as usize;
            bytes[start..start + section.data.len()].copy_from_slice(&section.data);
        }

        BuiltPe { bytes, raw_offsets }
    }
}

pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
