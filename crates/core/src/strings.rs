//! Streaming string extraction over a raw file.
//!
//! Two independent single-pass, constant-memory scanners (ASCII and
//! UTF-16LE) walk the file in fixed-size blocks. Run state is carried across
//! block boundaries; the UTF-16 scanner additionally carries one pending
//! byte when a two-byte code unit straddles a boundary. The scanner does not
//! depend on the PE parser; enrichment with section/RVA data is a separate
//! helper.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelFlag;
use crate::error::{PeError, PeResult};
use crate::pe::Image;

pub const DEFAULT_BLOCK_SIZE: usize = 1 << 20;

/// Options for one scan. `min_len`/`max_len` count characters of the
/// decoded run; the emitted hit records the raw byte length as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub min_len: usize,
    pub max_len: usize,
    pub scan_ascii: bool,
    pub scan_utf16: bool,
    pub max_hits: usize,
    pub block_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            min_len: 4,
            max_len: 4096,
            scan_ascii: true,
            scan_utf16: true,
            max_hits: 100_000,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringEncoding {
    Ascii,
    Utf16Le,
}

/// One extracted string literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringHit {
    /// File offset of the first byte of the run.
    pub offset: u64,
    pub encoding: StringEncoding,
    pub text: String,
    /// Raw length of the run in bytes (characters for ASCII, twice that for
    /// UTF-16LE).
    pub byte_len: u64,
}

/// Scan result; `truncated` is set when any encoding hit its `max_hits` cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub hits: Vec<StringHit>,
    pub truncated: bool,
}

/// A hit enriched with the section that contains it, when the file parses as
/// a PE image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedHit {
    #[serde(flatten)]
    pub hit: StringHit,
    pub section: Option<String>,
    pub rva: Option<u32>,
    pub va: Option<u64>,
}

/// Scan a file for ASCII and/or UTF-16LE string literals.
///
/// Each enabled encoding is one sequential pass; reaching `max_hits` stops
/// scanning for that encoding only and marks the outcome truncated. The
/// cancellation flag is polled once per block. Hits are returned in stable
/// file-offset order across both encodings.
pub fn scan(path: &Path, options: &ScanOptions, cancel: &CancelFlag) -> PeResult<ScanOutcome> {
    if !path.exists() {
        return Err(PeError::NotFound(path.to_path_buf()));
    }
    if options.block_size == 0 || options.max_len == 0 {
        return Err(PeError::Unsupported("zero scan block or run length"));
    }

    let mut hits = Vec::new();
    let mut truncated = false;

    if options.scan_ascii {
        let mut scanner = AsciiScanner::new(options);
        run_pass(path, options, cancel, &mut scanner)?;
        truncated |= scanner.truncated;
        hits.append(&mut scanner.hits);
    }
    if options.scan_utf16 {
        let mut scanner = Utf16Scanner::new(options);
        run_pass(path, options, cancel, &mut scanner)?;
        truncated |= scanner.truncated;
        hits.append(&mut scanner.hits);
    }

    hits.sort_by_key(|h| h.offset);
    Ok(ScanOutcome { hits, truncated })
}

/// Attach section name / RVA / VA to each hit via the image's section table.
/// Hits outside every section's raw range stay bare.
pub fn enrich(image: &Image, hits: &[StringHit]) -> Vec<EnrichedHit> {
    hits.iter()
        .map(|hit| {
            match image.section_for_offset(hit.offset) {
                Some(section) => {
                    let rva =
                        section.virtual_address + (hit.offset - u64::from(section.raw_offset)) as u32;
                    EnrichedHit {
                        hit: hit.clone(),
                        section: Some(section.name.clone()),
                        rva: Some(rva),
                        va: Some(image.image_base() + u64::from(rva)),
                    }
                }
                None => EnrichedHit { hit: hit.clone(), section: None, rva: None, va: None },
            }
        })
        .collect()
}

trait BlockScanner {
    /// Feed one block; returns false when this pass should stop early.
    fn process_block(&mut self, block: &[u8], file_offset: u64) -> bool;
    fn finish(&mut self);
}

fn run_pass<S: BlockScanner>(
    path: &Path,
    options: &ScanOptions,
    cancel: &CancelFlag,
    scanner: &mut S,
) -> PeResult<()> {
    let mut file = File::open(path)?;
    let mut block = vec![0u8; options.block_size];
    let mut file_offset = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(PeError::Cancelled);
        }
        let n = fill_block(&mut file, &mut block)?;
        if n == 0 {
            break;
        }
        if !scanner.process_block(&block[..n], file_offset) {
            return Ok(());
        }
        file_offset += n as u64;
        if n < block.len() {
            break;
        }
    }
    scanner.finish();
    Ok(())
}

/// Read until the buffer is full or the file ends, so every block except the
/// last has exactly the configured size.
fn fill_block(file: &mut File, block: &mut [u8]) -> PeResult<usize> {
    let mut filled = 0;
    while filled < block.len() {
        let n = file.read(&mut block[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte) || byte == b'\t'
}

struct AsciiScanner {
    min_len: usize,
    max_len: usize,
    max_hits: usize,
    run: Vec<u8>,
    run_start: u64,
    hits: Vec<StringHit>,
    truncated: bool,
}

impl AsciiScanner {
    fn new(options: &ScanOptions) -> Self {
        Self {
            min_len: options.min_len,
            max_len: options.max_len,
            max_hits: options.max_hits,
            run: Vec::new(),
            run_start: 0,
            hits: Vec::new(),
            truncated: false,
        }
    }

    /// Emit the current run if it clears `min_len`. Returns false when the
    /// hit cap was reached.
    fn flush(&mut self) -> bool {
        if self.run.len() >= self.min_len {
            if self.hits.len() >= self.max_hits {
                self.truncated = true;
                self.run.clear();
                return false;
            }
            self.hits.push(StringHit {
                offset: self.run_start,
                encoding: StringEncoding::Ascii,
                text: String::from_utf8_lossy(&self.run).into_owned(),
                byte_len: self.run.len() as u64,
            });
        }
        self.run.clear();
        true
    }
}

impl BlockScanner for AsciiScanner {
    fn process_block(&mut self, block: &[u8], file_offset: u64) -> bool {
        for (i, &byte) in block.iter().enumerate() {
            if is_printable(byte) {
                if self.run.is_empty() {
                    self.run_start = file_offset + i as u64;
                }
                self.run.push(byte);
                // Cap reached: flush and restart, never drop the overflow.
                if self.run.len() == self.max_len && !self.flush() {
                    return false;
                }
            } else if !self.run.is_empty() && !self.flush() {
                return false;
            }
        }
        true
    }

    fn finish(&mut self) {
        self.flush();
    }
}

struct Utf16Scanner {
    min_len: usize,
    max_len: usize,
    max_hits: usize,
    run: Vec<u16>,
    run_start: u64,
    /// First half of a code unit whose second byte has not arrived yet
    /// (possibly in the next block).
    pending: Option<(u64, u8)>,
    hits: Vec<StringHit>,
    truncated: bool,
}

impl Utf16Scanner {
    fn new(options: &ScanOptions) -> Self {
        Self {
            min_len: options.min_len,
            max_len: options.max_len,
            max_hits: options.max_hits,
            run: Vec::new(),
            run_start: 0,
            pending: None,
            hits: Vec::new(),
            truncated: false,
        }
    }

    fn flush(&mut self) -> bool {
        if self.run.len() >= self.min_len {
            if self.hits.len() >= self.max_hits {
                self.truncated = true;
                self.run.clear();
                return false;
            }
            self.hits.push(StringHit {
                offset: self.run_start,
                encoding: StringEncoding::Utf16Le,
                text: String::from_utf16_lossy(&self.run),
                byte_len: self.run.len() as u64 * 2,
            });
        }
        self.run.clear();
        true
    }

    /// Feed one byte. The scanner recognizes runs of `printable, 0x00`
    /// pairs starting at any byte offset.
    fn push_byte(&mut self, offset: u64, byte: u8) -> bool {
        match self.pending.take() {
            Some((start, low)) => {
                if byte == 0 {
                    if self.run.is_empty() {
                        self.run_start = start;
                    }
                    self.run.push(u16::from(low));
                    if self.run.len() == self.max_len && !self.flush() {
                        return false;
                    }
                } else {
                    if !self.run.is_empty() && !self.flush() {
                        return false;
                    }
                    // The byte that broke the pair may itself begin a run.
                    if is_printable(byte) {
                        self.pending = Some((offset, byte));
                    }
                }
            }
            None => {
                if is_printable(byte) {
                    self.pending = Some((offset, byte));
                } else if !self.run.is_empty() && !self.flush() {
                    return false;
                }
            }
        }
        true
    }
}

impl BlockScanner for Utf16Scanner {
    fn process_block(&mut self, block: &[u8], file_offset: u64) -> bool {
        for (i, &byte) in block.iter().enumerate() {
            if !self.push_byte(file_offset + i as u64, byte) {
                return false;
            }
        }
        true
    }

    fn finish(&mut self) {
        self.pending = None;
        self.flush();
    }
}
