//! Standalone MSF 7.0 (.pdb) container reader.
//!
//! An MSF file is an array of fixed-size blocks. The superblock names the
//! block size and count plus the block holding the *block map*; the block map
//! lists the blocks of the stream directory; the directory lists every
//! stream's byte size and block indices. Stream #1 is the PDB info stream.
//! Every block index is validated against the block count, and every declared
//! byte length is capped against the block span, before either is used.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bytes::{read_u32_le, ByteSource};
use crate::debuginfo::{symbol_key, Guid};
use crate::error::{PeError, PeResult};

/// `"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0"`
const MSF_MAGIC: &[u8; 32] = b"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0";

const MIN_BLOCK_SIZE: u32 = 512;
const MAX_BLOCK_SIZE: u32 = 1 << 20;
const ABSENT_STREAM: u32 = 0xFFFF_FFFF;
const PDB_INFO_STREAM: usize = 1;

/// Superblock fields of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    pub block_size: u32,
    pub num_blocks: u32,
    pub directory_bytes: u32,
}

/// Per-stream directory entry: byte size plus the ordered block list.
/// `None` marks an absent stream (size `0xFFFFFFFF` in the directory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub size: u32,
    pub blocks: Vec<u32>,
}

/// Decoded PDB info stream header (stream #1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdbInfo {
    pub version: u32,
    pub signature: u32,
    pub age: u32,
    pub guid: Guid,
}

impl PdbInfo {
    pub fn symbol_key(&self) -> String {
        symbol_key(&self.guid, self.age)
    }
}

/// Parsed MSF/PDB container.
#[derive(Debug)]
pub struct PdbContainer {
    source: ByteSource,
    super_block: SuperBlock,
    streams: Vec<Option<StreamInfo>>,
    info: PdbInfo,
}

impl PdbContainer {
    /// Load and parse a standalone `.pdb` file from disk.
    pub fn load(path: &Path) -> PeResult<Self> {
        if !path.exists() {
            return Err(PeError::NotFound(path.to_path_buf()));
        }
        let data = std::fs::read(path)?;
        Self::parse(data)
    }

    /// Parse an MSF 7.0 container from an already loaded buffer.
    pub fn parse(data: Vec<u8>) -> PeResult<Self> {
        let source = ByteSource::new(data);

        if source.read_at(0, 32)? != &MSF_MAGIC[..] {
            return Err(PeError::malformed("MSF magic", 0));
        }
        let block_size = source.read_u32(32)?;
        let num_blocks = source.read_u32(40)?;
        let directory_bytes = source.read_u32(44)?;
        let block_map_block = source.read_u32(52)?;

        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size)
            || !block_size.is_power_of_two()
        {
            return Err(PeError::malformed("MSF block size", 32));
        }
        if u64::from(block_size) * u64::from(num_blocks) > source.len() {
            return Err(PeError::malformed("MSF block count", 40));
        }
        // Block-map entries may repeat, so the declared directory length has
        // to be capped against the whole block span before anything is
        // allocated for it.
        if u64::from(directory_bytes) > u64::from(block_size) * u64::from(num_blocks) {
            return Err(PeError::malformed("MSF directory size", 44));
        }
        if block_map_block >= num_blocks {
            return Err(PeError::OutOfBounds {
                offset: u64::from(block_map_block),
                len: 1,
                size: u64::from(num_blocks),
            });
        }

        let super_block = SuperBlock { block_size, num_blocks, directory_bytes };

        // The block map lists the blocks of the stream directory.
        let dir_block_count = blocks_for(directory_bytes, block_size);
        let map_offset = u64::from(block_map_block) * u64::from(block_size);
        if dir_block_count * 4 > u64::from(block_size) {
            return Err(PeError::malformed("MSF directory block map size", map_offset));
        }
        let mut dir_blocks = Vec::with_capacity(dir_block_count as usize);
        for i in 0..dir_block_count {
            let index = source.read_u32(map_offset + i * 4)?;
            check_block_index(index, num_blocks, map_offset + i * 4)?;
            dir_blocks.push(index);
        }

        let directory =
            reassemble(&source, &dir_blocks, block_size, u64::from(directory_bytes))?;
        let streams = parse_directory(&directory, block_size, num_blocks)?;

        let info = parse_info_stream(&source, &streams, block_size)?;

        Ok(Self { source, super_block, streams, info })
    }

    pub fn super_block(&self) -> SuperBlock {
        self.super_block
    }

    /// Stream directory: per-stream byte size and block list, absent streams
    /// as `None`.
    pub fn streams(&self) -> &[Option<StreamInfo>] {
        &self.streams
    }

    pub fn info(&self) -> PdbInfo {
        self.info
    }

    /// Reassemble one stream's bytes across its blocks.
    pub fn read_stream(&self, index: usize) -> PeResult<Vec<u8>> {
        let stream = self
            .streams
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(PeError::Unsupported("absent MSF stream"))?;
        reassemble(&self.source, &stream.blocks, self.super_block.block_size, u64::from(stream.size))
    }
}

fn blocks_for(bytes: u32, block_size: u32) -> u64 {
    (u64::from(bytes) + u64::from(block_size) - 1) / u64::from(block_size)
}

fn check_block_index(index: u32, num_blocks: u32, at: u64) -> PeResult<()> {
    if index >= num_blocks {
        return Err(PeError::OutOfBounds {
            offset: at,
            len: u64::from(index),
            size: u64::from(num_blocks),
        });
    }
    Ok(())
}

/// Concatenate `blocks`, truncated to `total_bytes`.
fn reassemble(
    source: &ByteSource,
    blocks: &[u32],
    block_size: u32,
    total_bytes: u64,
) -> PeResult<Vec<u8>> {
    let mut out = Vec::with_capacity(total_bytes as usize);
    let mut remaining = total_bytes;
    for &block in blocks {
        let take = remaining.min(u64::from(block_size));
        let offset = u64::from(block) * u64::from(block_size);
        out.extend_from_slice(source.read_at(offset, take)?);
        remaining -= take;
    }
    if remaining != 0 {
        return Err(PeError::malformed("MSF stream shorter than declared", total_bytes));
    }
    Ok(out)
}

/// Parse the reassembled stream directory: stream count, per-stream sizes
/// (`0xFFFFFFFF` marks an absent stream), then per-stream block-index lists
/// laid out sequentially in the same order.
fn parse_directory(
    directory: &[u8],
    block_size: u32,
    num_blocks: u32,
) -> PeResult<Vec<Option<StreamInfo>>> {
    let num_streams = read_u32_le(directory, 0)? as usize;

    // The size table must fit inside the directory before its length is
    // trusted for anything, allocation included.
    let table_bytes = num_streams
        .checked_mul(4)
        .and_then(|n| n.checked_add(4))
        .filter(|&end| end <= directory.len())
        .ok_or(PeError::malformed("MSF stream count", 0))?;

    let mut sizes = Vec::with_capacity(num_streams);
    for i in 0..num_streams {
        sizes.push(read_u32_le(directory, 4 + i * 4)?);
    }

    let mut pos = table_bytes;
    let mut streams = Vec::with_capacity(num_streams);
    for (index, size) in sizes.into_iter().enumerate() {
        if size == ABSENT_STREAM {
            streams.push(None);
            continue;
        }
        // Same repeated-block hazard as the directory: a stream cannot be
        // larger than every block laid end to end.
        if u64::from(size) > u64::from(block_size) * u64::from(num_blocks) {
            return Err(PeError::malformed("MSF stream size", 4 + index as u64 * 4));
        }
        let count = blocks_for(size, block_size);
        let mut blocks = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = read_u32_le(directory, pos)?;
            check_block_index(index, num_blocks, pos as u64)?;
            blocks.push(index);
            pos += 4;
        }
        streams.push(Some(StreamInfo { size, blocks }));
    }
    Ok(streams)
}

fn parse_info_stream(
    source: &ByteSource,
    streams: &[Option<StreamInfo>],
    block_size: u32,
) -> PeResult<PdbInfo> {
    let stream = streams
        .get(PDB_INFO_STREAM)
        .and_then(Option::as_ref)
        .ok_or(PeError::malformed("missing PDB info stream", 0))?;
    if stream.size < 28 {
        return Err(PeError::malformed("PDB info stream size", 0));
    }
    let bytes = reassemble(source, &stream.blocks, block_size, u64::from(stream.size))?;
    let version = read_u32_le(&bytes, 0)?;
    let signature = read_u32_le(&bytes, 4)?;
    let age = read_u32_le(&bytes, 8)?;
    let mut guid = [0u8; 16];
    guid.copy_from_slice(&bytes[12..28]);
    Ok(PdbInfo { version, signature, age, guid: Guid(guid) })
}
