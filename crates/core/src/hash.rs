//! Chunked, cancellable file digests.
//!
//! Reads are strictly sequential: one incremental digest context per
//! algorithm is fed chunks in file order. (Digesting completion-order chunks
//! from overlapped reads can silently hash reordered bytes; that variant is
//! deliberately not offered.)

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::cancel::{CancelFlag, ProgressFn};
use crate::error::{PeError, PeResult};

pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
        }
    }

    /// Parse a user-facing algorithm name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(HashAlgorithm::Md5),
            "sha1" | "sha-1" => Some(HashAlgorithm::Sha1),
            "sha256" | "sha-256" => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Completed digest of one file under one algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashResult {
    pub algorithm: HashAlgorithm,
    pub hex_digest: String,
    pub elapsed: Duration,
}

/// Options for a hash run.
pub struct HashOptions<'a> {
    pub chunk_size: usize,
    /// Invoked with `(processed, total)` after each chunk.
    pub progress: Option<&'a mut ProgressFn<'a>>,
    pub cancel: CancelFlag,
}

impl Default for HashOptions<'_> {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, progress: None, cancel: CancelFlag::new() }
    }
}

/// Incremental context over the RustCrypto hashers, selected at runtime.
enum HashContext {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl HashContext {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => HashContext::Md5(Md5::new()),
            HashAlgorithm::Sha1 => HashContext::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => HashContext::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            HashContext::Md5(h) => h.update(chunk),
            HashContext::Sha1(h) => h.update(chunk),
            HashContext::Sha256(h) => h.update(chunk),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            HashContext::Md5(h) => hex::encode(h.finalize()),
            HashContext::Sha1(h) => hex::encode(h.finalize()),
            HashContext::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Hash one file under one algorithm.
pub fn hash_file(
    path: &Path,
    algorithm: HashAlgorithm,
    options: &mut HashOptions<'_>,
) -> PeResult<HashResult> {
    let mut results = hash_file_multi(path, &[algorithm], options)?;
    results
        .remove(&algorithm)
        .ok_or(PeError::Unsupported("digest algorithm produced no result"))
}

/// Hash one file under several algorithms in a single sequential pass.
///
/// The cancellation flag is checked before each read; cancellation surfaces
/// as [`PeError::Cancelled`], never as a partial result.
pub fn hash_file_multi(
    path: &Path,
    algorithms: &[HashAlgorithm],
    options: &mut HashOptions<'_>,
) -> PeResult<HashMap<HashAlgorithm, HashResult>> {
    if !path.exists() {
        return Err(PeError::NotFound(path.to_path_buf()));
    }
    if options.chunk_size == 0 {
        return Err(PeError::Unsupported("zero hash chunk size"));
    }

    let started = Instant::now();
    let mut file = File::open(path)?;
    let total = file.metadata()?.len();

    let mut contexts: Vec<(HashAlgorithm, HashContext)> =
        algorithms.iter().map(|&a| (a, HashContext::new(a))).collect();

    let mut chunk = vec![0u8; options.chunk_size];
    let mut processed = 0u64;
    loop {
        if options.cancel.is_cancelled() {
            return Err(PeError::Cancelled);
        }
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        for (_, ctx) in &mut contexts {
            ctx.update(&chunk[..n]);
        }
        processed += n as u64;
        if let Some(progress) = options.progress.as_mut() {
            progress(processed, total);
        }
    }

    let elapsed = started.elapsed();
    Ok(contexts
        .into_iter()
        .map(|(algorithm, ctx)| {
            (algorithm, HashResult { algorithm, hex_digest: ctx.finalize_hex(), elapsed })
        })
        .collect())
}

/// Hash an in-memory buffer; used to cross-check the chunked path.
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut ctx = HashContext::new(algorithm);
    ctx.update(data);
    ctx.finalize_hex()
}
