use std::io::Write;

use peview_core::hash::{hash_bytes, hash_file, hash_file_multi, HashAlgorithm, HashOptions};
use peview_core::{CancelFlag, PeError};
use tempfile::NamedTempFile;

fn write_temp(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn digests_match_known_vectors() {
    let file = write_temp(b"abc");
    let mut options = HashOptions::default();

    let md5 = hash_file(file.path(), HashAlgorithm::Md5, &mut options).unwrap();
    assert_eq!(md5.hex_digest, "900150983cd24fb0d6963f7d28e17f72");

    let sha1 = hash_file(file.path(), HashAlgorithm::Sha1, &mut options).unwrap();
    assert_eq!(sha1.hex_digest, "a9993e364706816aba3e25717850c26c9cd0d89d");

    let sha256 = hash_file(file.path(), HashAlgorithm::Sha256, &mut options).unwrap();
    assert_eq!(
        sha256.hex_digest,
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

/// Chunked digests must agree with the single-buffer path no matter how the
/// chunk size slices the file.
#[test]
fn chunked_digest_is_independent_of_chunk_size() {
    let content: Vec<u8> = (0..u8::MAX).cycle().take(10_000).collect();
    let file = write_temp(&content);
    let expected = hash_bytes(&content, HashAlgorithm::Sha256);

    for chunk_size in [1, 7, 512, 4096, 1 << 20] {
        let mut options = HashOptions { chunk_size, ..HashOptions::default() };
        let result = hash_file(file.path(), HashAlgorithm::Sha256, &mut options).unwrap();
        assert_eq!(result.hex_digest, expected, "chunk size {chunk_size}");
    }
}

#[test]
fn repeated_runs_are_identical() {
    let file = write_temp(b"stable input");
    let mut options = HashOptions::default();
    let first = hash_file(file.path(), HashAlgorithm::Md5, &mut options).unwrap();
    let second = hash_file(file.path(), HashAlgorithm::Md5, &mut options).unwrap();
    assert_eq!(first.hex_digest, second.hex_digest);
}

#[test]
fn multi_digest_single_pass_covers_all_algorithms() {
    let file = write_temp(b"abc");
    let algorithms = [HashAlgorithm::Md5, HashAlgorithm::Sha1, HashAlgorithm::Sha256];
    let mut options = HashOptions::default();

    let results = hash_file_multi(file.path(), &algorithms, &mut options).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(
        results[&HashAlgorithm::Md5].hex_digest,
        "900150983cd24fb0d6963f7d28e17f72"
    );
    assert_eq!(
        results[&HashAlgorithm::Sha1].hex_digest,
        "a9993e364706816aba3e25717850c26c9cd0d89d"
    );
    assert_eq!(
        results[&HashAlgorithm::Sha256].hex_digest,
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn progress_reports_monotonic_processed_bytes() {
    let content = vec![0xABu8; 2500];
    let file = write_temp(&content);

    let mut calls: Vec<(u64, u64)> = Vec::new();
    let mut record = |processed: u64, total: u64| calls.push((processed, total));
    let mut options = HashOptions {
        chunk_size: 1000,
        progress: Some(&mut record),
        cancel: CancelFlag::new(),
    };
    hash_file(file.path(), HashAlgorithm::Sha256, &mut options).unwrap();

    assert_eq!(calls, vec![(1000, 2500), (2000, 2500), (2500, 2500)]);
}

#[test]
fn cancellation_yields_no_partial_digest() {
    let file = write_temp(b"never hashed");
    let cancel = CancelFlag::new();
    cancel.cancel();
    let mut options = HashOptions { cancel, ..HashOptions::default() };

    let err = hash_file(file.path(), HashAlgorithm::Sha256, &mut options).unwrap_err();
    assert!(matches!(err, PeError::Cancelled));
}

#[test]
fn missing_file_is_not_found() {
    let mut options = HashOptions::default();
    let err = hash_file(
        std::path::Path::new("/nonexistent/input.bin"),
        HashAlgorithm::Md5,
        &mut options,
    )
    .unwrap_err();
    assert!(matches!(err, PeError::NotFound(_)));
}

#[test]
fn zero_chunk_size_is_rejected() {
    let file = write_temp(b"x");
    let mut options = HashOptions { chunk_size: 0, ..HashOptions::default() };
    assert!(matches!(
        hash_file(file.path(), HashAlgorithm::Md5, &mut options).unwrap_err(),
        PeError::Unsupported(_)
    ));
}

#[test]
fn algorithm_names_parse_both_spellings() {
    assert_eq!(HashAlgorithm::parse("md5"), Some(HashAlgorithm::Md5));
    assert_eq!(HashAlgorithm::parse("SHA-1"), Some(HashAlgorithm::Sha1));
    assert_eq!(HashAlgorithm::parse("sha256"), Some(HashAlgorithm::Sha256));
    assert_eq!(HashAlgorithm::parse("blake3"), None);
    assert_eq!(HashAlgorithm::Sha256.name(), "SHA-256");
}
