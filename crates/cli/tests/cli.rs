use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn peview() -> Command {
    Command::cargo_bin("peview").unwrap()
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

const FIRST_RAW_OFFSET: u32 = 0x400;

/// Minimal 32-bit PE: fixed header layout, sections laid out file-aligned
/// from 0x400 in order.
fn build_pe(directories: &[(usize, u32, u32)], sections: &[(&str, u32, Vec<u8>)]) -> Vec<u8> {
    let e_lfanew = 0x40usize;
    let coff = e_lfanew + 4;
    let opt = coff + 20;
    let table = opt + 0xE0;

    let mut raw_offsets = Vec::new();
    let mut cursor = FIRST_RAW_OFFSET;
    for (_, _, data) in sections {
        raw_offsets.push(cursor);
        cursor = (cursor + data.len() as u32 + 0x1FF) / 0x200 * 0x200;
    }

    let mut bytes = vec![0u8; cursor as usize];
    bytes[0] = b'M';
    bytes[1] = b'Z';
    put_u32(&mut bytes, 0x3C, e_lfanew as u32);
    put_u32(&mut bytes, e_lfanew, 0x0000_4550);
    put_u16(&mut bytes, coff, 0x014C);
    put_u16(&mut bytes, coff + 2, sections.len() as u16);
    put_u16(&mut bytes, coff + 16, 0xE0);
    put_u16(&mut bytes, coff + 18, 0x0002);

    put_u16(&mut bytes, opt, 0x10B);
    put_u32(&mut bytes, opt + 16, 0x1000);
    put_u32(&mut bytes, opt + 28, 0x0040_0000);
    put_u32(&mut bytes, opt + 32, 0x1000);
    put_u32(&mut bytes, opt + 36, 0x200);
    put_u16(&mut bytes, opt + 68, 3);
    put_u32(&mut bytes, opt + 92, 16);
    for &(index, rva, size) in directories {
        put_u32(&mut bytes, opt + 96 + index * 8, rva);
        put_u32(&mut bytes, opt + 100 + index * 8, size);
    }

    for (i, (name, va, data)) in sections.iter().enumerate() {
        let hdr = table + i * 40;
        let name_bytes = name.as_bytes();
        bytes[hdr..hdr + name_bytes.len()].copy_from_slice(name_bytes);
        put_u32(&mut bytes, hdr + 8, data.len() as u32);
        put_u32(&mut bytes, hdr + 12, *va);
        put_u32(&mut bytes, hdr + 16, data.len() as u32);
        put_u32(&mut bytes, hdr + 20, raw_offsets[i]);
        put_u32(&mut bytes, hdr + 36, 0x4000_0040);
        let start = raw_offsets[i] as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
    }
    bytes
}

const GUID_BYTES: [u8; 16] = [
    0x78, 0x56, 0x34, 0x12, 0xBC, 0x9A, 0xF0, 0xDE, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD,
    0xEF,
];

/// PE with one debug section holding a CodeView RSDS record.
fn build_pe_with_rsds(age: u32) -> Vec<u8> {
    let mut debug = vec![0u8; 0x100];
    put_u32(&mut debug, 12, 2); // CodeView entry
    put_u32(&mut debug, 16, 24 + 8);
    put_u32(&mut debug, 24, FIRST_RAW_OFFSET + 0x40);
    put_u32(&mut debug, 0x40, 0x5344_5352); // "RSDS"
    debug[0x44..0x54].copy_from_slice(&GUID_BYTES);
    put_u32(&mut debug, 0x54, age);
    debug[0x58..0x60].copy_from_slice(b"app.pdb\0");

    build_pe(&[(6, 0x6000, 28)], &[(".debug", 0x6000, debug)])
}

/// Five-block MSF container whose info stream carries the given age.
fn build_pdb(age: u32) -> Vec<u8> {
    let block_size = 512u32;
    let mut data = vec![0u8; (5 * block_size) as usize];
    data[..32].copy_from_slice(b"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0");
    put_u32(&mut data, 32, block_size);
    put_u32(&mut data, 40, 5);
    put_u32(&mut data, 44, 4 + 2 * 4 + 4); // directory bytes
    put_u32(&mut data, 52, 2); // block map block

    put_u32(&mut data, 2 * 512, 3); // block map -> directory block

    let dir = 3 * 512;
    put_u32(&mut data, dir, 2); // two streams
    put_u32(&mut data, dir + 4, 0);
    put_u32(&mut data, dir + 8, 28); // info stream
    put_u32(&mut data, dir + 12, 4); // info stream block

    let info = 4 * 512;
    put_u32(&mut data, info, 20_000_404);
    put_u32(&mut data, info + 4, 0x1234);
    put_u32(&mut data, info + 8, age);
    data[info + 12..info + 28].copy_from_slice(&GUID_BYTES);
    data
}

fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn sample_pe(dir: &TempDir) -> PathBuf {
    let mut rdata = vec![0u8; 0x40];
    rdata[..13].copy_from_slice(b"hello-marker\0");
    write_file(dir, "sample.exe", &build_pe(&[], &[(".rdata", 0x2000, rdata)]))
}

#[test]
fn info_prints_headers_and_sections() {
    let dir = TempDir::new().unwrap();
    let pe = sample_pe(&dir);

    peview()
        .args(["info"])
        .arg(&pe)
        .assert()
        .success()
        .stdout(predicate::str::contains("x86"))
        .stdout(predicate::str::contains("PE32"))
        .stdout(predicate::str::contains(".rdata"))
        .stdout(predicate::str::contains("Signed (embedded): no"));
}

#[test]
fn info_json_is_parseable() {
    let dir = TempDir::new().unwrap();
    let pe = sample_pe(&dir);

    let output = peview().args(["info", "--json"]).arg(&pe).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["machine_name"], "x86");
    assert_eq!(value["sections"][0]["name"], ".rdata");
}

#[test]
fn info_rejects_garbage_input() {
    let dir = TempDir::new().unwrap();
    let bad = write_file(&dir, "bad.exe", b"this is not an executable at all, honest");

    peview()
        .args(["info"])
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse PE image"));
}

#[test]
fn info_rejects_missing_file() {
    peview().args(["info", "/no/such/file.exe"]).assert().failure();
}

#[test]
fn hash_defaults_to_sha256() {
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "input.bin", b"abc");

    peview()
        .args(["hash"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("SHA-256"))
        .stdout(predicate::str::contains(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        ));
}

#[test]
fn hash_accepts_repeated_algorithms() {
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "input.bin", b"abc");

    peview()
        .args(["hash", "--algo", "md5", "--algo", "sha1"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("900150983cd24fb0d6963f7d28e17f72"))
        .stdout(predicate::str::contains("a9993e364706816aba3e25717850c26c9cd0d89d"));
}

#[test]
fn hash_rejects_unknown_algorithm() {
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "input.bin", b"abc");

    peview().args(["hash", "--algo", "crc32"]).arg(&file).assert().failure();
}

#[test]
fn strings_works_on_non_pe_files() {
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "blob.bin", b"\x01\x02needle-in-blob\x00\x03");

    peview()
        .args(["strings"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("needle-in-blob"));
}

#[test]
fn strings_respects_min_len() {
    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "blob.bin", b"\x00tiny\x00much-longer-string\x00");

    peview()
        .args(["strings", "--min-len", "10"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("much-longer-string"))
        .stdout(predicate::str::contains("tiny").not());
}

#[test]
fn imports_reports_empty_table() {
    let dir = TempDir::new().unwrap();
    let pe = sample_pe(&dir);

    peview()
        .args(["imports"])
        .arg(&pe)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported modules (0)"));
}

#[test]
fn verify_exits_four_when_nothing_is_signed() {
    let dir = TempDir::new().unwrap();
    let pe = sample_pe(&dir);

    peview().args(["verify"]).arg(&pe).assert().code(4);
}

#[test]
fn verify_exits_three_for_present_but_unverifiable_signature() {
    let dir = TempDir::new().unwrap();
    // Security directory present; the stub trust provider cannot verify it.
    let pe = write_file(
        &dir,
        "signed.exe",
        &build_pe(&[(4, 0x5000, 0x100)], &[(".text", 0x1000, vec![0x90; 32])]),
    );

    peview()
        .args(["verify"])
        .arg(&pe)
        .assert()
        .code(3)
        .stdout(predicate::str::contains("Embedded signature present: true"));
}

#[test]
fn match_succeeds_for_paired_pe_and_pdb() {
    let dir = TempDir::new().unwrap();
    let pe = write_file(&dir, "app.exe", &build_pe_with_rsds(7));
    let pdb = write_file(&dir, "app.pdb", &build_pdb(7));

    peview()
        .args(["match"])
        .arg(&pe)
        .arg(&pdb)
        .assert()
        .success()
        .stdout(predicate::str::contains("Matched"));
}

#[test]
fn match_exits_one_on_age_mismatch() {
    let dir = TempDir::new().unwrap();
    let pe = write_file(&dir, "app.exe", &build_pe_with_rsds(7));
    let pdb = write_file(&dir, "app.pdb", &build_pdb(8));

    peview()
        .args(["match"])
        .arg(&pe)
        .arg(&pdb)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Age mismatch"));
}

#[test]
fn debug_info_prints_symbol_key() {
    let dir = TempDir::new().unwrap();
    let pe = write_file(&dir, "app.exe", &build_pe_with_rsds(7));

    peview()
        .args(["debug-info"])
        .arg(&pe)
        .assert()
        .success()
        .stdout(predicate::str::contains("12345678-9ABC-DEF0-0123-456789ABCDEF"))
        .stdout(predicate::str::contains("123456789ABCDEF00123456789ABCDEF7"));
}

#[test]
fn pdb_info_prints_container_summary() {
    let dir = TempDir::new().unwrap();
    let pdb = write_file(&dir, "app.pdb", &build_pdb(7));

    peview()
        .args(["pdb-info"])
        .arg(&pdb)
        .assert()
        .success()
        .stdout(predicate::str::contains("Block size: 512"))
        .stdout(predicate::str::contains("12345678-9ABC-DEF0-0123-456789ABCDEF"));
}

#[test]
fn report_emits_json() {
    let dir = TempDir::new().unwrap();
    let pe = sample_pe(&dir);

    let output = peview()
        .args(["report", "--strings", "--algo", "sha256"])
        .arg(&pe)
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["image"]["machine_name"], "x86");
    assert!(value["hashes"].get("Sha256").is_some());
    assert!(value["strings"].as_array().is_some());
}
