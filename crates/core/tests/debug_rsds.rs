mod common;

use common::{put_u32, PeBuilder};
use peview_core::debuginfo::find_codeview_record;
use peview_core::pe::{directory, Image};
use peview_core::PeError;

const DEBUG_VA: u32 = 0x6000;
const RSDS_OFFSET: usize = 0x40;

const GUID_BYTES: [u8; 16] = [
    0x78, 0x56, 0x34, 0x12, 0xBC, 0x9A, 0xF0, 0xDE, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD,
    0xEF,
];

/// Debug section: a non-CodeView entry followed by a CodeView entry whose
/// raw pointer leads to an RSDS payload later in the same section.
fn debug_section(section_raw_offset: u32, rsds_magic: u32) -> Vec<u8> {
    let mut blob = vec![0u8; 0x100];

    put_u32(&mut blob, 12, 0x10); // first entry: REPRO, skipped

    let second = 28;
    put_u32(&mut blob, second + 12, 2); // IMAGE_DEBUG_TYPE_CODEVIEW
    put_u32(&mut blob, second + 16, 24 + 8); // SizeOfData
    put_u32(&mut blob, second + 24, section_raw_offset + RSDS_OFFSET as u32);

    put_u32(&mut blob, RSDS_OFFSET, rsds_magic);
    blob[RSDS_OFFSET + 4..RSDS_OFFSET + 20].copy_from_slice(&GUID_BYTES);
    put_u32(&mut blob, RSDS_OFFSET + 20, 7); // age
    blob[RSDS_OFFSET + 24..RSDS_OFFSET + 32].copy_from_slice(b"app.pdb\0");
    blob
}

/// The first section's raw offset is deterministic; probe it once so the
/// debug entry's raw pointer can be filled in before the real build.
fn first_section_raw_offset() -> u32 {
    let probe = PeBuilder::new_32().section(".debug", DEBUG_VA, vec![0; 0x100]).build();
    probe.raw_offsets[0]
}

fn build_image(rsds_magic: u32) -> Image {
    let raw_offset = first_section_raw_offset();
    let built = PeBuilder::new_32()
        .directory(directory::DEBUG, DEBUG_VA, 2 * 28)
        .section(".debug", DEBUG_VA, debug_section(raw_offset, rsds_magic))
        .build();
    assert_eq!(built.raw_offsets[0], raw_offset);
    Image::parse(built.bytes).unwrap()
}

#[test]
fn finds_codeview_entry_among_others() {
    let image = build_image(0x5344_5352);
    let record = find_codeview_record(&image).unwrap().expect("RSDS record");

    assert_eq!(record.guid.to_dashed(), "12345678-9ABC-DEF0-0123-456789ABCDEF");
    assert_eq!(record.age, 7);
    assert_eq!(record.pdb_path, "app.pdb");
    assert_eq!(record.symbol_key(), "123456789ABCDEF00123456789ABCDEF7");
    assert_eq!(
        record.symbol_server_path(),
        "app.pdb/123456789ABCDEF00123456789ABCDEF7/app.pdb"
    );
}

#[test]
fn image_without_debug_directory_yields_none() {
    let built = PeBuilder::new_32().section(".text", 0x1000, vec![0; 32]).build();
    let image = Image::parse(built.bytes).unwrap();
    assert!(find_codeview_record(&image).unwrap().is_none());
}

#[test]
fn directory_without_codeview_entry_yields_none() {
    // Single non-CodeView entry.
    let mut blob = vec![0u8; 0x40];
    put_u32(&mut blob, 12, 0x10);
    let built = PeBuilder::new_32()
        .directory(directory::DEBUG, DEBUG_VA, 28)
        .section(".debug", DEBUG_VA, blob)
        .build();
    let image = Image::parse(built.bytes).unwrap();
    assert!(find_codeview_record(&image).unwrap().is_none());
}

#[test]
fn broken_rsds_magic_is_an_error() {
    let image = build_image(0x5344_5353);
    let err = find_codeview_record(&image).unwrap_err();
    assert!(matches!(err, PeError::Malformed { what: "RSDS magic", .. }));
}

#[test]
fn undersized_codeview_record_is_an_error() {
    let mut blob = debug_section(first_section_raw_offset(), 0x5344_5352);
    put_u32(&mut blob, 28 + 16, 16); // SizeOfData below the fixed header
    let built = PeBuilder::new_32()
        .directory(directory::DEBUG, DEBUG_VA, 2 * 28)
        .section(".debug", DEBUG_VA, blob)
        .build();
    let image = Image::parse(built.bytes).unwrap();
    let err = find_codeview_record(&image).unwrap_err();
    assert!(matches!(err, PeError::Malformed { what: "CodeView record size", .. }));
}
