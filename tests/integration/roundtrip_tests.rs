//! Round-trip integration tests.
//!
//! Tests verify:
//! - Every field type survives a commit and a reload in both byte orders
//! - BigTIFF-only types are refused in classic files
//! - Entries reach the file in ascending tag order
//! - Files on disk behave like memory stores
//! - A failed write leaves the previous chain readable

use tiff_ifd_writer::inspect::inspect_file;
use tiff_ifd_writer::io::MemoryStore;
use tiff_ifd_writer::{
    validate_file, ByteOrder, DirectoryLocation, FieldType, FileStore, Placement,
    RandomAccessStore, TagValue, TiffError, TiffTag, TiffWriter,
};

use super::test_utils::{new_classic_writer, new_writer, reopen, FailingStore, RawEntry, TiffBuilder};

/// One value of every type a classic file may hold, on private tags.
fn classic_values() -> Vec<(u16, TagValue)> {
    vec![
        (65000, TagValue::Byte(vec![1, 2, 3, 255])),
        (65001, TagValue::Ascii("text value".into())),
        (65002, TagValue::Short(vec![1, u16::MAX, 3])),
        (65003, TagValue::Long(vec![0, u32::MAX])),
        (65004, TagValue::Rational(vec![(1, 2), (3, 4)])),
        (65005, TagValue::SByte(vec![-1, 0, 127])),
        (65006, TagValue::Undefined(vec![0, 1, 2, 3, 4, 5])),
        (65007, TagValue::SShort(vec![-300, 300])),
        (65008, TagValue::SLong(vec![-70000])),
        (65009, TagValue::SRational(vec![(-1, 3)])),
        (65010, TagValue::Float(vec![1.5, -0.25])),
        (65011, TagValue::Double(vec![3.25])),
        (65012, TagValue::Ifd(vec![8])),
    ]
}

fn bigtiff_values() -> Vec<(u16, TagValue)> {
    let mut values = classic_values();
    values.push((65013, TagValue::Long8(vec![1 << 40, 7])));
    values.push((65014, TagValue::SLong8(vec![-(1 << 40)])));
    values.push((65015, TagValue::Ifd8(vec![16])));
    values
}

async fn assert_roundtrip(byte_order: ByteOrder, is_bigtiff: bool, values: Vec<(u16, TagValue)>) {
    let mut writer = new_writer(byte_order, is_bigtiff).await;
    let mut dir = writer.new_directory();
    for (tag, value) in &values {
        dir.set_value(*tag, value.clone());
    }
    writer.commit(&mut dir).await.unwrap();

    let mut writer = reopen(writer).await;
    let loaded = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    assert_eq!(loaded.len(), values.len());
    for (tag, value) in &values {
        assert_eq!(loaded.value(*tag).unwrap(), value, "tag {}", tag);
    }

    let mut store = writer.into_store();
    let validation = validate_file(&mut store).await.unwrap();
    assert!(validation.is_valid, "{:?}", validation.errors);
}

// =============================================================================
// Values
// =============================================================================

#[tokio::test]
async fn test_classic_little_endian_values() {
    assert_roundtrip(ByteOrder::LittleEndian, false, classic_values()).await;
}

#[tokio::test]
async fn test_classic_big_endian_values() {
    assert_roundtrip(ByteOrder::BigEndian, false, classic_values()).await;
}

#[tokio::test]
async fn test_bigtiff_values() {
    assert_roundtrip(ByteOrder::LittleEndian, true, bigtiff_values()).await;
    assert_roundtrip(ByteOrder::BigEndian, true, bigtiff_values()).await;
}

#[tokio::test]
async fn test_bigtiff_types_refused_in_classic() {
    let mut writer = new_classic_writer().await;
    let mut dir = writer.new_directory();
    dir.set_value(65013u16, TagValue::Long8(vec![1]));

    let result = writer.commit(&mut dir).await;
    assert!(matches!(result, Err(TiffError::UnsupportedType(16))));
    assert_eq!(writer.store().size(), 8);
    assert_eq!(writer.directory_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_set_entry_checks_type_and_count() {
    let writer = new_classic_writer().await;
    let mut dir = writer.new_directory();

    dir.set_entry(256, FieldType::Long, 1, TagValue::Long(vec![640]))
        .unwrap();
    let result = dir.set_entry(257, FieldType::Short, 2, TagValue::Short(vec![480]));
    assert!(matches!(result, Err(TiffError::InvalidTagValue { tag: 257, .. })));

    let result = dir.set_entry(258, FieldType::Long, 1, TagValue::Short(vec![8]));
    assert!(result.is_err());
    assert_eq!(dir.len(), 1);
}

#[tokio::test]
async fn test_ascii_nul_survives_reload() {
    let mut writer = new_classic_writer().await;
    let mut dir = writer.new_directory();
    dir.set_entry(305, FieldType::Ascii, 4, TagValue::Ascii("ab\0".into()))
        .unwrap();
    dir.set_value(270u16, TagValue::Ascii("ab\0cd".into()));
    writer.commit(&mut dir).await.unwrap();

    let mut writer = reopen(writer).await;
    let loaded = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();

    let software = loaded.value(305u16).unwrap();
    assert_eq!(software, &TagValue::Ascii("ab\0".into()));
    assert_eq!(software.count(), 4);
    let description = loaded.value(270u16).unwrap();
    assert_eq!(description, &TagValue::Ascii("ab\0cd".into()));
    assert_eq!(description.count(), 6);

    // Rewriting the reloaded values keeps the directory where it is
    let mut dir = loaded;
    let outcome = writer.commit(&mut dir).await.unwrap();
    assert!(!outcome.placement.is_relocation());
}

#[tokio::test]
async fn test_entries_written_in_tag_order() {
    let mut writer = new_classic_writer().await;
    let mut dir = writer.new_directory();
    for tag in [305u16, 270, 259, 256] {
        dir.set_value(tag, TagValue::Short(vec![1]));
    }
    let offset = writer.commit(&mut dir).await.unwrap().offset;

    let data = writer.store().as_slice();
    let base = offset as usize + 2;
    let tags: Vec<u16> = (0..4)
        .map(|i| {
            let at = base + i * 12;
            u16::from_le_bytes([data[at], data[at + 1]])
        })
        .collect();
    assert_eq!(tags, vec![256, 259, 270, 305]);
}

#[tokio::test]
async fn test_unknown_field_type_dropped_on_load() {
    let mut builder = TiffBuilder::new(ByteOrder::LittleEndian, false);
    builder.append_ifd(&[
        RawEntry::new(256, 4, 1, 640),
        RawEntry::new(40000, 99, 1, 0),
    ]);

    let mut writer = TiffWriter::open(MemoryStore::from_bytes(builder.build()))
        .await
        .unwrap();
    let mut dir = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    assert_eq!(dir.len(), 1);
    assert!(dir.get_entry(40000u16).is_none());

    // One entry fewer fits the old block
    let outcome = writer.commit(&mut dir).await.unwrap();
    assert!(!outcome.placement.is_relocation());
}

#[tokio::test]
async fn test_remove_entry_shrinks_directory() {
    let mut writer = new_classic_writer().await;
    let mut dir = writer.new_directory();
    dir.set_value(TiffTag::ImageDescription, TagValue::Ascii("to be removed".into()));
    dir.set_value(TiffTag::Software, TagValue::Ascii("tiffdir".into()));
    writer.commit(&mut dir).await.unwrap();

    let removed = dir.remove_entry(TiffTag::ImageDescription);
    assert_eq!(removed, Some(TagValue::Ascii("to be removed".into())));
    let outcome = writer.commit(&mut dir).await.unwrap();
    assert!(matches!(
        outcome.placement,
        Placement::InPlace {
            offset: 8,
            truncate_to: Some(_)
        }
    ));

    let mut writer = reopen(writer).await;
    let loaded = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    assert!(matches!(
        loaded.value(TiffTag::ImageDescription),
        Err(TiffError::TagNotFound(270))
    ));
}

// =============================================================================
// Files on Disk
// =============================================================================

#[tokio::test]
async fn test_file_store_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.tif");

    let store = FileStore::create(&path).await.unwrap();
    let mut writer = TiffWriter::create(store, ByteOrder::LittleEndian, false)
        .await
        .unwrap();
    let mut ifd = writer.new_directory();
    ifd.set_value(TiffTag::ImageDescription, TagValue::Ascii("Hello, world!".into()));
    writer.commit(&mut ifd).await.unwrap();

    // Shrinking the only directory cuts the file on disk too
    ifd.set_value(TiffTag::ImageDescription, TagValue::Ascii("abc".into()));
    writer.commit(&mut ifd).await.unwrap();
    writer.into_store().sync().await.unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 26);

    let mut store = FileStore::open(&path).await.unwrap();
    assert!(validate_file(&mut store).await.unwrap().is_valid);

    let mut writer = TiffWriter::open(store).await.unwrap();
    let loaded = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    assert_eq!(
        loaded.value(TiffTag::ImageDescription).unwrap(),
        &TagValue::Ascii("abc".into())
    );

    let report = inspect_file(&mut writer).await.unwrap();
    assert_eq!(report.file_size, 26);
    assert_eq!(report.directories.len(), 1);
    assert_eq!(report.directories[0].offset, 8);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["byte_order"], "little-endian");
    assert_eq!(json["directories"][0]["entries"][0]["tag"], 270);
}

#[tokio::test]
async fn test_open_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = FileStore::open(dir.path().join("missing.tif")).await;
    assert!(matches!(
        result,
        Err(tiff_ifd_writer::IoError::NotFound(_))
    ));
}

// =============================================================================
// Failed Writes
// =============================================================================

/// Two main directories: "abc" at 8 and "second" at 26.
async fn two_directory_file() -> Vec<u8> {
    let mut writer = new_classic_writer().await;
    for text in ["abc", "second"] {
        let mut dir = writer.new_directory();
        dir.set_value(TiffTag::ImageDescription, TagValue::Ascii(text.into()));
        writer.commit(&mut dir).await.unwrap();
    }
    writer.into_store().as_slice().to_vec()
}

#[tokio::test]
async fn test_failed_link_keeps_old_chain() {
    let data = two_directory_file().await;
    let mut writer = TiffWriter::open(FailingStore::new(data).fail_after(1))
        .await
        .unwrap();

    let mut dir = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    dir.set_value(TiffTag::ImageDescription, TagValue::Ascii("x".repeat(32)));

    // The new bytes land, the pointer update does not
    let result = writer.commit(&mut dir).await;
    assert!(matches!(result, Err(TiffError::Io(_))));
    assert!(!writer.is_retired(8));

    let mut writer = TiffWriter::open(writer.into_store()).await.unwrap();
    assert_eq!(writer.directory_offsets().await.unwrap(), vec![8, 26]);
    let first = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    assert_eq!(
        first.value(TiffTag::ImageDescription).unwrap(),
        &TagValue::Ascii("abc".into())
    );
}

#[tokio::test]
async fn test_failed_append_leaves_file_unchanged() {
    let data = two_directory_file().await;
    let mut writer = TiffWriter::open(FailingStore::new(data.clone()).fail_after(0))
        .await
        .unwrap();

    let mut dir = writer.new_directory();
    dir.set_value(TiffTag::ImageDescription, TagValue::Ascii("third".into()));
    assert!(matches!(
        writer.commit(&mut dir).await,
        Err(TiffError::Io(_))
    ));
    assert!(dir.disk_offset().is_none());
    assert_eq!(writer.store().as_slice(), data.as_slice());
}
