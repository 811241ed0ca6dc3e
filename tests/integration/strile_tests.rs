//! Strip and tile array integration tests.
//!
//! Tests verify:
//! - Deferred arrays are patched where the directory put them
//! - Immediate arrays are written with the directory after the data
//! - Patching refuses arrays whose size changed since the commit

use tiff_ifd_writer::io::MemoryStore;
use tiff_ifd_writer::{
    ArrayPolicy, ByteOrder, Directory, DirectoryLocation, Placement, RandomAccessStore,
    StrileKind, TagValue, TiffError, TiffTag, TiffWriter,
};

use super::test_utils::{new_classic_writer, new_writer, reopen, short_slot, RawEntry, TiffBuilder};

fn image(writer: &TiffWriter<MemoryStore>, width: u32, length: u32) -> Directory {
    let mut dir = writer.new_directory();
    dir.set_value(TiffTag::ImageWidth, TagValue::Long(vec![width]));
    dir.set_value(TiffTag::ImageLength, TagValue::Long(vec![length]));
    dir.set_value(TiffTag::BitsPerSample, TagValue::Short(vec![8]));
    dir.set_value(TiffTag::Compression, TagValue::Short(vec![1]));
    dir.set_value(TiffTag::PhotometricInterpretation, TagValue::Short(vec![1]));
    dir
}

async fn read_back(writer: &TiffWriter<MemoryStore>, offset: u64, len: usize) -> Vec<u8> {
    let mut store = MemoryStore::from_bytes(writer.store().as_slice().to_vec());
    store.read_exact_at(offset, len).await.unwrap().to_vec()
}

// =============================================================================
// Deferred Arrays
// =============================================================================

#[tokio::test]
async fn test_deferred_strips_patched_in_place() {
    let mut writer = new_classic_writer().await;
    let mut dir = image(&writer, 16, 16);
    dir.set_value(TiffTag::RowsPerStrip, TagValue::Short(vec![8]));
    writer
        .declare_striles(&mut dir, StrileKind::Strips, 2, ArrayPolicy::Deferred)
        .unwrap();

    let committed = writer.commit(&mut dir).await.unwrap();
    let size = dir.raw_byte_size();

    let first = writer.write_strile(&mut dir, 0, &[0xAA; 128]).await.unwrap();
    let second = writer.write_strile(&mut dir, 1, &[0xBB; 55]).await.unwrap();
    assert_eq!(second, first + 128);

    let outcome = writer.finish_striles(&mut dir).await.unwrap();
    assert_eq!(
        outcome.placement,
        Placement::Patched {
            offset: committed.offset
        }
    );
    assert_eq!(dir.disk_offset(), Some(committed.offset));
    assert_eq!(dir.raw_byte_size(), size);

    assert_eq!(read_back(&writer, second, 55).await, vec![0xBB; 55]);

    let mut writer = reopen(writer).await;
    let loaded = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    assert_eq!(loaded.strile_offsets().unwrap(), vec![first, second]);
    assert_eq!(loaded.strile_byte_counts().unwrap(), vec![128, 55]);
    assert_eq!(
        loaded.value(TiffTag::StripOffsets).unwrap(),
        &TagValue::Long(vec![first as u32, second as u32])
    );
}

#[tokio::test]
async fn test_deferred_single_strip_patches_slot() {
    let mut writer = new_classic_writer().await;
    let mut dir = image(&writer, 4, 4);
    writer
        .declare_striles(&mut dir, StrileKind::Strips, 1, ArrayPolicy::Deferred)
        .unwrap();
    writer.commit(&mut dir).await.unwrap();

    let span = dir.value_span(TiffTag::StripOffsets).unwrap();
    assert!(span.inline);

    let data = writer.write_strile(&mut dir, 0, &[7; 16]).await.unwrap();
    writer.patch_strile_arrays(&mut dir).await.unwrap();

    let mut writer = reopen(writer).await;
    let loaded = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    assert_eq!(loaded.strile_offsets().unwrap(), vec![data]);
    assert_eq!(loaded.strile_byte_counts().unwrap(), vec![16]);
}

#[tokio::test]
async fn test_deferred_tiles_bigtiff() {
    let mut writer = new_writer(ByteOrder::BigEndian, true).await;
    let mut dir = image(&writer, 512, 512);
    dir.set_value(TiffTag::TileWidth, TagValue::Short(vec![256]));
    dir.set_value(TiffTag::TileLength, TagValue::Short(vec![256]));
    writer
        .declare_striles(&mut dir, StrileKind::Tiles, 4, ArrayPolicy::Deferred)
        .unwrap();
    let committed = writer.commit(&mut dir).await.unwrap();

    let mut offsets = Vec::new();
    for index in 0..4 {
        let tile = vec![index as u8; 100 + index];
        offsets.push(writer.write_strile(&mut dir, index, &tile).await.unwrap());
    }
    let outcome = writer.finish_striles(&mut dir).await.unwrap();
    assert_eq!(outcome.offset, committed.offset);

    let mut writer = reopen(writer).await;
    let loaded = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    assert_eq!(
        loaded.value(TiffTag::TileOffsets).unwrap(),
        &TagValue::Long8(offsets)
    );
    assert_eq!(
        loaded.value(TiffTag::TileByteCounts).unwrap(),
        &TagValue::Long8(vec![100, 101, 102, 103])
    );
}

#[tokio::test]
async fn test_patch_rejects_resized_array() {
    let mut writer = new_classic_writer().await;
    let mut dir = image(&writer, 4, 4);
    writer
        .declare_striles(&mut dir, StrileKind::Strips, 1, ArrayPolicy::Deferred)
        .unwrap();
    writer.commit(&mut dir).await.unwrap();
    let before = writer.store().as_slice().to_vec();

    dir.set_value(TiffTag::StripOffsets, TagValue::Long(vec![0, 0]));
    let result = writer.patch_strile_arrays(&mut dir).await;

    assert!(matches!(
        result,
        Err(TiffError::ArraySpanChanged {
            tag: 273,
            reserved: 4,
            actual: 8
        })
    ));
    assert_eq!(writer.store().as_slice(), before.as_slice());
}

#[tokio::test]
async fn test_patch_requires_commit() {
    let mut writer = new_classic_writer().await;
    let mut dir = image(&writer, 4, 4);
    writer
        .declare_striles(&mut dir, StrileKind::Strips, 1, ArrayPolicy::Deferred)
        .unwrap();

    assert!(matches!(
        writer.finish_striles(&mut dir).await,
        Err(TiffError::NotCommitted)
    ));
}

#[tokio::test]
async fn test_patch_requires_arrays() {
    let mut writer = new_classic_writer().await;
    let mut dir = image(&writer, 4, 4);
    writer.commit(&mut dir).await.unwrap();

    assert!(matches!(
        writer.patch_strile_arrays(&mut dir).await,
        Err(TiffError::TagNotFound(273))
    ));
}

#[tokio::test]
async fn test_strile_index_out_of_range() {
    let mut writer = new_classic_writer().await;
    let mut dir = image(&writer, 4, 4);
    writer
        .declare_striles(&mut dir, StrileKind::Strips, 2, ArrayPolicy::Immediate)
        .unwrap();
    let size = writer.store().size();

    let result = writer.write_strile(&mut dir, 2, &[0; 4]).await;
    assert!(matches!(result, Err(TiffError::InvalidTagValue { tag: 273, .. })));
    assert_eq!(writer.store().size(), size);
}

// =============================================================================
// Immediate Arrays
// =============================================================================

#[tokio::test]
async fn test_immediate_strips_written_with_directory() {
    let mut writer = new_classic_writer().await;
    let mut dir = image(&writer, 16, 16);
    writer
        .declare_striles(&mut dir, StrileKind::Strips, 2, ArrayPolicy::Immediate)
        .unwrap();

    // Data first, directory last
    let first = writer.write_strile(&mut dir, 0, &[1; 100]).await.unwrap();
    let second = writer.write_strile(&mut dir, 1, &[2; 55]).await.unwrap();
    assert_eq!((first, second), (8, 108));

    let outcome = writer.finish_striles(&mut dir).await.unwrap();
    assert_eq!(outcome.placement, Placement::Append { offset: 164 });

    let mut writer = reopen(writer).await;
    let loaded = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    assert_eq!(loaded.strile_offsets().unwrap(), vec![8, 108]);
    assert_eq!(loaded.strile_byte_counts().unwrap(), vec![100, 55]);
}

#[tokio::test]
async fn test_loaded_short_arrays_keep_their_type() {
    let order = ByteOrder::LittleEndian;
    let zero = short_slot(order, 0, false);
    let mut builder = TiffBuilder::new(order, false);
    builder.append_ifd(&[
        RawEntry::new(256, 3, 1, short_slot(order, 4, false)),
        RawEntry::new(257, 3, 1, short_slot(order, 4, false)),
        RawEntry::new(273, 3, 1, zero),
        RawEntry::new(279, 3, 1, zero),
    ]);

    let mut writer = TiffWriter::open(MemoryStore::from_bytes(builder.build()))
        .await
        .unwrap();
    let mut dir = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    let layout = dir.strile_layout().copied().unwrap();
    assert_eq!(layout.kind, StrileKind::Strips);
    assert_eq!(layout.policy, ArrayPolicy::Immediate);

    let data = writer.write_strile(&mut dir, 0, &[9; 10]).await.unwrap();
    assert_eq!(data, 62);
    let outcome = writer.finish_striles(&mut dir).await.unwrap();
    assert_eq!(
        outcome.placement,
        Placement::InPlace {
            offset: 8,
            truncate_to: None
        }
    );

    let mut writer = reopen(writer).await;
    let loaded = writer
        .seek_directory(DirectoryLocation::Index(0))
        .await
        .unwrap();
    assert_eq!(
        loaded.value(TiffTag::StripOffsets).unwrap(),
        &TagValue::Short(vec![62])
    );
    assert_eq!(
        loaded.value(TiffTag::StripByteCounts).unwrap(),
        &TagValue::Short(vec![10])
    );
}
