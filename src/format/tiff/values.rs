//! TIFF tag value codec.
//!
//! Converts between typed tag values and their on-disk byte form. The codec
//! itself is pure: it never touches the store. Whether a value lands inline in
//! its entry slot or out of line is decided from the encoded length alone,
//! which is fully determined by `(field_type, count)`.
//!
//! [`ValueReader`] is the one place that performs I/O for values: it fetches
//! the bytes behind an on-disk entry (from the slot or from the file) and
//! hands them to the codec.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RandomAccessStore;

use super::directory::IfdEntry;
use super::parser::{ByteOrder, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// TagValue
// =============================================================================

/// A decoded tag value.
///
/// Each variant maps one-to-one onto a TIFF field type, so the type and count
/// of an entry are derived from its value and can never disagree with it.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Byte(Vec<u8>),
    /// Text without its trailing NUL terminator
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
    SByte(Vec<i8>),
    Undefined(Vec<u8>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SRational(Vec<(i32, i32)>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Ifd(Vec<u32>),
    Long8(Vec<u64>),
    SLong8(Vec<i64>),
    Ifd8(Vec<u64>),
}

impl TagValue {
    /// Field type of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            TagValue::Byte(_) => FieldType::Byte,
            TagValue::Ascii(_) => FieldType::Ascii,
            TagValue::Short(_) => FieldType::Short,
            TagValue::Long(_) => FieldType::Long,
            TagValue::Rational(_) => FieldType::Rational,
            TagValue::SByte(_) => FieldType::SByte,
            TagValue::Undefined(_) => FieldType::Undefined,
            TagValue::SShort(_) => FieldType::SShort,
            TagValue::SLong(_) => FieldType::SLong,
            TagValue::SRational(_) => FieldType::SRational,
            TagValue::Float(_) => FieldType::Float,
            TagValue::Double(_) => FieldType::Double,
            TagValue::Ifd(_) => FieldType::Ifd,
            TagValue::Long8(_) => FieldType::Long8,
            TagValue::SLong8(_) => FieldType::SLong8,
            TagValue::Ifd8(_) => FieldType::Ifd8,
        }
    }

    /// Number of elements as written in the entry's count field.
    ///
    /// For ASCII this includes the NUL terminator.
    pub fn count(&self) -> u64 {
        let count = match self {
            TagValue::Byte(v) | TagValue::Undefined(v) => v.len(),
            TagValue::Ascii(s) => s.len() + 1,
            TagValue::Short(v) => v.len(),
            TagValue::Long(v) | TagValue::Ifd(v) => v.len(),
            TagValue::Rational(v) => v.len(),
            TagValue::SByte(v) => v.len(),
            TagValue::SShort(v) => v.len(),
            TagValue::SLong(v) => v.len(),
            TagValue::SRational(v) => v.len(),
            TagValue::Float(v) => v.len(),
            TagValue::Double(v) => v.len(),
            TagValue::Long8(v) | TagValue::Ifd8(v) => v.len(),
            TagValue::SLong8(v) => v.len(),
        };
        count as u64
    }

    /// Encoded length in bytes.
    pub fn byte_len(&self) -> u64 {
        self.count() * self.field_type().size_in_bytes() as u64
    }

    /// Encode the value in the given byte order.
    pub fn encode(&self, byte_order: ByteOrder) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.byte_len() as usize);
        match self {
            TagValue::Byte(v) | TagValue::Undefined(v) => buf.extend_from_slice(v),
            TagValue::Ascii(s) => {
                buf.extend_from_slice(s.as_bytes());
                buf.push(0);
            }
            TagValue::SByte(v) => buf.extend(v.iter().map(|&b| b as u8)),
            TagValue::Short(v) => v.iter().for_each(|&x| byte_order.put_u16(&mut buf, x)),
            TagValue::SShort(v) => v
                .iter()
                .for_each(|&x| byte_order.put_u16(&mut buf, x as u16)),
            TagValue::Long(v) | TagValue::Ifd(v) => {
                v.iter().for_each(|&x| byte_order.put_u32(&mut buf, x))
            }
            TagValue::SLong(v) => v
                .iter()
                .for_each(|&x| byte_order.put_u32(&mut buf, x as u32)),
            TagValue::Float(v) => v
                .iter()
                .for_each(|&x| byte_order.put_u32(&mut buf, x.to_bits())),
            TagValue::Rational(v) => v.iter().for_each(|&(n, d)| {
                byte_order.put_u32(&mut buf, n);
                byte_order.put_u32(&mut buf, d);
            }),
            TagValue::SRational(v) => v.iter().for_each(|&(n, d)| {
                byte_order.put_u32(&mut buf, n as u32);
                byte_order.put_u32(&mut buf, d as u32);
            }),
            TagValue::Double(v) => v
                .iter()
                .for_each(|&x| byte_order.put_u64(&mut buf, x.to_bits())),
            TagValue::Long8(v) | TagValue::Ifd8(v) => {
                v.iter().for_each(|&x| byte_order.put_u64(&mut buf, x))
            }
            TagValue::SLong8(v) => v
                .iter()
                .for_each(|&x| byte_order.put_u64(&mut buf, x as u64)),
        }
        buf
    }

    /// Decode `count` values of `field_type` from `bytes`.
    ///
    /// `bytes` may be longer than needed (an inline slot is always 4 or 8
    /// bytes); trailing bytes are ignored.
    pub fn decode(
        tag: u16,
        field_type: FieldType,
        count: u64,
        bytes: &[u8],
        byte_order: ByteOrder,
    ) -> Result<TagValue, TiffError> {
        let needed = field_type
            .byte_len(count)
            .filter(|&len| len <= bytes.len() as u64)
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag,
                message: format!(
                    "{:?} x {} needs more than the {} bytes available",
                    field_type,
                    count,
                    bytes.len()
                ),
            })?;
        let bytes = &bytes[..needed as usize];
        let size = field_type.size_in_bytes();
        let elems = bytes.chunks_exact(size.max(1));

        let value = match field_type {
            FieldType::Byte => TagValue::Byte(bytes.to_vec()),
            FieldType::Undefined => TagValue::Undefined(bytes.to_vec()),
            FieldType::SByte => TagValue::SByte(bytes.iter().map(|&b| b as i8).collect()),
            FieldType::Ascii => {
                // Only the terminator that encode() appends is dropped
                let text = bytes.strip_suffix(&[0u8][..]).unwrap_or(bytes);
                TagValue::Ascii(String::from_utf8_lossy(text).into_owned())
            }
            FieldType::Short => TagValue::Short(elems.map(|c| byte_order.read_u16(c)).collect()),
            FieldType::SShort => {
                TagValue::SShort(elems.map(|c| byte_order.read_u16(c) as i16).collect())
            }
            FieldType::Long => TagValue::Long(elems.map(|c| byte_order.read_u32(c)).collect()),
            FieldType::Ifd => TagValue::Ifd(elems.map(|c| byte_order.read_u32(c)).collect()),
            FieldType::SLong => {
                TagValue::SLong(elems.map(|c| byte_order.read_u32(c) as i32).collect())
            }
            FieldType::Float => TagValue::Float(
                elems
                    .map(|c| f32::from_bits(byte_order.read_u32(c)))
                    .collect(),
            ),
            FieldType::Rational => TagValue::Rational(
                elems
                    .map(|c| (byte_order.read_u32(c), byte_order.read_u32(&c[4..])))
                    .collect(),
            ),
            FieldType::SRational => TagValue::SRational(
                elems
                    .map(|c| {
                        (
                            byte_order.read_u32(c) as i32,
                            byte_order.read_u32(&c[4..]) as i32,
                        )
                    })
                    .collect(),
            ),
            FieldType::Double => TagValue::Double(
                elems
                    .map(|c| f64::from_bits(byte_order.read_u64(c)))
                    .collect(),
            ),
            FieldType::Long8 => TagValue::Long8(elems.map(|c| byte_order.read_u64(c)).collect()),
            FieldType::Ifd8 => TagValue::Ifd8(elems.map(|c| byte_order.read_u64(c)).collect()),
            FieldType::SLong8 => {
                TagValue::SLong8(elems.map(|c| byte_order.read_u64(c) as i64).collect())
            }
        };

        Ok(value)
    }

    /// Decode from a raw type code, rejecting codes the format does not define.
    pub fn decode_raw(
        tag: u16,
        field_type_raw: u16,
        count: u64,
        bytes: &[u8],
        byte_order: ByteOrder,
    ) -> Result<TagValue, TiffError> {
        let field_type =
            FieldType::from_u16(field_type_raw).ok_or(TiffError::UnsupportedType(field_type_raw))?;
        Self::decode(tag, field_type, count, bytes, byte_order)
    }

    /// The value as unsigned integers, for any unsigned integer or offset type.
    pub fn as_u64_vec(&self) -> Option<Vec<u64>> {
        match self {
            TagValue::Byte(v) => Some(v.iter().map(|&x| x as u64).collect()),
            TagValue::Short(v) => Some(v.iter().map(|&x| x as u64).collect()),
            TagValue::Long(v) | TagValue::Ifd(v) => Some(v.iter().map(|&x| x as u64).collect()),
            TagValue::Long8(v) | TagValue::Ifd8(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// The first element as an unsigned integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TagValue::Byte(v) => v.first().map(|&x| x as u64),
            TagValue::Short(v) => v.first().map(|&x| x as u64),
            TagValue::Long(v) | TagValue::Ifd(v) => v.first().map(|&x| x as u64),
            TagValue::Long8(v) | TagValue::Ifd8(v) => v.first().copied(),
            _ => None,
        }
    }

    /// The text of an ASCII value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Ascii(s) => Some(s),
            _ => None,
        }
    }
}

/// Check that a field type may appear in a file of the given class.
pub fn check_supported(field_type: FieldType, is_bigtiff: bool) -> Result<(), TiffError> {
    if field_type.is_bigtiff_only() && !is_bigtiff {
        return Err(TiffError::UnsupportedType(field_type.as_u16()));
    }
    Ok(())
}

// =============================================================================
// ValueReader
// =============================================================================

/// Reads the values behind on-disk IFD entries.
///
/// Combines a store with the header so values are fetched from the right
/// place and decoded in the file's byte order.
pub struct ValueReader<'a, S: RandomAccessStore> {
    store: &'a mut S,
    header: &'a TiffHeader,
}

impl<'a, S: RandomAccessStore> ValueReader<'a, S> {
    /// Create a new ValueReader.
    pub fn new(store: &'a mut S, header: &'a TiffHeader) -> Self {
        Self { store, header }
    }

    /// Read raw bytes for an IFD entry's value.
    ///
    /// For inline values, returns the bytes from the entry slot.
    /// For offset values, fetches the bytes from the file.
    pub async fn read_bytes(&mut self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnsupportedType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header);
            let len = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
                tag: entry.tag_id,
                message: format!("value of {} bytes cannot be loaded", size),
            })?;
            Ok(self.store.read_exact_at(offset, len).await?)
        }
    }

    /// Read and decode an entry's value.
    pub async fn read_value(&mut self, entry: &IfdEntry) -> Result<TagValue, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnsupportedType(entry.field_type_raw))?;
        check_supported(field_type, self.header.is_bigtiff)?;

        let bytes = self.read_bytes(entry).await?;
        TagValue::decode(
            entry.tag_id,
            field_type,
            entry.count,
            &bytes,
            self.header.byte_order,
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
