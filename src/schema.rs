//! The two binary record types every DBF file opens with: the file
//! [`Header`] and the per-column [`FieldDescriptor`] array that follows it.
//!
//! Both implement [`Record`] directly. Neither carries the delete-flag byte
//! that user data records do; that byte is a concern of [`DeletableRecord`]
//! and the record types built on top of it in [`crate::file`], not of the
//! header types here (the header is not "a record with metadata" -- it has
//! no delete flag at all).

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::buffer::Buffer;
use crate::error::{Error, Result};

/// Fill `self` from a [`Buffer`] and serialize it back, with no assumption
/// about a leading delete-flag byte.
///
/// This mirrors the source's virtual `parseFrom`/`serializeTo` member
/// functions rather than a `FromBytes`-style static factory: a caller
/// constructs the (possibly schema-carrying) instance first -- trivially via
/// `Default` for [`Header`] and [`FieldDescriptor`], or via
/// [`crate::file::DbfRecord::for_schema`] when the field layout is only
/// known at runtime -- and then fills it in place.
pub trait Record {
    fn parse_from(&mut self, buf: &mut Buffer) -> Result<()>;
    fn serialize_to(&self, buf: &mut Buffer) -> Result<()>;
}

/// A [`Record`] that additionally carries the one-byte `0x20`/`0x2A`
/// deletion marker data records are prefixed with.
pub trait DeletableRecord: Record {
    fn is_deleted(&self) -> bool;
    fn set_deleted(&mut self, deleted: bool);
}

/// Read the leading delete-flag byte (`0x20` not deleted, `0x2A` deleted).
/// Any other byte is logged and treated as not-deleted, matching the
/// source's "warn and default to live" handling of corrupt flags.
pub(crate) fn read_delete_flag(buf: &mut Buffer) -> Result<bool> {
    match buf.read_char()? {
        0x20 => Ok(false),
        0x2A => Ok(true),
        other => {
            log::warn!("unexpected delete-flag byte 0x{:02x}, treating as not deleted", other);
            Ok(false)
        }
    }
}

/// Write the leading delete-flag byte.
pub(crate) fn write_delete_flag(buf: &mut Buffer, deleted: bool) {
    buf.append_char(if deleted { 0x2A } else { 0x20 });
}

/// A single ASCII field-type letter (`'C'`haracter, `'N'`umeric, `'D'`ate,
/// `'L'`ogical, `'F'`loat, `'M'`emo, ...). DBF drivers have historically
/// added vendor-specific letters, so this stays an open newtype rather than
/// a closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldType(pub char);

impl FieldType {
    pub const CHARACTER: FieldType = FieldType('C');
    pub const NUMERIC: FieldType = FieldType('N');
    pub const DATE: FieldType = FieldType('D');
    pub const LOGICAL: FieldType = FieldType('L');
    pub const FLOAT: FieldType = FieldType('F');
    pub const MEMO: FieldType = FieldType('M');

    pub fn as_char(self) -> char {
        self.0
    }
}

/// The 32-byte file header preceding the field descriptor array.
///
/// `year` is years-since-1900, a single signed byte: it wraps (not panics)
/// once the host year exceeds `1900 + 127`. That is a property of the wire
/// format, not a bug this crate papers over -- changing the width would
/// break binary compatibility with every existing DBF file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub version: i8,
    pub year: i8,
    pub month: i8,
    pub day: i8,
    pub record_number: i32,
    pub header_bytes: i16,
    pub record_bytes: i16,
    pub reserved1: i16,
    pub incomplete_ops: i8,
    pub password_mark: i8,
    pub multi_user_processing: String,
    pub mdx_tag: i8,
    pub driver_id: i8,
    pub reserved2: i16,
}

const MULTI_USER_PROCESSING_LEN: usize = 12;

impl Record for Header {
    fn parse_from(&mut self, buf: &mut Buffer) -> Result<()> {
        self.version = buf.read_binary_i8()?;
        self.year = buf.read_binary_i8()?;
        self.month = buf.read_binary_i8()?;
        self.day = buf.read_binary_i8()?;
        self.record_number = buf.read_binary_i32()?;
        self.header_bytes = buf.read_binary_i16()?;
        self.record_bytes = buf.read_binary_i16()?;
        self.reserved1 = buf.read_binary_i16()?;
        self.incomplete_ops = buf.read_binary_i8()?;
        self.password_mark = buf.read_binary_i8()?;
        self.multi_user_processing = buf.read_binary_string(MULTI_USER_PROCESSING_LEN)?;
        self.mdx_tag = buf.read_binary_i8()?;
        self.driver_id = buf.read_binary_i8()?;
        self.reserved2 = buf.read_binary_i16()?;
        Ok(())
    }

    fn serialize_to(&self, buf: &mut Buffer) -> Result<()> {
        buf.append_binary_i8(self.version);
        buf.append_binary_i8(self.year);
        buf.append_binary_i8(self.month);
        buf.append_binary_i8(self.day);
        buf.append_binary_i32(self.record_number);
        buf.append_binary_i16(self.header_bytes);
        buf.append_binary_i16(self.record_bytes);
        buf.append_binary_i16(self.reserved1);
        buf.append_binary_i8(self.incomplete_ops);
        buf.append_binary_i8(self.password_mark);
        buf.append_binary_string(&self.multi_user_processing, MULTI_USER_PROCESSING_LEN)?;
        buf.append_binary_i8(self.mdx_tag);
        buf.append_binary_i8(self.driver_id);
        buf.append_binary_i16(self.reserved2);
        Ok(())
    }
}

/// One column entry in the field descriptor array following [`Header`].
///
/// `name` and `reserved3` are never longer than 11 and 10 bytes
/// respectively, so both use [`crate::FlexString`] to stay on the stack for
/// the names real tables actually have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: crate::FlexString,
    pub field_type: FieldType,
    pub reserved1: i32,
    pub total_len: u8,
    pub precision_len: u8,
    pub reserved2: i16,
    pub workspace_id: i8,
    pub reserved3: crate::FlexString,
    pub mdx_tag: i8,
}

const FIELD_NAME_LEN: usize = 11;
const FIELD_TYPE_LEN: usize = 1;
const FIELD_RESERVED3_LEN: usize = 10;

impl FieldDescriptor {
    /// Build a descriptor, auto-correcting `total_len` to 8 for date fields
    /// (every DBF date is stored as an 8-byte `YYYYMMDD` string regardless
    /// of what the caller asked for).
    pub fn new(name: impl AsRef<str>, field_type: FieldType, total_len: u8, precision_len: u8) -> Self {
        let total_len = if field_type == FieldType::DATE && total_len != 8 {
            log::warn!("field type 'D' requires total_len 8, overriding caller-supplied {}", total_len);
            8
        } else {
            total_len
        };
        FieldDescriptor {
            name: crate::FlexString::from(name.as_ref()),
            field_type,
            reserved1: 0,
            total_len,
            precision_len,
            reserved2: 0,
            workspace_id: 0,
            reserved3: crate::FlexString::new(),
            mdx_tag: 0,
        }
    }
}

impl Default for FieldDescriptor {
    fn default() -> Self {
        FieldDescriptor {
            name: crate::FlexString::new(),
            field_type: FieldType('\0'),
            reserved1: 0,
            total_len: 0,
            precision_len: 0,
            reserved2: 0,
            workspace_id: 0,
            reserved3: crate::FlexString::new(),
            mdx_tag: 0,
        }
    }
}

impl Record for FieldDescriptor {
    fn parse_from(&mut self, buf: &mut Buffer) -> Result<()> {
        self.name = crate::FlexString::from(buf.read_binary_string(FIELD_NAME_LEN)?.as_str());
        self.field_type = FieldType(
            buf.read_binary_string(FIELD_TYPE_LEN)?
                .chars()
                .next()
                .unwrap_or('\0'),
        );
        self.reserved1 = buf.read_binary_i32()?;
        self.total_len = buf.read_binary_u8()?;
        self.precision_len = buf.read_binary_u8()?;
        self.reserved2 = buf.read_binary_i16()?;
        self.workspace_id = buf.read_binary_i8()?;
        self.reserved3 = crate::FlexString::from(buf.read_binary_string(FIELD_RESERVED3_LEN)?.as_str());
        self.mdx_tag = buf.read_binary_i8()?;
        Ok(())
    }

    fn serialize_to(&self, buf: &mut Buffer) -> Result<()> {
        buf.append_binary_string(&self.name, FIELD_NAME_LEN)?;
        buf.append_binary_string(&self.field_type.as_char().to_string(), FIELD_TYPE_LEN)?;
        buf.append_binary_i32(self.reserved1);
        buf.append_binary_u8(self.total_len);
        buf.append_binary_u8(self.precision_len);
        buf.append_binary_i16(self.reserved2);
        buf.append_binary_i8(self.workspace_id);
        buf.append_binary_string(&self.reserved3, FIELD_RESERVED3_LEN)?;
        buf.append_binary_i8(self.mdx_tag);
        Ok(())
    }
}

/// JSON mirror of [`Header`], preserving the source's capitalized key names
/// exactly so existing tooling round-trips without translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderJson {
    #[serde(rename = "Version")]
    pub version: i8,
    #[serde(rename = "Year")]
    pub year: i8,
    #[serde(rename = "Month")]
    pub month: i8,
    #[serde(rename = "Day")]
    pub day: i8,
    #[serde(rename = "RecordNumber")]
    pub record_number: i32,
    #[serde(rename = "HeaderBytes")]
    pub header_bytes: i16,
    #[serde(rename = "RecordBytes")]
    pub record_bytes: i16,
    #[serde(rename = "ReservedBytes1")]
    pub reserved1: i16,
    #[serde(rename = "IncompleteOperations")]
    pub incomplete_ops: i8,
    #[serde(rename = "DbaseIvPasswordMarking")]
    pub password_mark: i8,
    #[serde(rename = "MultiUserProcessing")]
    pub multi_user_processing: String,
    #[serde(rename = "MdxTag")]
    pub mdx_tag: i8,
    #[serde(rename = "DriverID")]
    pub driver_id: i8,
    #[serde(rename = "ReservedBytes2")]
    pub reserved2: i16,
}

impl From<&Header> for HeaderJson {
    fn from(h: &Header) -> Self {
        HeaderJson {
            version: h.version,
            year: h.year,
            month: h.month,
            day: h.day,
            record_number: h.record_number,
            header_bytes: h.header_bytes,
            record_bytes: h.record_bytes,
            reserved1: h.reserved1,
            incomplete_ops: h.incomplete_ops,
            password_mark: h.password_mark,
            multi_user_processing: h.multi_user_processing.clone(),
            mdx_tag: h.mdx_tag,
            driver_id: h.driver_id,
            reserved2: h.reserved2,
        }
    }
}

impl From<HeaderJson> for Header {
    fn from(j: HeaderJson) -> Self {
        Header {
            version: j.version,
            year: j.year,
            month: j.month,
            day: j.day,
            record_number: j.record_number,
            header_bytes: j.header_bytes,
            record_bytes: j.record_bytes,
            reserved1: j.reserved1,
            incomplete_ops: j.incomplete_ops,
            password_mark: j.password_mark,
            multi_user_processing: j.multi_user_processing,
            mdx_tag: j.mdx_tag,
            driver_id: j.driver_id,
            reserved2: j.reserved2,
        }
    }
}

impl Header {
    /// Parse a `Header` from a JSON document, raising
    /// [`Error::InvalidArgument`] naming the first missing required key
    /// rather than serde's generic deserialization failure.
    pub fn from_json(value: &serde_json::Value) -> Result<Header> {
        let json: HeaderJson = serde_json::from_value(value.clone())
            .map_err(|e| missing_field_error(&e))?;
        Ok(json.into())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(HeaderJson::from(self)).expect("Header always serializes")
    }
}

/// JSON mirror of [`FieldDescriptor`], including the source's misspelled
/// `"FiledType"` key (kept deliberately -- it is the wire contract, not a
/// typo to silently fix).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptorJson {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "FiledType")]
    pub filed_type: String,
    #[serde(rename = "ReservedBytes1")]
    pub reserved1: i32,
    #[serde(rename = "TotalLen")]
    pub total_len: u8,
    #[serde(rename = "PrecisionLen")]
    pub precision_len: u8,
    #[serde(rename = "ReservedBytes2")]
    pub reserved2: i16,
    #[serde(rename = "WorkspaceID")]
    pub workspace_id: i8,
    #[serde(rename = "ReservedBytes3")]
    pub reserved3: String,
    #[serde(rename = "MdxTag")]
    pub mdx_tag: i8,
}

impl From<&FieldDescriptor> for FieldDescriptorJson {
    fn from(f: &FieldDescriptor) -> Self {
        FieldDescriptorJson {
            name: f.name.to_string(),
            filed_type: f.field_type.as_char().to_string(),
            reserved1: f.reserved1,
            total_len: f.total_len,
            precision_len: f.precision_len,
            reserved2: f.reserved2,
            workspace_id: f.workspace_id,
            reserved3: f.reserved3.to_string(),
            mdx_tag: f.mdx_tag,
        }
    }
}

impl TryFrom<FieldDescriptorJson> for FieldDescriptor {
    type Error = Error;

    fn try_from(j: FieldDescriptorJson) -> Result<Self> {
        let field_type = j
            .filed_type
            .chars()
            .next()
            .ok_or_else(|| Error::InvalidArgument("FiledType".to_string()))?;
        Ok(FieldDescriptor {
            name: crate::FlexString::from(j.name.as_str()),
            field_type: FieldType(field_type),
            reserved1: j.reserved1,
            total_len: j.total_len,
            precision_len: j.precision_len,
            reserved2: j.reserved2,
            workspace_id: j.workspace_id,
            reserved3: crate::FlexString::from(j.reserved3.as_str()),
            mdx_tag: j.mdx_tag,
        })
    }
}

impl FieldDescriptor {
    pub fn from_json(value: &serde_json::Value) -> Result<FieldDescriptor> {
        let json: FieldDescriptorJson = serde_json::from_value(value.clone())
            .map_err(|e| missing_field_error(&e))?;
        FieldDescriptor::try_from(json)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(FieldDescriptorJson::from(self)).expect("FieldDescriptor always serializes")
    }
}

/// serde's `missing_field` errors carry the field name wrapped in backticks
/// inside their `Display` output (`` missing field `Version` at line 1
/// column 17 ``); pull just the name out so callers get
/// `Error::InvalidArgument("Version")` rather than the whole sentence.
fn missing_field_error(e: &serde_json::Error) -> Error {
    let message = e.to_string();
    let name = message
        .split('`')
        .nth(1)
        .map(str::to_string)
        .unwrap_or(message);
    Error::InvalidArgument(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            version: 3,
            year: 124,
            month: 5,
            day: 17,
            record_number: 2,
            header_bytes: 97,
            record_bytes: 21,
            reserved1: 0,
            incomplete_ops: 0,
            password_mark: 0,
            multi_user_processing: String::new(),
            mdx_tag: 0,
            driver_id: 0,
            reserved2: 0,
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = sample_header();
        let mut buf = Buffer::new();
        header.serialize_to(&mut buf).unwrap();
        assert_eq!(buf.readable_bytes(), 32);
        let mut parsed = Header::default();
        parsed.parse_from(&mut buf).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn header_json_roundtrip() {
        let header = sample_header();
        let json = header.to_json();
        assert_eq!(json["Version"], 3);
        let parsed = Header::from_json(&json).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn header_json_missing_field_errors() {
        let json = serde_json::json!({ "Version": 3 });
        let err = Header::from_json(&json);
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn field_descriptor_date_corrects_total_len() {
        let field = FieldDescriptor::new("DOB", FieldType::DATE, 4, 0);
        assert_eq!(field.total_len, 8);
    }

    #[test]
    fn field_descriptor_roundtrip() {
        let field = FieldDescriptor::new("NAME", FieldType::CHARACTER, 30, 0);
        let mut buf = Buffer::new();
        field.serialize_to(&mut buf).unwrap();
        assert_eq!(buf.readable_bytes(), 32);
        let mut parsed = FieldDescriptor::default();
        parsed.parse_from(&mut buf).unwrap();
        assert_eq!(parsed, field);
    }

    #[test]
    fn field_descriptor_json_preserves_filed_type_typo() {
        let field = FieldDescriptor::new("AMOUNT", FieldType::NUMERIC, 10, 2);
        let json = field.to_json();
        assert_eq!(json["FiledType"], "N");
    }
}
