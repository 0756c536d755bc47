//! A reader and writer for dBase III-compatible DBF files: a bidirectional
//! byte buffer, fixed-width text/binary codecs, the `Header`/`FieldDescriptor`
//! binary record types, and a random-access file engine built on top of
//! them.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod file;
mod locking;
pub mod schema;

use smallstr::SmallString;

const FIXED_STRING_LENGTH: usize = 16;
/// Small-string-optimized string used for the short, fixed-width names and
/// reserved byte ranges that appear throughout the format (field names are
/// never longer than 11 bytes).
pub type FlexString = SmallString<[u8; FIXED_STRING_LENGTH]>;

pub use buffer::Buffer;
pub use error::{Error, Result};
pub use file::{ColumnSpec, DbfRecord, File, UserRecord, Value};
pub use schema::{DeletableRecord, FieldDescriptor, FieldType, Header, Record};
