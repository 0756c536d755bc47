//! The random-access DBF file engine: header I/O, record I/O by position,
//! and the file-locking/open-close discipline around each verb.
//!
//! Every public verb opens a fresh [`std::fs::File`] in the mode it needs,
//! takes an advisory lock, performs its seek + read/write, releases the
//! lock, and closes -- mirroring the source's `open()`/`close()` pairing
//! around every disk access rather than holding one handle for the whole
//! session. This crate does not serialize concurrent writers within the
//! same process; callers sharing one `File` across threads must do that
//! themselves.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::Datelike;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::locking::{LockGuard, LockKind};
use crate::schema::{read_delete_flag, write_delete_flag, DeletableRecord, FieldDescriptor, Header, Record};

const FIELD_LEN: usize = 32;
const END_HEAD_FLAG: u8 = 0x0D;
const END_FILE_FLAG: u8 = 0x1A;
const RECORD_NUM_INDEX: u64 = 4;

/// One field value in a schema-driven [`DbfRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Scaled(i64),
    Str(String),
}

/// The width/precision/kind of one column, captured at construction time so
/// a [`DbfRecord`] can parse and serialize itself without needing the field
/// descriptor array passed back in on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FieldShape {
    width: usize,
    precision: u8,
    numeric: bool,
}

impl From<&FieldDescriptor> for FieldShape {
    fn from(field: &FieldDescriptor) -> Self {
        FieldShape {
            width: field.total_len as usize,
            precision: field.precision_len,
            numeric: matches!(field.field_type.as_char(), 'N' | 'F'),
        }
    }
}

/// A generic data record whose field layout is whatever [`File::head_fields`]
/// said it was when the record was created -- the escape hatch for callers
/// who do not want to hand-write a typed [`UserRecord`] for every table they
/// touch.
#[derive(Debug, Clone, PartialEq)]
pub struct DbfRecord {
    deleted: bool,
    read_pos: u64,
    values: Vec<Value>,
    shapes: Vec<FieldShape>,
}

impl DbfRecord {
    /// An empty record shaped to match `fields`, ready to be filled by
    /// [`File::read`] et al.
    pub fn for_schema(fields: &[FieldDescriptor]) -> Self {
        DbfRecord {
            deleted: false,
            read_pos: 0,
            values: fields.iter().map(|_| Value::Str(String::new())).collect(),
            shapes: fields.iter().map(FieldShape::from).collect(),
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    pub fn set_values(&mut self, values: Vec<Value>) {
        self.values = values;
    }

    /// 0 means unbound (append semantics); non-zero is the byte offset of
    /// this record in the file.
    pub fn read_pos(&self) -> u64 {
        self.read_pos
    }

    pub fn set_read_pos(&mut self, pos: u64) {
        self.read_pos = pos;
    }
}

impl Record for DbfRecord {
    fn parse_from(&mut self, buf: &mut Buffer) -> Result<()> {
        self.deleted = read_delete_flag(buf)?;
        self.values.clear();
        for shape in &self.shapes {
            let value = match (shape.numeric, shape.precision > 0) {
                (true, true) => Value::Scaled(buf.read_scaled_i64(shape.width, shape.precision as u32)?),
                (true, false) => Value::Int(buf.read_i64(shape.width)?),
                (false, _) => Value::Str(buf.read_str(shape.width)?),
            };
            self.values.push(value);
        }
        Ok(())
    }

    fn serialize_to(&self, buf: &mut Buffer) -> Result<()> {
        write_delete_flag(buf, self.deleted);
        for (shape, value) in self.shapes.iter().zip(self.values.iter()) {
            match value {
                Value::Scaled(v) => buf.append_scaled_i64(*v, shape.width, shape.precision as u32)?,
                Value::Int(v) => buf.append_i64(*v, shape.width)?,
                Value::Str(s) => buf.append_str(s, shape.width)?,
            }
        }
        Ok(())
    }
}

impl DeletableRecord for DbfRecord {
    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }
}

/// One column in a compile-time-known record layout (the typed escape
/// hatch companion to [`DbfRecord`]'s runtime one).
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub width: usize,
    pub precision: u32,
    pub numeric: bool,
}

/// Implemented by hand-written record structs that know their own column
/// layout at compile time; `Record`/`DeletableRecord` are provided by the
/// blanket impl below, so a `UserRecord` flows through [`File::read`] and
/// [`File::append_write`] exactly like [`DbfRecord`] does. It has no
/// `read_pos` concept of its own, so the random-access `over_read*`/
/// `over_write*` verbs stay specific to `DbfRecord`.
pub trait UserRecord: Sized + Default {
    fn columns() -> &'static [ColumnSpec];
    fn get(&self, index: usize) -> Value;
    fn set(&mut self, index: usize, value: Value);
    fn is_deleted(&self) -> bool;
    fn set_deleted(&mut self, deleted: bool);
}

impl<T: UserRecord> Record for T {
    fn parse_from(&mut self, buf: &mut Buffer) -> Result<()> {
        self.set_deleted(read_delete_flag(buf)?);
        for (index, column) in T::columns().iter().enumerate() {
            let value = if column.numeric && column.precision > 0 {
                Value::Scaled(buf.read_scaled_i64(column.width, column.precision)?)
            } else if column.numeric {
                Value::Int(buf.read_i64(column.width)?)
            } else {
                Value::Str(buf.read_str(column.width)?)
            };
            self.set(index, value);
        }
        Ok(())
    }

    fn serialize_to(&self, buf: &mut Buffer) -> Result<()> {
        write_delete_flag(buf, UserRecord::is_deleted(self));
        for (index, column) in T::columns().iter().enumerate() {
            match self.get(index) {
                Value::Scaled(v) => buf.append_scaled_i64(v, column.width, column.precision)?,
                Value::Int(v) => buf.append_i64(v, column.width)?,
                Value::Str(s) => buf.append_str(&s, column.width)?,
            }
        }
        Ok(())
    }
}

impl<T: UserRecord> DeletableRecord for T {
    fn is_deleted(&self) -> bool {
        UserRecord::is_deleted(self)
    }

    fn set_deleted(&mut self, deleted: bool) {
        UserRecord::set_deleted(self, deleted)
    }
}

/// A random-access DBF file. Construction alone touches no disk; every
/// verb below opens, does its work, and closes.
pub struct File {
    path: PathBuf,
    header: Header,
    fields: Vec<FieldDescriptor>,
    buf: Buffer,
    reader_pos: u64,
    writer_pos: u64,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        File {
            path: path.into(),
            header: Header::default(),
            fields: Vec::new(),
            buf: Buffer::new(),
            reader_pos: 0,
            writer_pos: 0,
        }
    }

    pub fn name(&self) -> &Path {
        &self.path
    }

    pub fn head(&self) -> &Header {
        &self.header
    }

    pub fn head_fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn reader_pos(&self) -> u64 {
        self.reader_pos
    }

    pub fn writer_pos(&self) -> u64 {
        self.writer_pos
    }

    /// Declare a column for a table about to be created with
    /// [`File::write_head`]. Mirrors the source's auto-correction of `'D'`
    /// fields to an 8-byte width.
    pub fn append_head_field(&mut self, name: &str, field_type: char, total_len: u8, precision_len: u8) {
        self.fields.push(FieldDescriptor::new(
            name,
            crate::schema::FieldType(field_type),
            total_len,
            precision_len,
        ));
    }

    fn io_err(&self, source: std::io::Error) -> Error {
        Error::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn open_read(&self) -> Result<std::fs::File> {
        OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))
    }

    fn open_read_write(&self) -> Result<std::fs::File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))
    }

    fn open_create_write(&self) -> Result<std::fs::File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))
    }

    fn with_lock<T>(
        &self,
        handle: &mut std::fs::File,
        kind: LockKind,
        start: u64,
        len: u64,
        body: impl FnOnce(&mut std::fs::File) -> Result<T>,
    ) -> Result<T> {
        let _guard = LockGuard::acquire(handle, kind, start, len).map_err(|e| self.io_err(e))?;
        body(handle)
    }

    /// Read `len` bytes at absolute offset `start`, under a read lock
    /// pinned to exactly `[start, start + len)`.
    fn read_at(&self, start: u64, len: usize) -> Result<Vec<u8>> {
        use std::io::{Read, Seek, SeekFrom};

        let mut handle = self.open_read()?;
        self.with_lock(&mut handle, LockKind::Read, start, len as u64, |handle| {
            handle.seek(SeekFrom::Start(start)).map_err(|e| self.io_err(e))?;
            let mut bytes = vec![0u8; len];
            handle.read_exact(&mut bytes).map_err(|e| self.io_err(e))?;
            Ok(bytes)
        })
    }

    /// Write `bytes` at absolute offset `start`, under a write lock pinned
    /// to exactly `[start, start + bytes.len())`. The file must already
    /// exist (use [`File::write_head`] to create one).
    fn write_at(&self, start: u64, bytes: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};

        let mut handle = self.open_read_write()?;
        self.with_lock(&mut handle, LockKind::Write, start, bytes.len() as u64, |handle| {
            handle.seek(SeekFrom::Start(start)).map_err(|e| self.io_err(e))?;
            handle.write_all(bytes).map_err(|e| self.io_err(e))?;
            Ok(())
        })
    }

    /// Create (truncating) the file and write `bytes` to it from offset 0.
    fn create_and_write(&self, bytes: &[u8]) -> Result<()> {
        use std::io::Write;

        let mut handle = self.open_create_write()?;
        self.with_lock(&mut handle, LockKind::Write, 0, bytes.len() as u64, |handle| {
            handle.write_all(bytes).map_err(|e| self.io_err(e))?;
            Ok(())
        })
    }

    /// Append `bytes` at `self.writer_pos` under a write lock, extending an
    /// already-existing file.
    fn append_at_writer_pos(&self, bytes: &[u8]) -> Result<()> {
        self.write_at(self.writer_pos, bytes)
    }

    /// Re-read the 4-byte record count in the header, without disturbing
    /// the rest of the cached header.
    pub fn read_record_number(&mut self) -> Result<bool> {
        let bytes = match self.read_at(RECORD_NUM_INDEX, 4) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("read record number failed: {}", err);
                return Ok(false);
            }
        };
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes);
        self.header.record_number = i32::from_le_bytes(raw);
        Ok(true)
    }

    /// Write the cached record count back to the header's 4-byte slot.
    pub fn write_record_number(&mut self) -> Result<bool> {
        let bytes = self.header.record_number.to_le_bytes();
        if let Err(err) = self.write_at(RECORD_NUM_INDEX, &bytes) {
            log::warn!("write record number failed: {}", err);
            return Ok(false);
        }
        Ok(true)
    }

    /// Write a brand-new header plus the declared field descriptors,
    /// creating (truncating) the file. Stamps `version = 3` and today's
    /// date, matching the source.
    pub fn write_head(&mut self) -> Result<bool> {
        let header_bytes = (FIELD_LEN * (self.fields.len() + 1) + 1) as i16;
        self.header.header_bytes = header_bytes;
        self.header.version = 3;

        let today = chrono::Local::now().date_naive();
        self.header.year = (today.year() - 1900) as i8;
        self.header.month = today.month() as i8;
        self.header.day = today.day() as i8;

        let record_bytes: i16 = 1 + self.fields.iter().map(|f| f.total_len as i16).sum::<i16>();
        self.header.record_bytes = record_bytes;

        self.buf.retrieve_all();
        if let Err(err) = self.header.serialize_to(&mut self.buf) {
            log::warn!("serialize header failed: {}", err);
            return Ok(false);
        }
        for field in &self.fields {
            if let Err(err) = field.serialize_to(&mut self.buf) {
                log::warn!("serialize field descriptor failed: {}", err);
                return Ok(false);
            }
        }
        self.buf.append_char(END_HEAD_FLAG);
        self.buf.append_char(END_FILE_FLAG);

        self.reader_pos = self.buf.readable_bytes() as u64 - 1;
        self.writer_pos = self.reader_pos;

        if let Err(err) = self.create_and_write(self.buf.peek()) {
            log::warn!("write head failed: {}", err);
            return Ok(false);
        }
        Ok(true)
    }

    /// Read the header and field descriptor array back from disk into the
    /// in-memory cache, validating that declared record length matches the
    /// sum of field widths.
    pub fn read_head(&mut self) -> Result<bool> {
        self.buf.retrieve_all();
        self.header.record_bytes = FIELD_LEN as i16;

        let header_bytes = match self.read_at(0, FIELD_LEN) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("read dbf head failed: {}", err);
                return Ok(false);
            }
        };
        self.buf.ensure_writable_bytes(FIELD_LEN);
        self.buf.begin_write()[..FIELD_LEN].copy_from_slice(&header_bytes);
        self.buf.has_written(FIELD_LEN);
        if let Err(err) = self.header.parse_from(&mut self.buf) {
            log::warn!("parse dbf head failed: {}", err);
            return Ok(false);
        }
        self.reader_pos = FIELD_LEN as u64;

        let record_len = self.header.header_bytes as u64 - self.reader_pos;
        self.buf.retrieve_all();
        let rest = match self.read_at(self.reader_pos, record_len as usize) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("read dbf field descriptors failed: {}", err);
                return Ok(false);
            }
        };
        self.buf.ensure_writable_bytes(rest.len());
        self.buf.begin_write()[..rest.len()].copy_from_slice(&rest);
        self.buf.has_written(rest.len());

        let field_count = (record_len as usize - 1) / FIELD_LEN;
        self.fields.clear();
        let mut record_bytes: i16 = 1;
        for _ in 0..field_count {
            let mut field = FieldDescriptor::default();
            if let Err(err) = field.parse_from(&mut self.buf) {
                log::warn!("field descriptor parse failed: {}", err);
                return Ok(false);
            }
            record_bytes += field.total_len as i16;
            self.fields.push(field);
            self.reader_pos += FIELD_LEN as u64;
        }

        if record_bytes != self.header.record_bytes {
            log::warn!(
                "record length in header ({}) does not match sum of field widths ({})",
                self.header.record_bytes,
                record_bytes
            );
            return Ok(false);
        }

        let end_char = match self.buf.read_char() {
            Ok(c) => c,
            Err(err) => {
                log::warn!("read header terminator failed: {}", err);
                return Ok(false);
            }
        };
        if end_char != END_HEAD_FLAG {
            log::warn!("header terminator mismatch: 0x{:02x}", end_char);
            return Ok(false);
        }
        self.reader_pos += 1;
        self.writer_pos =
            self.reader_pos + self.header.record_number as u64 * self.header.record_bytes as u64;
        Ok(true)
    }

    /// Read the next record at `reader_pos`, advancing it by one record.
    /// Generic over any [`DeletableRecord`], so a hand-written
    /// [`UserRecord`] flows through this verb exactly like [`DbfRecord`]
    /// does.
    pub fn read(&mut self, record: &mut dyn DeletableRecord) -> Result<bool> {
        let record_bytes = self.header.record_bytes as usize;
        let bytes = match self.read_at(self.reader_pos, record_bytes) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("read record failed: {}", err);
                return Ok(false);
            }
        };
        self.buf.retrieve_all();
        self.buf.ensure_writable_bytes(record_bytes);
        self.buf.begin_write()[..record_bytes].copy_from_slice(&bytes);
        self.buf.has_written(record_bytes);

        if let Err(err) = record.parse_from(&mut self.buf) {
            log::warn!("record parse failed: {}", err);
            return Ok(false);
        }
        self.reader_pos += record_bytes as u64;
        Ok(true)
    }

    /// Read `records.len()` consecutive records starting at `reader_pos`,
    /// advancing `reader_pos` past the whole batch.
    pub fn read_many(&mut self, records: &mut [Box<dyn DeletableRecord>]) -> Result<bool> {
        if records.is_empty() {
            return Ok(true);
        }
        let record_bytes = self.header.record_bytes as usize;
        let all_size = record_bytes * records.len();
        let bytes = match self.read_at(self.reader_pos, all_size) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("read records failed: {}", err);
                return Ok(false);
            }
        };
        self.buf.retrieve_all();
        self.buf.ensure_writable_bytes(all_size);
        self.buf.begin_write()[..all_size].copy_from_slice(&bytes);
        self.buf.has_written(all_size);

        for record in records.iter_mut() {
            if let Err(err) = record.parse_from(&mut self.buf) {
                log::warn!("record parse failed: {}", err);
                return Ok(false);
            }
        }
        self.reader_pos += all_size as u64;
        Ok(true)
    }

    /// Random-access read: uses `record.read_pos()` if it is non-zero,
    /// otherwise falls back to `reader_pos` -- but never advances
    /// `reader_pos` itself.
    pub fn over_read(&mut self, record: &mut DbfRecord) -> Result<bool> {
        let record_bytes = self.header.record_bytes as usize;
        let pos = if record.read_pos() == 0 { self.reader_pos } else { record.read_pos() };

        let bytes = match self.read_at(pos, record_bytes) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("over_read failed: {}", err);
                return Ok(false);
            }
        };
        self.buf.retrieve_all();
        self.buf.ensure_writable_bytes(record_bytes);
        self.buf.begin_write()[..record_bytes].copy_from_slice(&bytes);
        self.buf.has_written(record_bytes);

        if let Err(err) = record.parse_from(&mut self.buf) {
            log::warn!("over_read parse failed: {}", err);
            return Ok(false);
        }
        record.set_read_pos(pos);
        Ok(true)
    }

    /// Random-access batch read. When the first record's `read_pos` is
    /// unbound (0), the whole batch is stamped with ascending offsets
    /// starting at `reader_pos` -- each record gets its own, distinct
    /// position, not a shared one.
    pub fn over_read_many(&mut self, records: &mut [DbfRecord]) -> Result<bool> {
        if records.is_empty() {
            return Ok(true);
        }
        let record_bytes = self.header.record_bytes as usize;
        let all_size = record_bytes * records.len();

        let mut pos = records[0].read_pos();
        if pos == 0 {
            pos = self.reader_pos;
        }
        let bytes = match self.read_at(pos, all_size) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("over_read_many failed: {}", err);
                return Ok(false);
            }
        };
        self.buf.retrieve_all();
        self.buf.ensure_writable_bytes(all_size);
        self.buf.begin_write()[..all_size].copy_from_slice(&bytes);
        self.buf.has_written(all_size);

        for record in records.iter_mut() {
            if let Err(err) = record.parse_from(&mut self.buf) {
                log::warn!("over_read_many parse failed: {}", err);
                return Ok(false);
            }
            record.set_read_pos(pos);
            pos += record_bytes as u64;
        }

        if self.reader_pos < pos {
            self.reader_pos = pos;
        }
        Ok(true)
    }

    /// In-place overwrite if `record.read_pos()` is bound; otherwise treats
    /// this as a conceptual append, bumping the record count and the
    /// end-of-file marker.
    pub fn over_write(&mut self, record: &mut DbfRecord) -> Result<bool> {
        self.buf.retrieve_all();
        if let Err(err) = record.serialize_to(&mut self.buf) {
            log::warn!("over_write serialize failed: {}", err);
            return Ok(false);
        }

        let unbound = record.read_pos() == 0;
        let pos = if unbound {
            self.buf.append_char(END_FILE_FLAG);
            self.writer_pos
        } else {
            record.read_pos()
        };

        let payload = self.buf.peek().to_vec();
        if let Err(err) = self.write_at(pos, &payload) {
            log::warn!("over_write failed: {}", err);
            return Ok(false);
        }

        if unbound {
            self.header.record_number += 1;
            if !self.write_record_number()? {
                self.header.record_number -= 1;
                return Ok(false);
            }
            record.set_read_pos(pos);
            self.writer_pos += self.header.record_bytes as u64;
        }
        Ok(true)
    }

    /// Batch form of [`File::over_write`]: all records share one append
    /// decision, keyed off the first record's `read_pos()`.
    pub fn over_write_many(&mut self, records: &mut [DbfRecord]) -> Result<bool> {
        if records.is_empty() {
            return Ok(true);
        }
        self.buf.retrieve_all();
        for record in records.iter() {
            if let Err(err) = record.serialize_to(&mut self.buf) {
                log::warn!("over_write_many serialize failed: {}", err);
                return Ok(false);
            }
        }

        let unbound = records[0].read_pos() == 0;
        let mut pos = if unbound {
            self.buf.append_char(END_FILE_FLAG);
            self.writer_pos
        } else {
            records[0].read_pos()
        };

        let payload = self.buf.peek().to_vec();
        if let Err(err) = self.write_at(pos, &payload) {
            log::warn!("over_write_many failed: {}", err);
            return Ok(false);
        }

        let record_bytes = self.header.record_bytes as u64;
        let written = payload.len() as u64;
        let new_record_num = if pos + written > self.writer_pos + 1 {
            (pos + written - 1 - self.writer_pos) / record_bytes
        } else {
            0
        };

        if new_record_num > 0 {
            self.header.record_number += new_record_num as i32;
            if !self.write_record_number()? {
                self.header.record_number -= new_record_num as i32;
                return Ok(false);
            }
            for record in records.iter_mut() {
                record.set_read_pos(pos);
                pos += record_bytes;
            }
            self.writer_pos = pos;
        }
        Ok(true)
    }

    /// Append a new record at `writer_pos`, extending the file and bumping
    /// the record count. Generic over any [`DeletableRecord`], matching
    /// [`File::read`].
    pub fn append_write(&mut self, record: &dyn DeletableRecord) -> Result<bool> {
        self.buf.retrieve_all();
        if let Err(err) = record.serialize_to(&mut self.buf) {
            log::warn!("append_write serialize failed: {}", err);
            return Ok(false);
        }
        self.buf.append_char(END_FILE_FLAG);

        let payload = self.buf.peek().to_vec();
        if let Err(err) = self.append_at_writer_pos(&payload) {
            log::warn!("append_write failed: {}", err);
            return Ok(false);
        }

        self.header.record_number += 1;
        if !self.write_record_number()? {
            self.header.record_number -= 1;
            return Ok(false);
        }
        self.writer_pos += self.header.record_bytes as u64;
        Ok(true)
    }

    /// Append a whole batch of records at `writer_pos` in one write.
    pub fn append_write_many(&mut self, records: &[Box<dyn DeletableRecord>]) -> Result<bool> {
        if records.is_empty() {
            return Ok(true);
        }
        self.buf.retrieve_all();
        for record in records {
            if let Err(err) = record.serialize_to(&mut self.buf) {
                log::warn!("append_write_many serialize failed: {}", err);
                return Ok(false);
            }
        }
        self.buf.append_char(END_FILE_FLAG);

        let payload = self.buf.peek().to_vec();
        if let Err(err) = self.append_at_writer_pos(&payload) {
            log::warn!("append_write_many failed: {}", err);
            return Ok(false);
        }

        self.header.record_number += records.len() as i32;
        if !self.write_record_number()? {
            self.header.record_number -= records.len() as i32;
            return Ok(false);
        }
        self.writer_pos += self.header.record_bytes as u64 * records.len() as u64;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_file(path: PathBuf) -> File {
        let mut file = File::new(path);
        file.append_head_field("NAME", 'C', 10, 0);
        file.append_head_field("AGE", 'N', 3, 0);
        file
    }

    #[test]
    fn write_then_read_head_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dbf");
        let mut file = sample_file(path.clone());
        assert!(file.write_head().unwrap());

        let mut reopened = File::new(path);
        assert!(reopened.read_head().unwrap());
        assert_eq!(reopened.head_fields().len(), 2);
        assert_eq!(reopened.head_fields()[0].name.trim(), "NAME");
        assert_eq!(reopened.head().record_number, 0);
    }

    #[test]
    fn append_then_read_back_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dbf");
        let mut file = sample_file(path.clone());
        file.write_head().unwrap();

        let mut record = DbfRecord::for_schema(file.head_fields());
        record.set_values(vec![Value::Str("ALICE".to_string()), Value::Int(30)]);
        assert!(file.append_write(&record).unwrap());

        let mut reader = File::new(path);
        reader.read_head().unwrap();
        assert_eq!(reader.head().record_number, 1);

        let mut readback = DbfRecord::for_schema(reader.head_fields());
        assert!(reader.read(&mut readback).unwrap());
        assert_eq!(readback.values()[0], Value::Str("ALICE".to_string()));
        assert_eq!(readback.values()[1], Value::Int(30));
    }

    #[test]
    fn over_write_in_place_does_not_change_record_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dbf");
        let mut file = sample_file(path.clone());
        file.write_head().unwrap();

        let record_pos = file.writer_pos();
        let mut record = DbfRecord::for_schema(file.head_fields());
        record.set_values(vec![Value::Str("ALICE".to_string()), Value::Int(30)]);
        file.append_write(&record).unwrap();

        let mut update = DbfRecord::for_schema(file.head_fields());
        update.set_read_pos(record_pos);
        update.set_values(vec![Value::Str("ALICIA".to_string()), Value::Int(31)]);
        assert!(file.over_write(&mut update).unwrap());
        assert_eq!(file.head().record_number, 1);

        let mut readback = DbfRecord::for_schema(file.head_fields());
        readback.set_read_pos(record_pos);
        assert!(file.over_read(&mut readback).unwrap());
        assert_eq!(readback.values()[0], Value::Str("ALICIA".to_string()));
    }

    #[test]
    fn over_read_many_stamps_ascending_offsets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dbf");
        let mut file = sample_file(path.clone());
        file.write_head().unwrap();

        for (name, age) in [("A", 1), ("B", 2), ("C", 3)] {
            let mut record = DbfRecord::for_schema(file.head_fields());
            record.set_values(vec![Value::Str(name.to_string()), Value::Int(age)]);
            file.append_write(&record).unwrap();
        }

        let mut batch = vec![
            DbfRecord::for_schema(file.head_fields()),
            DbfRecord::for_schema(file.head_fields()),
            DbfRecord::for_schema(file.head_fields()),
        ];
        assert!(file.over_read_many(&mut batch).unwrap());
        let positions: Vec<u64> = batch.iter().map(|r| r.read_pos()).collect();
        assert!(positions[0] < positions[1]);
        assert!(positions[1] < positions[2]);
    }

    #[derive(Default)]
    struct Person {
        deleted: bool,
        name: String,
        age: i64,
    }

    impl UserRecord for Person {
        fn columns() -> &'static [ColumnSpec] {
            &[
                ColumnSpec { name: "NAME", width: 10, precision: 0, numeric: false },
                ColumnSpec { name: "AGE", width: 3, precision: 0, numeric: true },
            ]
        }

        fn get(&self, index: usize) -> Value {
            match index {
                0 => Value::Str(self.name.clone()),
                1 => Value::Int(self.age),
                _ => unreachable!(),
            }
        }

        fn set(&mut self, index: usize, value: Value) {
            match (index, value) {
                (0, Value::Str(s)) => self.name = s,
                (1, Value::Int(v)) => self.age = v,
                _ => unreachable!(),
            }
        }

        fn is_deleted(&self) -> bool {
            self.deleted
        }

        fn set_deleted(&mut self, deleted: bool) {
            self.deleted = deleted;
        }
    }

    #[test]
    fn user_record_flows_through_read_and_append_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dbf");
        let mut file = sample_file(path.clone());
        file.write_head().unwrap();

        let person = Person { deleted: false, name: "BOB".to_string(), age: 42 };
        assert!(file.append_write(&person).unwrap());

        let mut reader = File::new(path);
        reader.read_head().unwrap();
        let mut readback = Person::default();
        assert!(reader.read(&mut readback).unwrap());
        assert_eq!(readback.name, "BOB");
        assert_eq!(readback.age, 42);
    }
}
