//! Wire-level constants and bounds-checked byte cursors.
//!
//! The container is a flat stream of tagged commands. Every multi-byte
//! integer is little-endian and every variable-length field carries a
//! `u32` length prefix that is validated against the remaining input
//! before anything is allocated, so a malformed or adversarial stream
//! fails with a clean [`FbomError::Format`] instead of an out-of-bounds
//! read or an unbounded allocation.

use crate::error::FbomError;
use crate::version::FbomVersion;

/// File magic, bytes 0–3 of the header.
pub const MAGIC: [u8; 4] = [b'H', b'Y', b'P', 0x00];

/// Total header size in bytes: magic, packed version, reserved padding.
pub const HEADER_SIZE: usize = 32;

/// Maximum object / pool-entry recursion depth the decoder accepts.
pub const MAX_DEPTH: usize = 256;

/// File extension appended to external reference names.
pub const CHUNK_EXTENSION: &str = "chunk";

/// Stream-level command bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Sentinel: no more commands.
    None = 0x00,
    ObjectStart = 0x01,
    ObjectEnd = 0x02,
    StaticDataStart = 0x03,
    StaticDataEnd = 0x04,
    DefineProperty = 0x05,
}

impl Command {
    pub fn from_u8(byte: u8) -> Result<Self, FbomError> {
        match byte {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::ObjectStart),
            0x02 => Ok(Self::ObjectEnd),
            0x03 => Ok(Self::StaticDataStart),
            0x04 => Ok(Self::StaticDataEnd),
            0x05 => Ok(Self::DefineProperty),
            other => Err(FbomError::format(format!(
                "unknown command byte 0x{other:02x}"
            ))),
        }
    }
}

/// Location bytes preceding every type, data cell, and object payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Location {
    /// Absent / unset payload.
    None = 0x00,
    /// Payload is a 4-byte offset into the static data pool.
    Static = 0x01,
    /// Payload follows inline.
    Inplace = 0x02,
    /// Object payload lives in a separate chunk file (objects only).
    ExtRef = 0x03,
}

impl Location {
    pub fn from_u8(byte: u8) -> Result<Self, FbomError> {
        match byte {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::Static),
            0x02 => Ok(Self::Inplace),
            0x03 => Ok(Self::ExtRef),
            other => Err(FbomError::format(format!(
                "unknown location byte 0x{other:02x}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ByteReader
// ---------------------------------------------------------------------------

/// A bounds-checked cursor over an in-memory byte stream.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Whether the cursor has consumed all input.
    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], FbomError> {
        if len > self.remaining() {
            return Err(FbomError::format(format!(
                "unexpected end of stream reading {what}: need {len} bytes, {} remain",
                self.remaining()
            )));
        }
        let span = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(span)
    }

    pub fn read_u8(&mut self, what: &str) -> Result<u8, FbomError> {
        Ok(self.take(1, what)?[0])
    }

    /// Look at the next byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn read_u32(&mut self, what: &str) -> Result<u32, FbomError> {
        let span = self.take(4, what)?;
        Ok(u32::from_le_bytes([span[0], span[1], span[2], span[3]]))
    }

    pub fn read_u64(&mut self, what: &str) -> Result<u64, FbomError> {
        let span = self.take(8, what)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(span);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a `u32`-length-prefixed byte span. The declared length is
    /// validated against the remaining input before any copy.
    pub fn read_bytes(&mut self, what: &str) -> Result<&'a [u8], FbomError> {
        let len = self.read_u32(what)? as usize;
        self.take(len, what)
    }

    /// Read a `u32`-length-prefixed UTF-8 string.
    pub fn read_string(&mut self, what: &str) -> Result<String, FbomError> {
        let span = self.read_bytes(what)?;
        std::str::from_utf8(span)
            .map(str::to_owned)
            .map_err(|e| FbomError::format(format!("invalid UTF-8 in {what}: {e}")))
    }

    pub fn skip(&mut self, len: usize, what: &str) -> Result<(), FbomError> {
        self.take(len, what).map(|_| ())
    }

    pub fn read_command(&mut self) -> Result<Command, FbomError> {
        Command::from_u8(self.read_u8("command")?)
    }

    /// Peek the next command byte without consuming it.
    pub fn peek_command(&self) -> Result<Command, FbomError> {
        match self.peek_u8() {
            Some(byte) => Command::from_u8(byte),
            None => Ok(Command::None),
        }
    }

    pub fn read_location(&mut self) -> Result<Location, FbomError> {
        Location::from_u8(self.read_u8("location")?)
    }
}

// ---------------------------------------------------------------------------
// ByteWriter
// ---------------------------------------------------------------------------

/// Growable output buffer mirroring [`ByteReader`].
#[derive(Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_raw(&mut self, span: &[u8]) {
        self.bytes.extend_from_slice(span);
    }

    /// Write a `u32`-length-prefixed byte span.
    pub fn write_bytes(&mut self, span: &[u8]) {
        self.write_u32(span.len() as u32);
        self.write_raw(span);
    }

    /// Write a `u32`-length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    pub fn write_command(&mut self, command: Command) {
        self.write_u8(command as u8);
    }

    pub fn write_location(&mut self, location: Location) {
        self.write_u8(location as u8);
    }
}

/// Write the fixed 32-byte container header.
pub fn write_header(out: &mut ByteWriter, version: FbomVersion) {
    out.write_raw(&MAGIC);
    out.write_u32(version.to_u32());
    out.write_raw(&[0u8; HEADER_SIZE - 8]);
}

/// Validate and consume the fixed 32-byte container header, returning the
/// file's packed version.
pub fn read_header(input: &mut ByteReader<'_>) -> Result<FbomVersion, FbomError> {
    let magic = input.take(4, "magic")?;
    if magic != MAGIC {
        return Err(FbomError::format(format!(
            "bad magic: expected {MAGIC:02x?}, found {magic:02x?}"
        )));
    }
    let version = FbomVersion::from_u32(input.read_u32("version")?);
    input.skip(HEADER_SIZE - 8, "header padding")?;
    Ok(version)
}
