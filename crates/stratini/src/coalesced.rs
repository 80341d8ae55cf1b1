//! On-disk format for coalesced config archives.
//!
//! An archive is a flat sequence of (filename, contents) string pairs:
//!
//! ```text
//! byte 0        endianness flag: 0 = little, 1 = big
//! u32           entry count
//! per entry     u32 filename length, filename bytes (UTF-8),
//!               u32 contents length, contents bytes (UTF-8)
//! ```
//!
//! All integers use the byte order named by the flag, chosen by the
//! writer so an archive can be baked for a target platform and read
//! back anywhere.

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, Result};

/// Byte order of the integers inside a coalesced archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

fn put_u32(buf: &mut Vec<u8>, value: u32, endianness: Endianness) {
    let bytes = match endianness {
        Endianness::Little => value.to_le_bytes(),
        Endianness::Big => value.to_be_bytes(),
    };
    buf.extend_from_slice(&bytes);
}

fn put_string(buf: &mut Vec<u8>, value: &str, endianness: Endianness) {
    put_u32(buf, value.len() as u32, endianness);
    buf.extend_from_slice(value.as_bytes());
}

/// Serialize (filename, contents) pairs to `path` in the given byte
/// order.
pub fn write_archive(
    path: &Path,
    entries: &[(String, String)],
    endianness: Endianness,
) -> Result<()> {
    let mut buf = Vec::new();
    buf.push(match endianness {
        Endianness::Little => 0u8,
        Endianness::Big => 1u8,
    });
    put_u32(&mut buf, entries.len() as u32, endianness);
    for (name, contents) in entries {
        put_string(&mut buf, name, endianness);
        put_string(&mut buf, contents, endianness);
    }
    fs::write(path, buf).map_err(|source| ConfigError::io(path, source))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
    path: &'a Path,
    endianness: Endianness,
}

impl<'a> Cursor<'a> {
    fn malformed(&self, reason: &str) -> ConfigError {
        ConfigError::CoalescedFormat {
            path: self.path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| self.malformed("truncated archive"))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| self.malformed("truncated length field"))?;
        Ok(match self.endianness {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big => u32::from_be_bytes(bytes),
        })
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.malformed("non-UTF-8 string"))
    }
}

/// Read an archive back into its (filename, contents) pairs, honoring
/// whichever byte order it was written with.
pub fn read_archive(path: &Path) -> Result<Vec<(String, String)>> {
    let bytes = fs::read(path).map_err(|source| ConfigError::io(path, source))?;
    let Some((&flag, rest)) = bytes.split_first() else {
        return Err(ConfigError::CoalescedFormat {
            path: path.to_path_buf(),
            reason: "empty archive".to_string(),
        });
    };
    let endianness = match flag {
        0 => Endianness::Little,
        1 => Endianness::Big,
        other => {
            return Err(ConfigError::CoalescedFormat {
                path: path.to_path_buf(),
                reason: format!("unknown endianness flag {other}"),
            });
        }
    };
    let mut cursor = Cursor {
        bytes: rest,
        offset: 0,
        path,
        endianness,
    };
    let count = cursor.read_u32()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let name = cursor.read_string()?;
        let contents = cursor.read_string()?;
        entries.push((name, contents));
    }
    Ok(entries)
}
