//! Shared binary-framing helpers for every persisted format (`.bcf`, `.rsm`,
//! the film raster, the DLSC cache): a fixed `magic: u32, version: u32`
//! header, checked on load, replacing the original's Boost-serialization
//! framing per the redesign flag in the design notes.

use crate::error::{RenderError, Result};
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    pub magic: u32,
    pub version: u32,
}

impl FormatHeader {
    pub const SIZE: usize = 8;

    pub fn write(&self, out: &mut impl Write) -> Result<()> {
        out.write_all(&self.magic.to_le_bytes()).map_err(RenderError::Io)?;
        out.write_all(&self.version.to_le_bytes()).map_err(RenderError::Io)?;
        Ok(())
    }

    pub fn read(input: &mut impl Read, expected_magic: u32, max_supported_version: u32) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        input.read_exact(&mut buf).map_err(RenderError::Io)?;
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if magic != expected_magic {
            return Err(RenderError::Configuration(format!("bad magic: expected {expected_magic:#x}, found {magic:#x}")));
        }
        if version > max_supported_version {
            return Err(RenderError::Configuration(format!(
                "unsupported format version {version}, this build supports up to {max_supported_version}"
            )));
        }
        Ok(FormatHeader { magic, version })
    }
}

pub const FILM_MAGIC: u32 = 0x4C58_4346; // "LXCF"
pub const FILM_VERSION: u32 = 1;
pub const RESUME_MAGIC: u32 = 0x4C58_5253; // "LXRS"
pub const RESUME_VERSION: u32 = 1;
pub const DLSC_MAGIC: u32 = 0x4C58_4443; // "LXDC"
pub const DLSC_VERSION: u32 = 1;

/// Write `bytes` to `path` atomically: write to a `.tmp` sibling, then
/// rename over the destination. The previous file (if any) is left
/// untouched if the write fails partway through.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("bin")
    ));
    {
        let mut tmp = std::fs::File::create(&tmp_path).map_err(RenderError::Io)?;
        tmp.write_all(bytes).map_err(RenderError::Io)?;
        tmp.sync_all().map_err(RenderError::Io)?;
    }
    std::fs::rename(&tmp_path, path).map_err(RenderError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = FormatHeader { magic: FILM_MAGIC, version: 1 };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let read_back = FormatHeader::read(&mut buf.as_slice(), FILM_MAGIC, FILM_VERSION).unwrap();
        assert_eq!(read_back, header);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let header = FormatHeader { magic: DLSC_MAGIC, version: 1 };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert!(FormatHeader::read(&mut buf.as_slice(), FILM_MAGIC, FILM_VERSION).is_err());
    }

    #[test]
    fn future_version_is_rejected() {
        let header = FormatHeader { magic: FILM_MAGIC, version: 99 };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert!(FormatHeader::read(&mut buf.as_slice(), FILM_MAGIC, FILM_VERSION).is_err());
    }

    #[test]
    fn atomic_write_preserves_existing_file_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.bin");
        atomic_write(&path, b"hello").unwrap();
        let mut contents = Vec::new();
        std::fs::File::open(&path).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"hello");
    }
}
