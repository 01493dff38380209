//! CMF header parsing

use super::reader::CmfReader;
use crate::error::{Error, Result};

pub const CMF_MAGIC: &[u8; 4] = b"CTMF";
pub const VERSION_1_0: u16 = 0x0100;
pub const VERSION_1_1: u16 = 0x0101;

/// Fixed header of a CMF file, immutable after load.
#[derive(Debug, Clone)]
pub struct CmfHeader {
    pub version: u16,
    pub instrument_block_offset: u16,
    pub music_offset: u16,
    pub ticks_per_quarter_note: u16,
    pub ticks_per_second: u16,
    pub tag_offset_title: u16,
    pub tag_offset_composer: u16,
    pub tag_offset_remarks: u16,
    pub channels_in_use: [u8; 16],
    pub num_instruments: u16,
    /// Only present in v1.1 files; zero otherwise.
    pub tempo: u16,
}

impl CmfHeader {
    /// Parse a CMF header from the start of the stream.
    pub fn parse(reader: &mut CmfReader) -> Result<Self> {
        let magic = reader.read_bytes(4).map_err(|_| Error::BadMagic)?;
        if magic != CMF_MAGIC {
            return Err(Error::BadMagic);
        }

        let version = reader.read_u16_le()?;
        if version != VERSION_1_0 && version != VERSION_1_1 {
            return Err(Error::UnsupportedVersion(version));
        }

        let instrument_block_offset = reader.read_u16_le()?;
        let music_offset = reader.read_u16_le()?;
        let ticks_per_quarter_note = reader.read_u16_le()?;
        let ticks_per_second = reader.read_u16_le()?;
        let tag_offset_title = reader.read_u16_le()?;
        let tag_offset_composer = reader.read_u16_le()?;
        let tag_offset_remarks = reader.read_u16_le()?;

        let mut channels_in_use = [0u8; 16];
        channels_in_use.copy_from_slice(&reader.read_bytes(16)?);

        // v1.0 has an 8-bit instrument count and no tempo field
        let (num_instruments, tempo) = if version == VERSION_1_0 {
            (u16::from(reader.read_u8()?), 0)
        } else {
            (reader.read_u16_le()?, reader.read_u16_le()?)
        };

        Ok(Self {
            version,
            instrument_block_offset,
            music_offset,
            ticks_per_quarter_note,
            ticks_per_second,
            tag_offset_title,
            tag_offset_composer,
            tag_offset_remarks,
            channels_in_use,
            num_instruments,
            tempo,
        })
    }
}

/// Read a NUL-terminated tag string at `offset`, or `None` if the header
/// carries no tag there.
pub fn read_tag(data: &[u8], offset: u16) -> Option<String> {
    if offset == 0 {
        return None;
    }
    let start = usize::from(offset);
    if start >= data.len() {
        return None;
    }
    let end = data[start..]
        .iter()
        .position(|&b| b == 0)
        .map_or(data.len(), |n| start + n);
    Some(String::from_utf8_lossy(&data[start..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_1_header() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"CTMF");
        data.extend_from_slice(&0x0101u16.to_le_bytes());
        data.extend_from_slice(&40u16.to_le_bytes()); // instrument block
        data.extend_from_slice(&0x0200u16.to_le_bytes()); // music
        data.extend_from_slice(&120u16.to_le_bytes()); // ticks/quarter
        data.extend_from_slice(&560u16.to_le_bytes()); // ticks/second
        data.extend_from_slice(&0u16.to_le_bytes()); // title
        data.extend_from_slice(&0u16.to_le_bytes()); // composer
        data.extend_from_slice(&0u16.to_le_bytes()); // remarks
        data.extend_from_slice(&[0u8; 16]); // channels in use
        data.extend_from_slice(&3u16.to_le_bytes()); // instruments
        data.extend_from_slice(&110u16.to_le_bytes()); // tempo
        data
    }

    #[test]
    fn test_parse_v1_1() {
        let data = v1_1_header();
        let mut reader = CmfReader::new(&data);
        let header = CmfHeader::parse(&mut reader).unwrap();
        assert_eq!(header.version, VERSION_1_1);
        assert_eq!(header.instrument_block_offset, 40);
        assert_eq!(header.music_offset, 0x0200);
        assert_eq!(header.ticks_per_second, 560);
        assert_eq!(header.num_instruments, 3);
        assert_eq!(header.tempo, 110);
    }

    #[test]
    fn test_parse_v1_0_short_count() {
        let mut data = v1_1_header();
        data[4..6].copy_from_slice(&0x0100u16.to_le_bytes());
        // v1.0: single count byte, no tempo
        data.truncate(36);
        data.push(7);
        let mut reader = CmfReader::new(&data);
        let header = CmfHeader::parse(&mut reader).unwrap();
        assert_eq!(header.version, VERSION_1_0);
        assert_eq!(header.num_instruments, 7);
        assert_eq!(header.tempo, 0);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = v1_1_header();
        data[0] = b'X';
        let mut reader = CmfReader::new(&data);
        assert!(matches!(CmfHeader::parse(&mut reader), Err(Error::BadMagic)));
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = v1_1_header();
        data[4..6].copy_from_slice(&0x0200u16.to_le_bytes());
        let mut reader = CmfReader::new(&data);
        assert!(matches!(
            CmfHeader::parse(&mut reader),
            Err(Error::UnsupportedVersion(0x0200))
        ));
    }

    #[test]
    fn test_truncated_header() {
        let data = &v1_1_header()[..20];
        let mut reader = CmfReader::new(data);
        assert!(matches!(
            CmfHeader::parse(&mut reader),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_read_tag() {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(b"Composer\0junk");
        assert_eq!(read_tag(&data, 8).as_deref(), Some("Composer"));
        assert_eq!(read_tag(&data, 0), None);
        assert_eq!(read_tag(&data, 9999), None);
    }
}
