//! IMF file writer

use crate::error::Result;
use crate::opl::OplSink;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

/// IMF container flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImfType {
    /// Bare event stream.
    Type0,
    /// Event stream prefixed with a 16-bit data length.
    Type1,
}

/// Writes OPL register events as an IMF file.
///
/// The stream is a flat run of little-endian `(delay, register, value)`
/// records at a fixed tick rate, opened by one zero 16-bit delay. Delay
/// callbacks accumulate in milliseconds and are converted to ticks when the
/// next register write flushes them out.
pub struct ImfWriter {
    file: File,
    imf_type: ImfType,
    /// Playback rate in Hz (games use 280, 560 or 700).
    speed: u32,
    /// Milliseconds owed before the next register write.
    pending_millis: u32,
    /// Bytes written after the optional length field.
    data_len: u64,
    /// First write failure, reported at finalize.
    failure: Option<io::Error>,
}

impl ImfWriter {
    /// Create a new IMF writer.
    pub fn new(path: &Path, imf_type: ImfType, speed: u32) -> Result<Self> {
        let mut file = File::create(path)?;
        if imf_type == ImfType::Type1 {
            // Data length, patched in finalize
            file.write_all(&[0, 0])?;
        }
        // Leading delay of the very first event
        file.write_all(&[0, 0])?;
        Ok(Self {
            file,
            imf_type,
            speed,
            pending_millis: 0,
            data_len: 2,
            failure: None,
        })
    }

    /// Current length of the event data in bytes.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Patch up the type-1 length field and flush.
    pub fn finalize(&mut self) -> Result<()> {
        if let Some(e) = self.failure.take() {
            return Err(e.into());
        }
        if self.imf_type == ImfType::Type1 {
            // The length field does not count itself
            let size = self.data_len.min(u64::from(u16::MAX)) as u16;
            self.file.seek(SeekFrom::Start(0))?;
            self.file.write_all(&size.to_le_bytes())?;
        }
        self.file.flush()?;
        Ok(())
    }

    fn write_record(&mut self, record: [u8; 4]) {
        if self.failure.is_some() {
            return;
        }
        if let Err(e) = self.file.write_all(&record) {
            self.failure = Some(e);
            return;
        }
        self.data_len += 4;
    }
}

impl OplSink for ImfWriter {
    fn write_register(&mut self, reg: u8, value: u8) {
        let ticks = u64::from(self.pending_millis) * u64::from(self.speed) / 1000;
        let ticks = ticks.min(u64::from(u16::MAX)) as u16;
        self.pending_millis = 0;

        let delay = ticks.to_le_bytes();
        self.write_record([delay[0], delay[1], reg, value]);
    }

    fn advance_clock(&mut self, millis: u16) {
        self.pending_millis = self.pending_millis.saturating_add(u32::from(millis));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_type0_framing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.imf");

        let mut w = ImfWriter::new(&path, ImfType::Type0, 560).unwrap();
        w.write_register(0xB0, 0x31);
        w.advance_clock(1000);
        w.write_register(0xB0, 0x11);
        w.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x00, 0x00, // leading delay
                0x00, 0x00, 0xB0, 0x31, // immediate write
                0x30, 0x02, 0xB0, 0x11, // one second = 560 ticks = 0x0230
            ]
        );
    }

    #[test]
    fn test_type1_length_prefix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.imf");

        let mut w = ImfWriter::new(&path, ImfType::Type1, 560).unwrap();
        w.write_register(0x01, 0x20);
        w.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // length field + leading delay + one record
        assert_eq!(bytes.len(), 2 + 2 + 4);
        let size = u16::from_le_bytes([bytes[0], bytes[1]]);
        assert_eq!(u64::from(size), w.data_len());
        assert_eq!(size, 6);
    }

    #[test]
    fn test_delays_accumulate_across_writeless_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.imf");

        let mut w = ImfWriter::new(&path, ImfType::Type0, 1000).unwrap();
        w.advance_clock(10);
        w.advance_clock(20);
        w.write_register(0xA0, 0x57);
        w.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[2..], &[30, 0, 0xA0, 0x57]);
    }
}
