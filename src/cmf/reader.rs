//! Byte-level reader over a CMF image

use crate::error::{Error, Result};

/// Sequential reader over a CMF byte image.
pub struct CmfReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> CmfReader<'a> {
    /// Create a new reader from raw CMF data
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if we've reached the end of data
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Seek to a position
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Skip `len` bytes, clamping at end of data
    pub fn skip(&mut self, len: usize) {
        self.pos = (self.pos + len).min(self.data.len());
    }

    /// Step back one byte, so the byte just read is read again.
    ///
    /// Used by running-status handling, where a data byte doubles as the
    /// missing status byte's first operand.
    pub fn unread_byte(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        if self.pos >= self.data.len() {
            return Err(Error::TruncatedInput { offset: self.pos });
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    /// Read a 16-bit little-endian value
    pub fn read_u16_le(&mut self) -> Result<u16> {
        let lo = self.read_u8()? as u16;
        let hi = self.read_u8()? as u16;
        Ok(lo | (hi << 8))
    }

    /// Read bytes into a buffer
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.pos + len > self.data.len() {
            return Err(Error::TruncatedInput { offset: self.data.len() });
        }
        let bytes = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(bytes)
    }

    /// Read a MIDI variable-length number.
    ///
    /// Up to four bytes of seven data bits each; the high bit marks a
    /// continuation byte.
    pub fn read_midi_number(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..4 {
            let next = self.read_u8()?;
            value = (value << 7) | u32::from(next & 0x7F);
            if next & 0x80 == 0 {
                break;
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_number_single_byte() {
        // Values below 128 are a single literal byte
        for v in [0u8, 1, 64, 127] {
            let data = [v];
            let mut r = CmfReader::new(&data);
            assert_eq!(r.read_midi_number().unwrap(), u32::from(v));
        }
    }

    #[test]
    fn test_midi_number_two_bytes() {
        let mut r = CmfReader::new(&[0x81, 0x00]);
        assert_eq!(r.read_midi_number().unwrap(), 128);

        let mut r = CmfReader::new(&[0xFF, 0x7F]);
        assert_eq!(r.read_midi_number().unwrap(), 0x3FFF);
    }

    #[test]
    fn test_midi_number_four_bytes() {
        let mut r = CmfReader::new(&[0xFF, 0xFF, 0xFF, 0x7F]);
        assert_eq!(r.read_midi_number().unwrap(), 0x0FFF_FFFF);
    }

    #[test]
    fn test_midi_number_truncated() {
        let mut r = CmfReader::new(&[0x81]);
        assert!(matches!(
            r.read_midi_number(),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_unread_byte() {
        let mut r = CmfReader::new(&[0x42, 0x43]);
        assert_eq!(r.read_u8().unwrap(), 0x42);
        r.unread_byte();
        assert_eq!(r.read_u8().unwrap(), 0x42);
        assert_eq!(r.read_u8().unwrap(), 0x43);
    }

    #[test]
    fn test_read_u16_le() {
        let mut r = CmfReader::new(&[0x34, 0x12]);
        assert_eq!(r.read_u16_le().unwrap(), 0x1234);
    }
}
