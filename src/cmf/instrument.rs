//! Instrument bank: SBI-style OPL patch records and the built-in defaults

use super::reader::CmfReader;
use crate::error::Result;

/// Number of instrument slots a bank always provides.
pub const BANK_SIZE: usize = 128;

/// Bytes per instrument record on disk: 11 meaningful plus 5 padding.
const RECORD_DATA: usize = 11;
const RECORD_PADDING: usize = 5;

/// One OPL operator cell of a two-operator patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Operator {
    /// AM/VIB/EG-type/KSR flags and frequency multiplier
    pub char_mult: u8,
    /// Key scaling level and output attenuation
    pub scaling_output: u8,
    /// Attack and decay rates
    pub attack_decay: u8,
    /// Sustain level and release rate
    pub sustain_release: u8,
    /// Waveform select
    pub wave_select: u8,
}

/// A two-operator OPL instrument definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Instrument {
    pub modulator: Operator,
    pub carrier: Operator,
    /// Feedback/connection byte shared by both operators.
    pub connection: u8,
}

impl Instrument {
    /// Operator by index: 0 is the modulator, anything else the carrier.
    pub fn operator(&self, index: usize) -> &Operator {
        if index == 0 {
            &self.modulator
        } else {
            &self.carrier
        }
    }
}

const fn patch(b: [u8; RECORD_DATA]) -> Instrument {
    Instrument {
        modulator: Operator {
            char_mult: b[0],
            scaling_output: b[2],
            attack_decay: b[4],
            sustain_release: b[6],
            wave_select: b[8],
        },
        carrier: Operator {
            char_mult: b[1],
            scaling_output: b[3],
            attack_decay: b[5],
            sustain_release: b[7],
            wave_select: b[9],
        },
        connection: b[10],
    }
}

/// The 16 patches Creative's player falls back on for any slot a file does
/// not override. They repeat cyclically to fill all 128 slots; the Word
/// Rescue songs are a good example of files that rely on them.
pub const DEFAULT_PATCHES: [Instrument; 16] = [
    patch([0x01, 0x11, 0x4F, 0x00, 0xF1, 0xD2, 0x53, 0x74, 0x00, 0x00, 0x06]),
    patch([0x07, 0x12, 0x4F, 0x00, 0xF2, 0xF2, 0x60, 0x72, 0x00, 0x00, 0x08]),
    patch([0x31, 0xA1, 0x1C, 0x80, 0x51, 0x54, 0x03, 0x67, 0x00, 0x00, 0x0E]),
    patch([0x31, 0xA1, 0x1C, 0x80, 0x41, 0x92, 0x0B, 0x3B, 0x00, 0x00, 0x0E]),
    patch([0x31, 0x16, 0x87, 0x80, 0xA1, 0x7D, 0x11, 0x43, 0x00, 0x00, 0x08]),
    patch([0x30, 0xB1, 0xC8, 0x80, 0xD5, 0x61, 0x19, 0x1B, 0x00, 0x00, 0x0C]),
    patch([0xF1, 0x21, 0x01, 0x00, 0x97, 0xF1, 0x17, 0x18, 0x00, 0x00, 0x08]),
    patch([0x32, 0x16, 0x87, 0x80, 0xA1, 0x7D, 0x10, 0x33, 0x00, 0x00, 0x08]),
    patch([0x01, 0x12, 0x4F, 0x00, 0x71, 0x52, 0x53, 0x7C, 0x00, 0x00, 0x0A]),
    patch([0x02, 0x03, 0x8D, 0x00, 0xD7, 0xF5, 0x37, 0x18, 0x00, 0x00, 0x04]),
    patch([0x21, 0x21, 0xD1, 0x00, 0xA3, 0xA4, 0x46, 0x25, 0x00, 0x00, 0x0A]),
    patch([0x22, 0x22, 0x0F, 0x00, 0xF6, 0xF6, 0x95, 0x36, 0x00, 0x00, 0x0A]),
    patch([0xE1, 0xE1, 0x00, 0x00, 0x44, 0x54, 0x24, 0x34, 0x02, 0x02, 0x07]),
    patch([0xA5, 0xB1, 0xD2, 0x80, 0x81, 0xF1, 0x03, 0x05, 0x00, 0x00, 0x02]),
    patch([0x71, 0x22, 0xC5, 0x00, 0x6E, 0x8B, 0x17, 0x0E, 0x00, 0x00, 0x02]),
    patch([0x32, 0x21, 0x16, 0x80, 0x73, 0x75, 0x24, 0x57, 0x00, 0x00, 0x0E]),
];

fn read_record(reader: &mut CmfReader) -> Result<Instrument> {
    // Operator fields are interleaved: modulator byte then carrier byte.
    let b = reader.read_bytes(RECORD_DATA)?;
    reader.skip(RECORD_PADDING);
    Ok(Instrument {
        modulator: Operator {
            char_mult: b[0],
            scaling_output: b[2],
            attack_decay: b[4],
            sustain_release: b[6],
            wave_select: b[8],
        },
        carrier: Operator {
            char_mult: b[1],
            scaling_output: b[3],
            attack_decay: b[5],
            sustain_release: b[7],
            wave_select: b[9],
        },
        connection: b[10],
    })
}

/// Load a full 128-slot instrument bank.
///
/// Reads `count` explicit records from the stream; every remaining slot is
/// filled from `DEFAULT_PATCHES`, cycling by `index % 16`.
pub fn load_bank(reader: &mut CmfReader, count: u16) -> Result<[Instrument; BANK_SIZE]> {
    let explicit = usize::from(count).min(BANK_SIZE);
    let mut bank = [Instrument::default(); BANK_SIZE];
    for slot in bank.iter_mut().take(explicit) {
        *slot = read_record(reader)?;
    }
    for (i, slot) in bank.iter_mut().enumerate().skip(explicit) {
        *slot = DEFAULT_PATCHES[i % DEFAULT_PATCHES.len()];
    }
    Ok(bank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_empty_bank_is_all_defaults() {
        let mut reader = CmfReader::new(&[]);
        let bank = load_bank(&mut reader, 0).unwrap();
        for (i, inst) in bank.iter().enumerate() {
            assert_eq!(*inst, DEFAULT_PATCHES[i % 16], "slot {i}");
        }
    }

    #[test]
    fn test_explicit_record_layout() {
        let mut data = vec![
            0x21, 0x31, 0x40, 0x05, 0xF0, 0xF2, 0x53, 0x74, 0x01, 0x02, 0x06,
        ];
        data.extend_from_slice(&[0xAA; 5]); // padding, must be skipped
        let mut reader = CmfReader::new(&data);
        let bank = load_bank(&mut reader, 1).unwrap();

        assert_eq!(bank[0].modulator.char_mult, 0x21);
        assert_eq!(bank[0].carrier.char_mult, 0x31);
        assert_eq!(bank[0].modulator.scaling_output, 0x40);
        assert_eq!(bank[0].carrier.scaling_output, 0x05);
        assert_eq!(bank[0].modulator.attack_decay, 0xF0);
        assert_eq!(bank[0].carrier.attack_decay, 0xF2);
        assert_eq!(bank[0].modulator.sustain_release, 0x53);
        assert_eq!(bank[0].carrier.sustain_release, 0x74);
        assert_eq!(bank[0].modulator.wave_select, 0x01);
        assert_eq!(bank[0].carrier.wave_select, 0x02);
        assert_eq!(bank[0].connection, 0x06);

        // Slot 1 onward falls back to the default table
        assert_eq!(bank[1], DEFAULT_PATCHES[1]);
        assert_eq!(bank[127], DEFAULT_PATCHES[127 % 16]);
    }

    #[test]
    fn test_truncated_bank() {
        let data = [0x21u8; 6];
        let mut reader = CmfReader::new(&data);
        assert!(matches!(
            load_bank(&mut reader, 1),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_last_record_may_omit_padding() {
        let data = [0u8; RECORD_DATA];
        let mut reader = CmfReader::new(&data);
        assert!(load_bank(&mut reader, 1).is_ok());
    }
}
