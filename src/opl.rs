//! OPL2 register map and the output boundary of the translation engine.

/// AM/VIB/EG/KSR/multiplier (per operator)
pub const BASE_CHAR_MULT: u8 = 0x20;
/// Key scaling / output level (per operator)
pub const BASE_SCAL_LEVL: u8 = 0x40;
/// Attack/decay rates (per operator)
pub const BASE_ATCK_DCAY: u8 = 0x60;
/// Sustain level / release rate (per operator)
pub const BASE_SUST_RLSE: u8 = 0x80;
/// Waveform select (per operator)
pub const BASE_WAVE: u8 = 0xE0;
/// F-number low byte (per voice)
pub const BASE_FNUM_L: u8 = 0xA0;
/// Key-on / block / F-number high bits (per voice)
pub const BASE_KEYON_FREQ: u8 = 0xB0;
/// Feedback / connection (per voice)
pub const BASE_FEED_CONN: u8 = 0xC0;
/// AM/VIB depth and rhythm control
pub const BASE_RHYTHM: u8 = 0xBD;

/// Key-on bit in the `BASE_KEYON_FREQ` registers.
pub const KEYON_BIT: u8 = 0x20;
/// Rhythm-mode enable bit in `BASE_RHYTHM`.
pub const RHYTHM_MODE_BIT: u8 = 0x20;

/// Offset of a voice's modulator cell from an operator base register.
///
/// The carrier cell sits three slots above the modulator, so voice 4's
/// attack/decay registers are 0x69 (modulator) and 0x6C (carrier).
pub fn operator_offset(voice: u8) -> u8 {
    (voice / 3) * 8 + voice % 3
}

/// Where the translated output goes.
///
/// The player never touches files itself; every register write and every
/// advance of the playback clock flows through this pair of callbacks.
pub trait OplSink {
    /// Set OPL register `reg` to `value`.
    fn write_register(&mut self, reg: u8, value: u8);

    /// Advance the playback clock by `millis` milliseconds before the next
    /// register write takes effect.
    fn advance_clock(&mut self, millis: u16);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_offsets() {
        assert_eq!(operator_offset(0), 0x00);
        assert_eq!(operator_offset(4), 0x09);
        assert_eq!(operator_offset(8), 0x12);
    }
}
