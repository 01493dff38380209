//! MIDI note to OPL block/F-number conversion

use log::warn;

/// Pitch-bend value meaning "no bend" (14-bit range, 0..=16383).
pub const PITCH_BEND_CENTER: u16 = 8192;

/// Convert a MIDI note into the OPL block/F-number pair.
///
/// `pitch_bend` is the raw 14-bit MIDI value (8192 = center, one semitone
/// either way); `transpose` shifts the whole song in 1/128-semitone steps.
///
/// Note 42 maps to F-number 485 in block 2 (92.506 Hz), matching the
/// Creative reference player.
pub fn midi_to_opl(note: u8, pitch_bend: u16, transpose: i16) -> (u8, u16) {
    let mut block = note / 12;
    if block > 1 {
        block -= 1; // keep the same octave placement as the Creative player
    }

    let bend = (f64::from(pitch_bend) - f64::from(PITCH_BEND_CENTER))
        / f64::from(PITCH_BEND_CENTER);
    let semitones = f64::from(note) + bend + f64::from(transpose) / 128.0 - 9.0;
    let freq = (semitones / 12.0 - (f64::from(block) - 20.0)).exp2() * 440.0 / 32.0 / 50000.0;
    let fnum = (freq + 0.5) as u32;
    if fnum > 1023 {
        warn!("note {note} is out of the OPL frequency range (F-number {fnum})");
    }

    (block, fnum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_note_42() {
        assert_eq!(midi_to_opl(42, PITCH_BEND_CENTER, 0), (2, 485));
    }

    #[test]
    fn test_middle_c() {
        assert_eq!(midi_to_opl(60, PITCH_BEND_CENTER, 0), (4, 343));
    }

    #[test]
    fn test_block_placement() {
        // Blocks 0 and 1 are used as-is, higher ones are pulled down by one
        assert_eq!(midi_to_opl(11, PITCH_BEND_CENTER, 0).0, 0);
        assert_eq!(midi_to_opl(13, PITCH_BEND_CENTER, 0).0, 1);
        assert_eq!(midi_to_opl(24, PITCH_BEND_CENTER, 0).0, 1);
        assert_eq!(midi_to_opl(36, PITCH_BEND_CENTER, 0).0, 2);
    }

    #[test]
    fn test_pitch_bend_shifts_fnum() {
        let (_, center) = midi_to_opl(60, PITCH_BEND_CENTER, 0);
        let (_, up) = midi_to_opl(60, 16383, 0);
        let (_, down) = midi_to_opl(60, 0, 0);
        assert!(up > center);
        assert!(down < center);
    }

    #[test]
    fn test_transpose_shifts_fnum() {
        let (_, center) = midi_to_opl(60, PITCH_BEND_CENTER, 0);
        let (block, full_up) = midi_to_opl(60, PITCH_BEND_CENTER, 128);
        // A full 128/128 transpose is one semitone up
        let (next_block, next) = midi_to_opl(61, PITCH_BEND_CENTER, 0);
        assert!(full_up > center);
        assert_eq!(block, 4);
        // Note 61 lands in the same block, so the F-numbers must agree
        assert_eq!(next_block, 4);
        assert_eq!(full_up, next);
    }
}
