//! CMF playback engine: MIDI event decoding and OPL voice allocation

pub mod freq;

use crate::cmf::{load_bank, CmfHeader, CmfReader, Instrument, BANK_SIZE};
use crate::error::{Error, Result};
use crate::opl::{self, OplSink};
use log::{debug, info, warn};

/// Number of logical MIDI channels.
pub const MIDI_CHANNELS: usize = 16;
/// Number of hardware OPL voices.
pub const OPL_VOICES: usize = 9;
/// Voices left for melodic notes while rhythm mode is active.
const MELODIC_VOICES_RHYTHM: usize = 6;

/// Per-MIDI-channel state.
#[derive(Debug, Clone, Copy)]
struct LogicalChannel {
    /// Instrument index currently selected on this channel.
    patch: u8,
    /// Current 14-bit pitch-bend value (8192 = center).
    pitch_bend: u16,
}

impl Default for LogicalChannel {
    fn default() -> Self {
        Self {
            patch: 0,
            pitch_bend: freq::PITCH_BEND_CENTER,
        }
    }
}

/// Per-OPL-voice state.
#[derive(Debug, Clone, Copy, Default)]
struct Voice {
    /// When the note started (monotonic counter; 0 = voice free). The voice
    /// holding the smallest non-zero value is stolen first.
    note_start: u32,
    /// MIDI note currently sounding on this voice.
    note: u8,
    /// MIDI channel the note came from.
    channel: u8,
    /// Instrument last loaded onto this voice.
    patch: Option<u8>,
}

/// Which fixed OPL voice a percussive MIDI channel plays on.
///
/// Bass drum gets voice 6 to itself; snare/hihat share voice 7's operators
/// and tom/cymbal share voice 8's.
fn perc_voice(channel: u8) -> u8 {
    match channel {
        11 => 6, // bass drum
        12 => 7, // snare drum
        13 => 8, // tom tom
        14 => 8, // top cymbal
        15 => 7, // hihat
        _ => {
            warn!("channel {channel} is not a percussion channel");
            0
        }
    }
}

/// Translates a CMF's MIDI stream into timed OPL register writes.
///
/// Construction parses the header; [`init`](Player::init) loads the
/// instrument bank and emits the startup register writes; each
/// [`tick`](Player::tick) then processes one delay plus one MIDI event,
/// pushing output through the supplied [`OplSink`].
pub struct Player<'a> {
    data: CmfReader<'a>,
    header: CmfHeader,
    instruments: [Instrument; BANK_SIZE],
    /// Rhythm-mode flag; changes the voice pool and percussion routing.
    percussive: bool,
    /// Last value written to each OPL register, for read-modify-write.
    regs: [u8; 256],
    /// Whole-song transpose in 1/128-semitone steps.
    transpose: i16,
    /// Previous status byte, for running-status events.
    prev_status: u8,
    /// Monotonic note counter feeding `Voice::note_start`.
    note_counter: u32,
    midi: [LogicalChannel; MIDI_CHANNELS],
    voices: [Voice; OPL_VOICES],
    rhythm_presets: bool,
}

impl<'a> Player<'a> {
    /// Parse the CMF header and set up an idle player.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut reader = CmfReader::new(data);
        let header = CmfHeader::parse(&mut reader)?;
        Ok(Self {
            data: reader,
            header,
            instruments: [Instrument::default(); BANK_SIZE],
            percussive: false,
            regs: [0; 256],
            transpose: 0,
            prev_status: 0,
            note_counter: 0,
            midi: [LogicalChannel::default(); MIDI_CHANNELS],
            voices: [Voice::default(); OPL_VOICES],
            rhythm_presets: true,
        })
    }

    pub fn header(&self) -> &CmfHeader {
        &self.header
    }

    /// Enable or disable the fixed hihat/cymbal/bass frequency presets
    /// written during [`init`](Player::init). Some songs (kiloblaster)
    /// need them, others (Word Rescue's theme) sound worse with them.
    pub fn set_rhythm_presets(&mut self, enabled: bool) {
        self.rhythm_presets = enabled;
    }

    /// Number of voices currently sounding a note.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.note_start != 0).count()
    }

    /// Load the instrument bank and emit the startup register writes, then
    /// seek to the start of the music data.
    pub fn init(&mut self, sink: &mut dyn OplSink) -> Result<()> {
        self.data.seek(usize::from(self.header.instrument_block_offset));
        self.instruments = load_bank(&mut self.data, self.header.num_instruments)?;
        info!("found {} instrument definitions", self.header.num_instruments);

        // The last five declared instruments drive the rhythm voices; load
        // them up front so percussion sounds right from its first note.
        if self.header.num_instruments >= 5 {
            self.percussive = true;
            let first = self.header.num_instruments - 5;
            for (i, channel) in (11u8..16).enumerate() {
                let patch = (first + i as u16) as u8;
                self.midi[usize::from(channel)].patch = patch;
                debug!("presetting MIDI channel {channel} to patch {patch}");
                self.change_instrument(perc_voice(channel), channel, patch, sink);
            }
            self.percussive = false;
        }

        self.data.seek(usize::from(self.header.music_offset));

        // Enable waveform select, make sure CSM/keyboard split is off
        // (Creative's player does both).
        self.set_reg(sink, 0x01, 0x20);
        self.set_reg(sink, 0x08, 0x00);

        if self.rhythm_presets {
            // Fixed frequencies for the rhythm voices. Songs cannot retune
            // the hihat or cymbal, and some never write an initial value
            // at all.
            self.set_reg(sink, opl::BASE_FNUM_L + 8, (514 & 0xFF) as u8);
            self.set_reg(sink, opl::BASE_KEYON_FREQ + 8, (1 << 2) | (514 >> 8) as u8);
            self.set_reg(sink, opl::BASE_FNUM_L + 7, (509 & 0xFF) as u8);
            self.set_reg(sink, opl::BASE_KEYON_FREQ + 7, (2 << 2) | (509 >> 8) as u8);
            self.set_reg(sink, opl::BASE_FNUM_L + 6, (432 & 0xFF) as u8);
            self.set_reg(sink, opl::BASE_KEYON_FREQ + 6, (2 << 2) | (432 >> 8) as u8);
        }

        // The stock player always amplifies AM+VIB depth; controller 0x63
        // can switch it back off mid-song.
        self.set_reg(sink, opl::BASE_RHYTHM, 0xC0);

        self.prev_status = 0;
        Ok(())
    }

    /// Process one delay and one MIDI event.
    ///
    /// Returns `Ok(true)` while more events remain, `Ok(false)` once the
    /// track has ended (end-of-track meta event, real-time stop, or plain
    /// end of data). A stream that turns out to be malformed mid-event
    /// surfaces as [`Error::CorruptStream`]; the host may treat that as a
    /// premature end of song.
    pub fn tick(&mut self, sink: &mut dyn OplSink) -> Result<bool> {
        if self.data.is_eof() {
            return Ok(false);
        }
        self.step(sink).map_err(|e| match e {
            Error::TruncatedInput { offset } => Error::CorruptStream {
                status: self.prev_status,
                offset,
            },
            other => other,
        })
    }

    fn step(&mut self, sink: &mut dyn OplSink) -> Result<bool> {
        let delta = self.data.read_midi_number()?;
        if delta != 0 {
            let millis =
                u64::from(delta) * 1000 / u64::from(self.header.ticks_per_second.max(1));
            sink.advance_clock(millis.min(u64::from(u16::MAX)) as u16);
        }

        let mut status = self.data.read_u8()?;
        if status & 0x80 != 0 {
            self.prev_status = status;
        } else {
            // Running status: this byte is really event data
            self.data.unread_byte();
            status = self.prev_status;
        }
        if status & 0x80 == 0 {
            return Err(Error::CorruptStream {
                status,
                offset: self.data.position(),
            });
        }

        let channel = status & 0x0F;
        match status & 0xF0 {
            0x80 => {
                let note = self.data.read_u8()?;
                let _velocity = self.data.read_u8()?;
                self.note_off(channel, note, sink);
            }
            0x90 => {
                let note = self.data.read_u8()?;
                let velocity = self.data.read_u8()?;
                if velocity != 0 {
                    self.note_on(channel, note, velocity, sink);
                } else {
                    // Note-on with zero velocity is a note-off
                    self.note_off(channel, note, sink);
                }
            }
            0xA0 => {
                let _note = self.data.read_u8()?;
                let _pressure = self.data.read_u8()?;
                warn!("polyphonic key pressure not implemented");
            }
            0xB0 => {
                let controller = self.data.read_u8()?;
                let value = self.data.read_u8()?;
                self.controller(controller, value, sink);
            }
            0xC0 => {
                let patch = self.data.read_u8()?;
                self.midi[usize::from(channel)].patch = patch;
                debug!("MIDI channel {channel} now uses patch {patch}");
            }
            0xD0 => {
                let _pressure = self.data.read_u8()?;
                warn!("channel pressure not implemented");
            }
            0xE0 => {
                let lsb = self.data.read_u8()?;
                let msb = self.data.read_u8()?;
                let value = (u16::from(msb & 0x7F) << 7) | u16::from(lsb & 0x7F);
                self.midi[usize::from(channel)].pitch_bend = value;
                debug!("channel {channel} pitch-bent to {value}");
            }
            0xF0 => match status {
                0xF0 => {
                    // Sysex: swallow until a byte with the high bit set
                    // (the terminating EOX) comes past
                    loop {
                        let next = self.data.read_u8()?;
                        if next & 0x80 != 0 {
                            break;
                        }
                    }
                    debug!("skipped sysex message");
                }
                0xF1 => self.data.skip(1),
                0xF2 => self.data.skip(2),
                0xF3 => {
                    self.data.skip(1);
                    warn!("song select not implemented");
                }
                0xF6 | 0xF7 | 0xF8 | 0xFA | 0xFB | 0xFE => {}
                0xFC => {
                    info!("received real-time stop");
                    return Ok(false);
                }
                0xFF => {
                    let event = self.data.read_u8()?;
                    if event == 0x2F {
                        info!("reached MIDI end-of-track");
                        return Ok(false);
                    }
                    warn!("unknown MIDI meta-event {event:#04x}");
                }
                _ => warn!("unknown MIDI system command {status:#04x}"),
            },
            _ => warn!("unknown MIDI command {status:#04x}"),
        }

        Ok(true)
    }

    /// Write an OPL register through the sink, keeping the mirror current.
    fn set_reg(&mut self, sink: &mut dyn OplSink, reg: u8, value: u8) {
        sink.write_register(reg, value);
        self.regs[usize::from(reg)] = value;
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8, sink: &mut dyn OplSink) {
        let (block, fnum) = freq::midi_to_opl(
            note,
            self.midi[usize::from(channel)].pitch_bend,
            self.transpose,
        );

        if channel > 10 && self.percussive {
            let voice = perc_voice(channel);

            // The rhythm voices share physical operators, so reload the
            // patch every time instead of working out which half changed.
            self.change_instrument(voice, channel, self.midi[usize::from(channel)].patch, sink);

            // Approximate attenuation curve; Creative's player maps
            // velocity 0x7B..0x7F straight to full volume.
            let mut level = 0x25 - f64::from(u32::from(velocity) * 16).sqrt() as i32;
            if velocity > 0x7B {
                level = 0;
            }
            let level = level.clamp(0, 0x3F) as u8;

            let mut level_reg = opl::BASE_SCAL_LEVL + opl::operator_offset(voice);
            if channel == 11 {
                level_reg += 3; // bass drum takes its volume on the carrier
            }
            self.set_reg(
                sink,
                level_reg,
                (self.regs[usize::from(level_reg)] & !0x3F) | level,
            );

            // Some songs rely on the frequency being set even for the
            // cymbal and hihat, others on it being left alone (Vinyl vs
            // Kiloblaster); the former is the lesser evil.
            self.set_reg(sink, opl::BASE_FNUM_L + voice, (fnum & 0xFF) as u8);
            self.set_reg(
                sink,
                opl::BASE_KEYON_FREQ + voice,
                (block << 2) | ((fnum >> 8) & 0x03) as u8,
            );

            // The OPL cannot play polyphonic percussion: drop the rhythm
            // bit first if the drum is still sounding, then raise it to
            // retrigger.
            let bit = 1 << (15 - channel);
            if self.regs[usize::from(opl::BASE_RHYTHM)] & bit != 0 {
                self.set_reg(
                    sink,
                    opl::BASE_RHYTHM,
                    self.regs[usize::from(opl::BASE_RHYTHM)] & !bit,
                );
            }
            self.set_reg(
                sink,
                opl::BASE_RHYTHM,
                self.regs[usize::from(opl::BASE_RHYTHM)] | bit,
            );

            self.note_counter += 1;
            let v = &mut self.voices[usize::from(voice)];
            v.note_start = self.note_counter;
            v.channel = channel;
            v.note = note;
        } else {
            let wanted = self.midi[usize::from(channel)].patch;
            let pool = self.melodic_pool();

            // Search free voices from the top; keep going in case a free
            // voice already loaded with the wanted instrument turns up.
            let mut chosen = None;
            for i in (0..pool).rev() {
                if self.voices[i].note_start == 0 {
                    chosen = Some(i);
                    if self.voices[i].patch == Some(wanted) {
                        break;
                    }
                }
            }

            let voice = chosen.unwrap_or_else(|| {
                // All voices busy: steal the one sounding longest
                let mut oldest = 0;
                for i in 1..pool {
                    if self.voices[i].note_start < self.voices[oldest].note_start {
                        oldest = i;
                    }
                }
                warn!("too many polyphonic notes, cutting note on voice {oldest}");
                oldest
            });

            // Rebinding costs six register writes per operator; skip it
            // when the voice already carries the instrument.
            if self.voices[voice].patch != Some(wanted) {
                self.change_instrument(voice as u8, channel, wanted, sink);
            }

            self.note_counter += 1;
            self.voices[voice].note_start = self.note_counter;
            self.voices[voice].channel = channel;
            self.voices[voice].note = note;

            self.set_reg(sink, opl::BASE_FNUM_L + voice as u8, (fnum & 0xFF) as u8);
            self.set_reg(
                sink,
                opl::BASE_KEYON_FREQ + voice as u8,
                opl::KEYON_BIT | (block << 2) | ((fnum >> 8) & 0x03) as u8,
            );
        }
    }

    fn note_off(&mut self, channel: u8, note: u8, sink: &mut dyn OplSink) {
        if channel > 10 && self.percussive {
            let voice = usize::from(perc_voice(channel));
            if self.voices[voice].note != note {
                return; // a different note owns the drum by now
            }
            self.set_reg(
                sink,
                opl::BASE_RHYTHM,
                self.regs[usize::from(opl::BASE_RHYTHM)] & !(1 << (15 - channel)),
            );
            self.voices[voice].note_start = 0;
        } else {
            for i in 0..self.melodic_pool() {
                if self.voices[i].channel == channel
                    && self.voices[i].note == note
                    && self.voices[i].note_start != 0
                {
                    self.voices[i].note_start = 0;
                    let reg = opl::BASE_KEYON_FREQ + i as u8;
                    self.set_reg(sink, reg, self.regs[usize::from(reg)] & !opl::KEYON_BIT);
                    return;
                }
            }
            // Already released, or the voice was stolen in the meantime
            debug!("note-off for note {note} on channel {channel} matched no voice");
        }
    }

    fn melodic_pool(&self) -> usize {
        if self.percussive {
            MELODIC_VOICES_RHYTHM
        } else {
            OPL_VOICES
        }
    }

    /// Load an instrument onto an OPL voice.
    ///
    /// Melodic voices take both operators plus the connection byte. The
    /// rhythm voices only get the operator cells their drum actually owns,
    /// to avoid trampling the drum sharing the other half of the voice.
    fn change_instrument(
        &mut self,
        voice: u8,
        midi_channel: u8,
        patch: u8,
        sink: &mut dyn OplSink,
    ) {
        debug!("OPL voice {voice} (MIDI channel {midi_channel}) -> instrument {patch}");
        if midi_channel > 10 && self.percussive {
            match midi_channel {
                11 => {
                    // bass drum: voice 6, both operators
                    self.write_operator(6, 0, 0, patch, sink);
                    self.write_operator(6, 1, 1, patch, sink);
                }
                12 => self.write_operator(7, 0, 1, patch, sink), // snare: carrier
                13 => self.write_operator(8, 0, 0, patch, sink), // tom: modulator
                14 => self.write_operator(8, 0, 1, patch, sink), // cymbal: carrier
                15 => self.write_operator(7, 0, 0, patch, sink), // hihat: modulator
                _ => warn!("channel {midi_channel} is neither melodic nor percussive"),
            }
        } else {
            self.write_operator(voice, 0, 0, patch, sink);
            self.write_operator(voice, 1, 1, patch, sink);
        }
        self.voices[usize::from(voice)].patch = Some(patch);
    }

    /// Write one operator's five timbre registers, sourcing from operator
    /// `source` of the patch and targeting operator cell `dest` of the
    /// voice (0 = modulator, 1 = carrier).
    fn write_operator(
        &mut self,
        voice: u8,
        source: usize,
        dest: usize,
        patch: u8,
        sink: &mut dyn OplSink,
    ) {
        let mut offset = opl::operator_offset(voice);
        if dest != 0 {
            offset += 3;
        }

        let inst = self.instruments[usize::from(patch)];
        let op = *inst.operator(source);
        self.set_reg(sink, opl::BASE_CHAR_MULT + offset, op.char_mult);
        self.set_reg(sink, opl::BASE_SCAL_LEVL + offset, op.scaling_output);
        self.set_reg(sink, opl::BASE_ATCK_DCAY + offset, op.attack_decay);
        self.set_reg(sink, opl::BASE_SUST_RLSE + offset, op.sustain_release);
        self.set_reg(sink, opl::BASE_WAVE + offset, op.wave_select);
        self.set_reg(sink, opl::BASE_FEED_CONN + voice, inst.connection);
    }

    fn controller(&mut self, controller: u8, value: u8, sink: &mut dyn OplSink) {
        match controller {
            0x63 => {
                // Non-standard CMF extension: AM+VIB depth switch (the
                // stock player keeps both permanently on). 1 = VIB,
                // 2 = AM, 3 = both.
                let bd = self.regs[usize::from(opl::BASE_RHYTHM)];
                if value != 0 {
                    self.set_reg(sink, opl::BASE_RHYTHM, (bd & !0xC0) | ((value & 0x03) << 6));
                } else {
                    self.set_reg(sink, opl::BASE_RHYTHM, bd & !0xC0);
                }
                debug!(
                    "AM+VIB depth change: AM {}, VIB {}",
                    self.regs[usize::from(opl::BASE_RHYTHM)] & 0x80 != 0,
                    self.regs[usize::from(opl::BASE_RHYTHM)] & 0x40 != 0
                );
            }
            0x66 => debug!("song marker {value:#04x}"),
            0x67 => {
                self.percussive = value != 0;
                let bd = self.regs[usize::from(opl::BASE_RHYTHM)];
                if self.percussive {
                    self.set_reg(sink, opl::BASE_RHYTHM, bd | opl::RHYTHM_MODE_BIT);
                } else {
                    self.set_reg(sink, opl::BASE_RHYTHM, bd & !opl::RHYTHM_MODE_BIT);
                }
                debug!("rhythm mode {}", if self.percussive { "on" } else { "off" });
            }
            0x68 => {
                self.transpose = i16::from(value);
                debug!("transposing all notes up by {value}/128 semitones");
            }
            0x69 => {
                self.transpose = -i16::from(value);
                debug!("transposing all notes down by {value}/128 semitones");
            }
            _ => warn!("unsupported MIDI controller {controller:#04x}, ignoring"),
        }
    }
}
