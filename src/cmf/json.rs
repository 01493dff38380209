//! JSON serialization types for CMF data

use super::header::{self, CmfHeader};
use super::instrument::Instrument;
use serde::Serialize;

/// Top-level JSON structure for a CMF file
#[derive(Debug, Clone, Serialize)]
pub struct CmfJson {
    /// CMF version as a string (e.g., "1.1")
    pub version: String,
    /// Header information
    pub header: CmfHeaderJson,
    /// Text tags (if present)
    #[serde(skip_serializing_if = "TagsJson::is_empty")]
    pub tags: TagsJson,
    /// Instrument bank (all 128 slots)
    pub instruments: Vec<InstrumentJson>,
}

/// JSON representation of the CMF header
#[derive(Debug, Clone, Serialize)]
pub struct CmfHeaderJson {
    pub instrument_block_offset: u16,
    pub music_offset: u16,
    pub ticks_per_quarter_note: u16,
    pub ticks_per_second: u16,
    /// Declared (non-default) instrument count
    pub num_instruments: u16,
    #[serde(skip_serializing_if = "is_zero")]
    pub tempo: u16,
    /// MIDI channel usage flags
    pub channels_in_use: Vec<u8>,
}

fn is_zero(v: &u16) -> bool {
    *v == 0
}

/// JSON representation of the header text tags
#[derive(Debug, Clone, Serialize)]
pub struct TagsJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl TagsJson {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.composer.is_none() && self.remarks.is_none()
    }
}

/// JSON representation of one instrument slot
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentJson {
    pub index: usize,
    /// True for slots filled from the built-in default table
    #[serde(skip_serializing_if = "is_false")]
    pub default: bool,
    pub modulator: OperatorJson,
    pub carrier: OperatorJson,
    pub connection: u8,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// JSON representation of one operator cell
#[derive(Debug, Clone, Serialize)]
pub struct OperatorJson {
    pub char_mult: u8,
    pub scaling_output: u8,
    pub attack_decay: u8,
    pub sustain_release: u8,
    pub wave_select: u8,
}

impl CmfJson {
    /// Build the JSON model from a parsed header, the raw file image (for
    /// the tag strings) and a loaded instrument bank.
    pub fn new(cmf_header: &CmfHeader, data: &[u8], instruments: &[Instrument]) -> Self {
        Self {
            version: format!(
                "{}.{}",
                cmf_header.version >> 8,
                cmf_header.version & 0xFF
            ),
            header: CmfHeaderJson {
                instrument_block_offset: cmf_header.instrument_block_offset,
                music_offset: cmf_header.music_offset,
                ticks_per_quarter_note: cmf_header.ticks_per_quarter_note,
                ticks_per_second: cmf_header.ticks_per_second,
                num_instruments: cmf_header.num_instruments,
                tempo: cmf_header.tempo,
                channels_in_use: cmf_header.channels_in_use.to_vec(),
            },
            tags: TagsJson {
                title: header::read_tag(data, cmf_header.tag_offset_title),
                composer: header::read_tag(data, cmf_header.tag_offset_composer),
                remarks: header::read_tag(data, cmf_header.tag_offset_remarks),
            },
            instruments: instruments
                .iter()
                .enumerate()
                .map(|(index, inst)| InstrumentJson {
                    index,
                    default: index >= usize::from(cmf_header.num_instruments),
                    modulator: operator_json(inst, 0),
                    carrier: operator_json(inst, 1),
                    connection: inst.connection,
                })
                .collect(),
        }
    }
}

fn operator_json(inst: &Instrument, index: usize) -> OperatorJson {
    let op = inst.operator(index);
    OperatorJson {
        char_mult: op.char_mult,
        scaling_output: op.scaling_output,
        attack_decay: op.attack_decay,
        sustain_release: op.sustain_release,
        wave_select: op.wave_select,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmf::instrument::DEFAULT_PATCHES;

    #[test]
    fn test_json_model() {
        let header = CmfHeader {
            version: 0x0101,
            instrument_block_offset: 40,
            music_offset: 100,
            ticks_per_quarter_note: 120,
            ticks_per_second: 560,
            tag_offset_title: 0,
            tag_offset_composer: 0,
            tag_offset_remarks: 0,
            channels_in_use: [0; 16],
            num_instruments: 0,
            tempo: 0,
        };
        let bank: Vec<Instrument> = (0..128).map(|i| DEFAULT_PATCHES[i % 16]).collect();
        let json = CmfJson::new(&header, &[], &bank);
        assert_eq!(json.version, "1.1");
        assert_eq!(json.instruments.len(), 128);
        assert!(json.instruments[0].default);
        assert_eq!(json.instruments[0].connection, 0x06);

        // Must serialize cleanly
        serde_json::to_string(&json).unwrap();
    }
}
