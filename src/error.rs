use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Input is not a CMF file (CTMF signature missing)")]
    BadMagic,

    #[error("CMF version {0:#06x} is not v1.0 or v1.1")]
    UnsupportedVersion(u16),

    #[error("Input truncated at offset {offset:#x}")]
    TruncatedInput { offset: usize },

    #[error("Corrupt MIDI stream: invalid event {status:#04x} at offset {offset:#x}")]
    CorruptStream { status: u8, offset: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
