//! Creative Music File format support

pub mod header;
pub mod instrument;
pub mod json;
pub mod reader;

pub use header::CmfHeader;
pub use instrument::{load_bank, Instrument, Operator, BANK_SIZE, DEFAULT_PATCHES};
pub use json::CmfJson;
pub use reader::CmfReader;
