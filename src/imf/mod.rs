//! id Software Music Format output

pub mod writer;

pub use writer::{ImfType, ImfWriter};
