pub mod cmf;
pub mod error;
pub mod imf;
pub mod opl;
pub mod player;

pub use error::Error;
pub use player::Player;
