//! Script execution, deciphering and player orchestration

pub mod cipher;
pub mod engine;
pub mod player;

pub use cipher::*;
pub use engine::*;
pub use player::*;
