pub mod player;
pub mod synth;

pub use player::{AudioError, AudioPlayer};
