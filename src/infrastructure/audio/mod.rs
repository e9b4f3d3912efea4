//! Audio input adapters

pub mod cpal_input;

pub use cpal_input::CpalAudioInput;
