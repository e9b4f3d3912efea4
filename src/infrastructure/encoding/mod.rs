//! Streaming encoder adapters

pub mod opus_stream;
pub mod worker;

pub use opus_stream::{EncodingError, OpusStreamEncoder};
pub use worker::ThreadedOpusSpawner;
