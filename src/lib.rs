//! Storycap - resumable audio clip capture, encode, and upload
//!
//! This crate records audio from the microphone into durable,
//! sequence-numbered PCM segments, compresses finished clips to Ogg/Opus
//! on an isolated encoder thread, and transfers them to a remote endpoint
//! or paired device with a checkpointed, resumable upload protocol.
//!
//! # Architecture
//!
//! The crate follows hexagonal (ports & adapters) architecture:
//!
//! - **Domain**: Clips, segments, frames, checkpoints, and their invariants
//! - **Application**: Use cases (capture, encode, upload) and port interfaces (traits)
//! - **Infrastructure**: Adapter implementations (cpal, Opus/Ogg, sled, reqwest, filesystem)
//! - **CLI**: Command-line interface and output formatting

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
