//! Dedicated encoder thread
//!
//! Runs each encoder session on its own OS thread so a slow compression
//! pass cannot stall capture or the async runtime. Commands and events
//! move over channels; sample and byte buffers transfer ownership, nothing
//! is shared.

use tokio::sync::mpsc;
use tracing::debug;

use crate::application::ports::{
    EncoderCommand, EncoderEvent, EncoderSession, EncoderSpawner,
};

use super::opus_stream::OpusStreamEncoder;

/// Spawns one thread per encoder session.
pub struct ThreadedOpusSpawner;

impl EncoderSpawner for ThreadedOpusSpawner {
    fn spawn(&self) -> EncoderSession {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || run_session(cmd_rx, event_tx));

        EncoderSession {
            commands: cmd_tx,
            events: event_rx,
        }
    }
}

fn run_session(
    mut commands: mpsc::UnboundedReceiver<EncoderCommand>,
    events: mpsc::UnboundedSender<EncoderEvent>,
) {
    let mut encoder: Option<OpusStreamEncoder> = None;

    while let Some(command) = commands.blocking_recv() {
        match command {
            EncoderCommand::Init(init) => {
                if encoder.is_some() {
                    let _ = events.send(EncoderEvent::Error("init received twice".into()));
                    return;
                }
                match OpusStreamEncoder::new(
                    init.sample_rate,
                    init.bitrate_kbps,
                    init.channels,
                    init.stream_tag,
                ) {
                    Ok(e) => {
                        debug!(
                            sample_rate = init.sample_rate,
                            bitrate_kbps = init.bitrate_kbps,
                            "encoder session initialized"
                        );
                        encoder = Some(e);
                    }
                    Err(e) => {
                        let _ = events.send(EncoderEvent::Error(e.to_string()));
                        return;
                    }
                }
            }

            EncoderCommand::Encode(pcm) => {
                let Some(active) = encoder.as_mut() else {
                    let _ = events.send(EncoderEvent::Error("encode before init".into()));
                    return;
                };
                match active.feed(&pcm) {
                    Ok(payloads) => {
                        for payload in payloads {
                            if events.send(EncoderEvent::Data(payload)).is_err() {
                                // Consumer went away; stop encoding.
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = events.send(EncoderEvent::Error(e.to_string()));
                        return;
                    }
                }
            }

            EncoderCommand::Finish => {
                let Some(active) = encoder.take() else {
                    let _ = events.send(EncoderEvent::Error("finish before init".into()));
                    return;
                };
                match active.finish() {
                    Ok((payloads, digest, total_bytes)) => {
                        for payload in payloads {
                            if events.send(EncoderEvent::Data(payload)).is_err() {
                                return;
                            }
                        }
                        let _ = events.send(EncoderEvent::Done {
                            digest,
                            total_bytes,
                        });
                    }
                    Err(e) => {
                        let _ = events.send(EncoderEvent::Error(e.to_string()));
                    }
                }
                return;
            }
        }
    }
}
