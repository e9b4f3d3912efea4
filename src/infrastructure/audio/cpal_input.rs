//! Cross-platform audio input using cpal
//!
//! Opens the requested (or default) input device at the highest native
//! sample rate it offers, downmixes to mono f32, and moves each device
//! callback's buffer into an unbounded channel. The callback never blocks:
//! persistence happens on the consumer side.
//!
//! The stream is owned by a background thread because cpal::Stream is not
//! Send; the thread polls the stop flag and releases the device on every
//! exit path.

use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::ports::{AudioInput, CaptureError, InputHandle, InputSession};

/// Audio input adapter backed by cpal.
pub struct CpalAudioInput;

impl CpalAudioInput {
    /// Pick the input device: a name match for the hint, else the system
    /// default.
    fn find_device(hint: Option<&str>) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        if let Some(hint) = hint {
            let wanted = hint.to_lowercase();
            let mut devices = host
                .input_devices()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
            return devices
                .find(|d| {
                    d.name()
                        .map(|n| n.to_lowercase().contains(&wanted))
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    CaptureError::DeviceUnavailable(format!(
                        "no input device matching \"{}\"",
                        hint
                    ))
                });
        }
        host.default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".into()))
    }

    /// Get a suitable input configuration: i16 or f32 only, highest native
    /// sample rate, fewer channels winning ties.
    fn best_config(device: &cpal::Device) -> Result<(StreamConfig, SampleFormat), CaptureError> {
        let supported_configs = device
            .supported_input_configs()
            .map_err(|e| CaptureError::StartFailed(format!("Failed to get configs: {}", e)))?;

        let mut best_config: Option<cpal::SupportedStreamConfigRange> = None;

        for config in supported_configs {
            if config.sample_format() != SampleFormat::I16
                && config.sample_format() != SampleFormat::F32
            {
                continue;
            }

            let is_better = match &best_config {
                None => true,
                Some(current) => {
                    let higher_rate = config.max_sample_rate() > current.max_sample_rate();
                    let fewer_channels = config.max_sample_rate() == current.max_sample_rate()
                        && config.channels() < current.channels();
                    higher_rate || fewer_channels
                }
            };
            if is_better {
                best_config = Some(config);
            }
        }

        let config_range = best_config.ok_or(CaptureError::StartFailed(
            "No suitable config found".into(),
        ))?;

        let sample_rate = config_range.max_sample_rate();
        let sample_format = config_range.sample_format();
        let config = StreamConfig {
            channels: config_range.channels(),
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        Ok((config, sample_format))
    }

    /// Mix interleaved f32 down to mono by channel average.
    fn mix_to_mono(data: &[f32], channels: u16) -> Vec<f32> {
        if channels <= 1 {
            return data.to_vec();
        }
        data.chunks(channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Mix interleaved i16 down to normalized mono f32.
    fn mix_i16_to_mono(data: &[i16], channels: u16) -> Vec<f32> {
        let step = channels.max(1) as usize;
        data.chunks(step)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum as f32 / step as f32) / 32768.0
            })
            .collect()
    }
}

#[async_trait]
impl AudioInput for CpalAudioInput {
    async fn open(&self, device_hint: Option<&str>) -> Result<InputSession, CaptureError> {
        let hint = device_hint.map(str::to_string);
        let (segment_tx, segment_rx) = mpsc::unbounded_channel::<Vec<f32>>();
        let handle = InputHandle::new();
        let thread_handle = handle.clone();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32, CaptureError>>();

        std::thread::spawn(move || {
            let setup = (|| {
                let device = CpalAudioInput::find_device(hint.as_deref())?;
                let (config, sample_format) = CpalAudioInput::best_config(&device)?;
                let sample_rate = config.sample_rate.0;
                let channels = config.channels;

                if let Ok(name) = device.name() {
                    info!(device = %name, sample_rate, channels, "input device opened");
                }

                let stream = match sample_format {
                    SampleFormat::F32 => {
                        let tx = segment_tx.clone();
                        device
                            .build_input_stream(
                                &config,
                                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                                    // fire and forget: a closed channel just
                                    // means capture already stopped
                                    let _ = tx.send(CpalAudioInput::mix_to_mono(data, channels));
                                },
                                |err| warn!(error = %err, "audio stream error"),
                                None,
                            )
                            .map_err(|e| CaptureError::StartFailed(e.to_string()))?
                    }

                    SampleFormat::I16 => {
                        let tx = segment_tx.clone();
                        device
                            .build_input_stream(
                                &config,
                                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                                    let _ =
                                        tx.send(CpalAudioInput::mix_i16_to_mono(data, channels));
                                },
                                |err| warn!(error = %err, "audio stream error"),
                                None,
                            )
                            .map_err(|e| CaptureError::StartFailed(e.to_string()))?
                    }

                    _ => {
                        return Err(CaptureError::StartFailed(
                            "Unsupported sample format".into(),
                        ))
                    }
                };

                stream
                    .play()
                    .map_err(|e| CaptureError::StartFailed(e.to_string()))?;

                Ok((stream, sample_rate))
            })();

            match setup {
                Ok((stream, sample_rate)) => {
                    let _ = ready_tx.send(Ok(sample_rate));
                    while !thread_handle.is_stopped() {
                        std::thread::sleep(Duration::from_millis(100));
                    }
                    // Dropping the stream releases the device; dropping the
                    // sender closes the segment channel behind it.
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| CaptureError::StartFailed(format!("input task: {}", e)))?
            .map_err(|_| CaptureError::StartFailed("input thread exited early".into()))?;
        let sample_rate = ready?;

        Ok(InputSession {
            sample_rate,
            segments: segment_rx,
            handle,
        })
    }
}
