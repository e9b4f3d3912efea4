//! Streaming Opus encoder with an Ogg container
//!
//! Incremental counterpart to a one-shot encode: PCM is buffered to the
//! 20ms codec frame size, each completed frame is written as its own Ogg
//! page, and the bytes of every emitted page feed a running MD5 digest.
//! Chunk boundaries on the input need never align with codec frames.
//!
//! The Ogg stream serial is supplied by the caller (derived from the clip
//! id) so encoding the same samples for the same clip twice produces
//! byte-identical output.

use std::cell::RefCell;
use std::rc::Rc;

use ogg::writing::{PacketWriteEndInfo, PacketWriter};

use super::super::resample::float_to_i16;

/// Codec frame duration in milliseconds.
pub const FRAME_MILLIS: u32 = 20;

/// Granule positions count 48kHz samples regardless of the input rate.
const GRANULE_STEP: u64 = 960;

/// Max Opus packet size
const MAX_PACKET: usize = 4000;

/// Encoding errors
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("Unsupported sample rate: {0}")]
    SampleRate(u32),

    #[error("Unsupported channel count: {0}")]
    Channels(u16),

    #[error("Opus encoder setup failed: {0}")]
    Setup(String),

    #[error("Opus encoding failed: {0}")]
    OpusEncode(String),

    #[error("Failed to write OGG packet: {0}")]
    OggWrite(String),
}

/// Grow-only byte buffer shared between the packet writer and the drain
/// side. Single-threaded within one encoder session.
#[derive(Clone, Default)]
struct BufHandle(Rc<RefCell<Vec<u8>>>);

impl std::io::Write for BufHandle {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl BufHandle {
    fn drain(&self) -> Vec<u8> {
        self.0.take()
    }
}

/// Streaming Opus/Ogg encoder.
pub struct OpusStreamEncoder {
    encoder: opus::Encoder,
    writer: PacketWriter<'static, BufHandle>,
    buf: BufHandle,
    pending: Vec<f32>,
    frame_samples: usize,
    channels: u16,
    sample_rate: u32,
    serial: u32,
    granule: u64,
    digest: md5::Context,
    total_bytes: u64,
    headers_written: bool,
}

impl OpusStreamEncoder {
    /// Create an encoder for one stream.
    ///
    /// `sample_rate` must be one the codec accepts (8/12/16/24/48 kHz);
    /// resampling happens upstream.
    pub fn new(
        sample_rate: u32,
        bitrate_kbps: u32,
        channels: u16,
        serial: u32,
    ) -> Result<Self, EncodingError> {
        if !matches!(sample_rate, 8000 | 12000 | 16000 | 24000 | 48000) {
            return Err(EncodingError::SampleRate(sample_rate));
        }
        let opus_channels = match channels {
            1 => opus::Channels::Mono,
            2 => opus::Channels::Stereo,
            other => return Err(EncodingError::Channels(other)),
        };

        let mut encoder = opus::Encoder::new(sample_rate, opus_channels, opus::Application::Audio)
            .map_err(|e| EncodingError::Setup(e.to_string()))?;
        encoder
            .set_bitrate(opus::Bitrate::Bits((bitrate_kbps * 1000) as i32))
            .map_err(|e| EncodingError::Setup(e.to_string()))?;
        encoder
            .set_vbr(true)
            .map_err(|e| EncodingError::Setup(e.to_string()))?;

        let buf = BufHandle::default();
        let writer = PacketWriter::new(buf.clone());
        let frame_samples = (sample_rate / 1000 * FRAME_MILLIS) as usize;

        Ok(Self {
            encoder,
            writer,
            buf,
            pending: Vec::new(),
            frame_samples,
            channels,
            sample_rate,
            serial,
            granule: 0,
            digest: md5::Context::new(),
            total_bytes: 0,
            headers_written: false,
        })
    }

    /// Feed a block of interleaved samples; returns the compressed frames
    /// completed by this block, in order.
    pub fn feed(&mut self, pcm: &[f32]) -> Result<Vec<Vec<u8>>, EncodingError> {
        let mut payloads = Vec::new();
        if !self.headers_written {
            self.write_headers()?;
            self.emit(&mut payloads);
        }

        self.pending.extend_from_slice(pcm);
        let frame_len = self.frame_samples * self.channels as usize;
        while self.pending.len() >= frame_len {
            let frame: Vec<f32> = self.pending.drain(..frame_len).collect();
            self.encode_frame(&frame, false)?;
            self.emit(&mut payloads);
        }

        Ok(payloads)
    }

    /// Flush the partial frame (zero-padded) and close the stream.
    /// Returns the residual frames, the hex digest over everything
    /// emitted, and the total byte count.
    pub fn finish(mut self) -> Result<(Vec<Vec<u8>>, String, u64), EncodingError> {
        let mut payloads = Vec::new();
        if !self.headers_written {
            self.write_headers()?;
            self.emit(&mut payloads);
        }

        // Always close with one last frame so the stream carries an
        // EndStream page even when the input was frame-aligned.
        let frame_len = self.frame_samples * self.channels as usize;
        let mut last = std::mem::take(&mut self.pending);
        last.resize(frame_len, 0.0);
        self.encode_frame(&last, true)?;
        self.emit(&mut payloads);

        let digest = format!("{:x}", self.digest.compute());
        Ok((payloads, digest, self.total_bytes))
    }

    /// Encode one exact codec frame and hand it to the packet writer.
    fn encode_frame(&mut self, frame: &[f32], last: bool) -> Result<(), EncodingError> {
        let pcm16 = float_to_i16(frame);
        let mut packet = vec![0u8; MAX_PACKET];
        let len = self
            .encoder
            .encode(&pcm16, &mut packet)
            .map_err(|e| EncodingError::OpusEncode(e.to_string()))?;
        packet.truncate(len);

        self.granule += GRANULE_STEP;
        let end_info = if last {
            PacketWriteEndInfo::EndStream
        } else {
            // One page per frame keeps the emitted chunks aligned with
            // codec frames.
            PacketWriteEndInfo::EndPage
        };

        self.writer
            .write_packet(packet, self.serial, end_info, self.granule)
            .map_err(|e| EncodingError::OggWrite(e.to_string()))?;

        Ok(())
    }

    /// Write Opus identification and comment headers
    fn write_headers(&mut self) -> Result<(), EncodingError> {
        // Opus identification header (required by spec)
        let mut id_header = Vec::with_capacity(19);
        id_header.extend_from_slice(b"OpusHead"); // Magic signature
        id_header.push(1); // Version
        id_header.push(self.channels as u8);
        id_header.extend_from_slice(&0u16.to_le_bytes()); // Pre-skip
        id_header.extend_from_slice(&self.sample_rate.to_le_bytes()); // Original sample rate
        id_header.extend_from_slice(&0i16.to_le_bytes()); // Output gain
        id_header.push(0); // Channel mapping family

        self.writer
            .write_packet(id_header, self.serial, PacketWriteEndInfo::EndPage, 0)
            .map_err(|e| EncodingError::OggWrite(e.to_string()))?;

        // Opus comment header (required by spec)
        let mut comment_header = Vec::new();
        comment_header.extend_from_slice(b"OpusTags"); // Magic signature
        let vendor = b"storycap";
        comment_header.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        comment_header.extend_from_slice(vendor);
        comment_header.extend_from_slice(&0u32.to_le_bytes()); // No user comments

        self.writer
            .write_packet(comment_header, self.serial, PacketWriteEndInfo::EndPage, 0)
            .map_err(|e| EncodingError::OggWrite(e.to_string()))?;

        self.headers_written = true;
        Ok(())
    }

    /// Move whatever the writer flushed into the payload list, updating
    /// digest and byte count in emission order.
    fn emit(&mut self, payloads: &mut Vec<Vec<u8>>) {
        let bytes = self.buf.drain();
        if bytes.is_empty() {
            return;
        }
        self.digest.consume(&bytes);
        self.total_bytes += bytes.len() as u64;
        payloads.push(bytes);
    }
}
