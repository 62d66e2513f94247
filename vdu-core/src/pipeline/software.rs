//! Software bitstream decode engine.
//!
//! Classifies coded units itself and drives a synchronous software
//! decoder. Parameter units are cached and re-fed ahead of every key
//! frame so the decoder can resynchronize after any discontinuity.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::VduError;

use super::backend::DecodeBackend;
use super::framer::{self, UnitKind};
use super::queue::FrameQueue;
use super::{DecodeEngine, DecodedPicture, EngineConfig, FRAME_DURATION_US, MAX_DECODE_QUEUE};

// ── SoftwareEngine ───────────────────────────────────────────────

/// Decode engine for the software bitstream tier.
pub struct SoftwareEngine<B: DecodeBackend> {
    backend: B,
    config: EngineConfig,
    configured: bool,
    param_cache: Option<Vec<u8>>,
    drop_until_key: bool,
    next_timestamp_us: u64,
    errors: mpsc::UnboundedSender<VduError>,
}

impl<B: DecodeBackend> SoftwareEngine<B> {
    pub fn new(backend: B, errors: mpsc::UnboundedSender<VduError>) -> Self {
        Self {
            backend,
            config: EngineConfig::default(),
            configured: false,
            param_cache: None,
            drop_until_key: true,
            next_timestamp_us: 0,
            errors,
        }
    }

    fn report(&self, error: VduError) {
        let _ = self.errors.send(error);
    }

    fn cache_param(&mut self, unit: &[u8]) {
        match framer::unit_type(unit) {
            // A new sequence parameter set restarts the cache.
            Some(7) => self.param_cache = Some(unit.to_vec()),
            Some(8) => match &mut self.param_cache {
                Some(cache) => cache.extend_from_slice(unit),
                None => self.param_cache = Some(unit.to_vec()),
            },
            _ => {}
        }
    }

    fn backlogged(&self, queue: &FrameQueue) -> bool {
        queue.backlogged() || self.backend.pending() > MAX_DECODE_QUEUE
    }

    fn decode_unit(&mut self, unit: &Bytes, is_key: bool, queue: &mut FrameQueue) {
        if self.drop_until_key && !is_key {
            return;
        }
        if self.backlogged(queue) && !is_key {
            self.drop_until_key = true;
            return;
        }

        let data: Vec<u8> = match (&self.param_cache, is_key) {
            (Some(cache), true) => {
                let mut merged = Vec::with_capacity(cache.len() + unit.len());
                merged.extend_from_slice(cache);
                merged.extend_from_slice(unit);
                merged
            }
            _ => unit.to_vec(),
        };

        let timestamp_us = self.next_timestamp_us;
        self.next_timestamp_us += FRAME_DURATION_US;

        match self.backend.decode(&data, is_key, timestamp_us) {
            Ok(pictures) => {
                for picture in pictures {
                    queue.push(picture);
                }
                if is_key {
                    self.drop_until_key = false;
                }
            }
            Err(error) => {
                if !is_key {
                    self.drop_until_key = true;
                }
                self.report(error);
            }
        }
    }
}

impl<B: DecodeBackend> DecodeEngine for SoftwareEngine<B> {
    fn configure(&mut self, config: EngineConfig, queue: &mut FrameQueue) {
        queue.clear();
        self.config = config;
        self.drop_until_key = true;
        match self.backend.configure(&config) {
            Ok(()) => self.configured = true,
            Err(error) => {
                self.configured = false;
                self.report(error);
            }
        }
    }

    fn submit(&mut self, data: Bytes, queue: &mut FrameQueue) {
        if !self.configured {
            return;
        }
        for unit in framer::parse_units(&data) {
            match unit.kind {
                UnitKind::Config => self.cache_param(&unit.bytes),
                UnitKind::Key => self.decode_unit(&unit.bytes, true, queue),
                UnitKind::Delta => self.decode_unit(&unit.bytes, false, queue),
                UnitKind::Other => {}
            }
        }
    }
}

// ── OpenH264Backend ──────────────────────────────────────────────

/// Software H.264 decode capability backed by OpenH264.
pub struct OpenH264Backend {
    decoder: Option<openh264::decoder::Decoder>,
}

impl OpenH264Backend {
    pub fn new() -> Self {
        Self { decoder: None }
    }
}

impl Default for OpenH264Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeBackend for OpenH264Backend {
    fn configure(&mut self, _config: &EngineConfig) -> Result<(), VduError> {
        let decoder = openh264::decoder::Decoder::new()
            .map_err(|e| VduError::DecoderConfig(e.to_string()))?;
        self.decoder = Some(decoder);
        Ok(())
    }

    fn decode(
        &mut self,
        data: &[u8],
        _is_key: bool,
        timestamp_us: u64,
    ) -> Result<Vec<DecodedPicture>, VduError> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| VduError::Decode("decoder not configured".into()))?;

        let maybe_yuv = decoder
            .decode(data)
            .map_err(|e| VduError::Decode(e.to_string()))?;

        // OpenH264 may buffer without producing a picture.
        let Some(yuv) = maybe_yuv else {
            return Ok(Vec::new());
        };

        use openh264::formats::YUVSource;
        let (width, height) = yuv.dimensions();
        let (y_stride, u_stride, v_stride) = yuv.strides();
        let bgra = yuv420_to_bgra(
            yuv.y(),
            yuv.u(),
            yuv.v(),
            y_stride,
            u_stride,
            v_stride,
            width,
            height,
        );

        Ok(vec![DecodedPicture::bgra(
            width as u32,
            height as u32,
            timestamp_us,
            bgra,
        )])
    }

    fn pending(&self) -> usize {
        // Synchronous decoder, output is immediate.
        0
    }

    fn reset(&mut self) {}
}

/// YUV420 to BGRA conversion, BT.601 coefficients.
#[allow(clippy::too_many_arguments)]
fn yuv420_to_bgra(
    y_data: &[u8],
    u_data: &[u8],
    v_data: &[u8],
    y_stride: usize,
    u_stride: usize,
    v_stride: usize,
    width: usize,
    height: usize,
) -> Vec<u8> {
    let mut bgra = vec![0u8; width * height * 4];

    for row in 0..height {
        for col in 0..width {
            let y_val = i32::from(y_data[row * y_stride + col]);
            let u_val = i32::from(u_data[(row / 2) * u_stride + col / 2]) - 128;
            let v_val = i32::from(v_data[(row / 2) * v_stride + col / 2]) - 128;

            let r = (y_val + ((v_val * 359) >> 8)).clamp(0, 255) as u8;
            let g = (y_val - ((u_val * 88 + v_val * 183) >> 8)).clamp(0, 255) as u8;
            let b = (y_val + ((u_val * 454) >> 8)).clamp(0, 255) as u8;

            let idx = (row * width + col) * 4;
            bgra[idx] = b;
            bgra[idx + 1] = g;
            bgra[idx + 2] = r;
            bgra[idx + 3] = 255;
        }
    }

    bgra
}
