//! Motion JPEG ("mosaic") decode engine.
//!
//! Every arrival is one self-delimited compressed image; there is no
//! inter-frame state, so there is no key/delta distinction and no
//! drop-until-keyframe flag. A bad blob is reported and skipped.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::VduError;

use super::queue::FrameQueue;
use super::{DecodeEngine, DecodedPicture, EngineConfig, FRAME_DURATION_US};

/// Decode engine for the image-blob tier.
pub struct MosaicEngine {
    config: EngineConfig,
    next_timestamp_us: u64,
    errors: mpsc::UnboundedSender<VduError>,
}

impl MosaicEngine {
    pub fn new(errors: mpsc::UnboundedSender<VduError>) -> Self {
        Self {
            config: EngineConfig::default(),
            next_timestamp_us: 0,
            errors,
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }
}

impl DecodeEngine for MosaicEngine {
    fn configure(&mut self, config: EngineConfig, queue: &mut FrameQueue) {
        if config != self.config {
            queue.clear();
        }
        self.config = config;
    }

    fn submit(&mut self, data: Bytes, queue: &mut FrameQueue) {
        let image = match image::load_from_memory(&data) {
            Ok(image) => image,
            Err(error) => {
                let _ = self.errors.send(VduError::Decode(error.to_string()));
                return;
            }
        };

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut pixels = rgba.into_raw();
        // RGBA to BGRA in place.
        for px in pixels.chunks_exact_mut(4) {
            px.swap(0, 2);
        }

        let timestamp_us = self.next_timestamp_us;
        self.next_timestamp_us += FRAME_DURATION_US;
        queue.push(DecodedPicture::bgra(width, height, timestamp_us, pixels));
    }
}
