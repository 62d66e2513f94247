//! Presentation surface.
//!
//! Publishes the newest decoded picture for whatever presents it; the
//! decode domain never waits on presentation.

use std::sync::Arc;

use tokio::sync::watch;
use vdu_core::pipeline::PictureBuffer;
use vdu_core::{DecodedPicture, Surface};

/// One picture ready for presentation, CPU-resident.
#[derive(Debug, Clone)]
pub struct PresentedFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp_us: u64,
    /// BGRA pixels, 4 bytes per pixel.
    pub pixels: Vec<u8>,
}

/// [`Surface`] that overwrites a watch slot with the newest frame.
pub struct ViewportSurface {
    frames: Arc<watch::Sender<Option<PresentedFrame>>>,
}

impl ViewportSurface {
    pub fn new(frames: Arc<watch::Sender<Option<PresentedFrame>>>) -> Self {
        Self { frames }
    }

    pub fn channel() -> (
        Arc<watch::Sender<Option<PresentedFrame>>>,
        watch::Receiver<Option<PresentedFrame>>,
    ) {
        let (tx, rx) = watch::channel(None);
        (Arc::new(tx), rx)
    }
}

impl Surface for ViewportSurface {
    fn draw(&mut self, picture: DecodedPicture) {
        match picture.buffer {
            PictureBuffer::Bgra(pixels) => {
                let _ = self.frames.send(Some(PresentedFrame {
                    width: picture.width,
                    height: picture.height,
                    timestamp_us: picture.timestamp_us,
                    pixels,
                }));
            }
            // No GPU presentation path on this host; dropping the
            // handle releases the decoder slot.
            PictureBuffer::Gpu(_) => {
                tracing::debug!("discarding GPU picture, no presentation path");
            }
        }
    }
}

/// Scale that fits a frame inside a viewport, preserving aspect.
pub fn fit_scale(viewport: (u32, u32), frame: (u32, u32)) -> f64 {
    if frame.0 == 0 || frame.1 == 0 {
        return 1.0;
    }
    let sx = f64::from(viewport.0) / f64::from(frame.0);
    let sy = f64::from(viewport.1) / f64::from(frame.1);
    sx.min(sy)
}
