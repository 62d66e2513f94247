//! Adaptive decode pipeline.
//!
//! Everything in this module runs in the decode domain: compressed
//! bytes come in over a one-way channel, decoded pictures go out to a
//! drawable surface. The control domain never blocks on any of it.
//!
//! - [`framer`]: splits raw bytes into classified coded units
//! - [`queue`]: bounded picture queue plus the render scheduler
//! - [`backend`]: the decode capability contract
//! - [`software`] / [`hardware`] / [`mosaic`]: the three engine tiers
//! - [`runner`]: the decode-domain task driving an engine

pub mod backend;
pub mod framer;
pub mod hardware;
pub mod mosaic;
pub mod queue;
pub mod runner;
pub mod software;

pub use backend::DecodeBackend;
pub use framer::{CodedUnit, UnitKind};
pub use hardware::HardwareEngine;
pub use mosaic::MosaicEngine;
pub use queue::{FrameQueue, RenderScheduler};
pub use runner::{PipelineHandle, PipelineRunner};
pub use software::{OpenH264Backend, SoftwareEngine};

use bytes::Bytes;

// ── Pipeline constants ───────────────────────────────────────────

/// Decoded pictures buffered ahead of the surface.
pub const MAX_RENDER_QUEUE: usize = 4;

/// Platform-reported pending decodes tolerated before load shedding.
pub const MAX_DECODE_QUEUE: usize = 8;

/// Synthetic presentation cadence. The stream carries no per-frame
/// timing, so frames are stamped at a nominal 30 Hz.
pub const FRAME_DURATION_US: u64 = 33_333;

// ── EngineConfig ─────────────────────────────────────────────────

/// Runtime configuration for a decode engine.
///
/// `display_*` is the negotiated remote pixel size, `surface_*` the
/// local drawable size. Both axes are floored at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub display_width: u32,
    pub display_height: u32,
    pub surface_width: u32,
    pub surface_height: u32,
}

impl EngineConfig {
    pub fn new(
        display_width: u32,
        display_height: u32,
        surface_width: u32,
        surface_height: u32,
    ) -> Self {
        Self {
            display_width: display_width.max(1),
            display_height: display_height.max(1),
            surface_width: surface_width.max(1),
            surface_height: surface_height.max(1),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(1280, 720, 1280, 720)
    }
}

// ── DecodedPicture ───────────────────────────────────────────────

/// A decoded image ready for presentation.
///
/// Owned by the frame queue until drawn, then dropped. Pictures are
/// never retained past a single draw; for the GPU variant dropping the
/// buffer releases the underlying decoder output slot.
#[derive(Debug)]
pub struct DecodedPicture {
    pub width: u32,
    pub height: u32,
    pub timestamp_us: u64,
    pub buffer: PictureBuffer,
}

impl DecodedPicture {
    pub fn bgra(width: u32, height: u32, timestamp_us: u64, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            timestamp_us,
            buffer: PictureBuffer::Bgra(data),
        }
    }

    pub fn gpu(width: u32, height: u32, timestamp_us: u64, handle: GpuPictureHandle) -> Self {
        Self {
            width,
            height,
            timestamp_us,
            buffer: PictureBuffer::Gpu(handle),
        }
    }
}

/// Pixel storage for a decoded picture.
pub enum PictureBuffer {
    /// CPU-resident BGRA pixels, 4 bytes per pixel.
    Bgra(Vec<u8>),
    /// Decoder-owned GPU resource. Released on drop.
    Gpu(GpuPictureHandle),
}

impl std::fmt::Debug for PictureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bgra(data) => write!(f, "Bgra({} bytes)", data.len()),
            Self::Gpu(handle) => write!(f, "Gpu(slot {})", handle.id()),
        }
    }
}

/// Handle to a decoder-owned output slot. The release callback runs
/// exactly once, when the handle is dropped.
pub struct GpuPictureHandle {
    id: u64,
    release: Option<Box<dyn FnOnce(u64) + Send>>,
}

impl GpuPictureHandle {
    pub fn new(id: u64, release: impl FnOnce(u64) + Send + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for GpuPictureHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.id);
        }
    }
}

// ── Engine and surface contracts ─────────────────────────────────

/// Uniform contract over the three decode/render tiers.
///
/// Engines push decoded pictures into the queue they are handed;
/// the [`runner`] drives render passes afterwards.
pub trait DecodeEngine: Send {
    /// (Re)initializes decode state. Clears all buffered pictures —
    /// a size change must never feed stale-resolution pictures into a
    /// freshly sized surface.
    fn configure(&mut self, config: EngineConfig, queue: &mut FrameQueue);

    /// Accepts one arrival of raw compressed data, which may contain
    /// multiple coded units.
    fn submit(&mut self, data: Bytes, queue: &mut FrameQueue);
}

/// Something decoded pictures can be drawn onto. The picture is
/// consumed by the draw; implementations must not retain it.
pub trait Surface: Send {
    fn draw(&mut self, picture: DecodedPicture);
}
