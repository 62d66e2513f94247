//! # vdu-core
//!
//! Core library for the VDU remote display client: negotiating the
//! remote display configuration with a device and decoding the frame
//! stream it sends back.
//!
//! This crate contains:
//! - **Remote state**: `RemoteDisplayState` and the `ConfigService`
//!   HTTP seam it travels over
//! - **Display**: `DisplayController` driving the debounced resize
//!   protocol, viewport sizing, negotiation modes, and the primary
//!   display preference store
//! - **Renderer**: the three decode/render tiers and the
//!   `RendererSelector` that loads and pins one per session
//! - **Pipeline**: decode engines (software h264, hardware h264,
//!   motion JPEG), the bounded frame queue, and the runner task
//! - **Stream**: auto-reconnecting frame transport with per-tier
//!   payload framing
//! - **Error**: `VduError` — typed, `thiserror`-based error hierarchy

pub mod display;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod renderer;
pub mod stream;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use display::{
    DisplayController, DisplayEvent, DisplayHandle, DisplayHandles, FilePreferenceStore,
    MemoryPreferenceStore, NegotiationMode, PreferenceStore, ViewSize, compute_optimal_size,
};
pub use error::VduError;
pub use pipeline::{
    DecodeBackend, DecodeEngine, DecodedPicture, EngineConfig, FrameQueue, HardwareEngine,
    MosaicEngine, PipelineHandle, PipelineRunner, SoftwareEngine, Surface,
};
pub use remote::{ConfigService, HttpConfigService, RemoteDisplayState};
pub use renderer::{
    PayloadFraming, RendererDescriptor, RendererKind, RendererSelector, RendererVariant,
    VariantLoader,
};
pub use stream::{StreamControl, StreamEvent, StreamSocket, StreamSocketHandle};
