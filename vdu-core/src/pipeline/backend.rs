//! Decode capability contract.
//!
//! A backend is the raw decoding capability an engine drives: the
//! engine owns unit classification, drop policy, and timestamps; the
//! backend just turns coded bytes into pictures.

use crate::error::VduError;

use super::{DecodedPicture, EngineConfig};

/// The decoding capability behind an engine.
pub trait DecodeBackend: Send {
    /// (Re)creates decoder state for the given configuration.
    fn configure(&mut self, config: &EngineConfig) -> Result<(), VduError>;

    /// Decodes one coded unit. May emit zero or more pictures — some
    /// decoders buffer internally before producing output.
    fn decode(
        &mut self,
        data: &[u8],
        is_key: bool,
        timestamp_us: u64,
    ) -> Result<Vec<DecodedPicture>, VduError>;

    /// Platform-reported count of submissions not yet decoded.
    /// Synchronous backends return 0.
    fn pending(&self) -> usize;

    /// Discards in-flight decoder output without reconfiguring.
    fn reset(&mut self);
}
