//! Streaming transport for compressed display frames.

pub mod socket;

pub use socket::{ReconnectPolicy, StreamEvent, StreamSocket, StreamSocketHandle};

use async_trait::async_trait;

use crate::error::VduError;
use crate::remote::RemoteDisplayState;

/// Stream lifecycle seam consumed by the negotiation controller.
///
/// `ensure` brings the display stream up for the given remote state,
/// reusing a live connection when the renderer variant allows it.
/// Returns [`VduError::SessionRestartRequired`] when the advertised
/// renderer differs from the active one.
#[async_trait]
pub trait StreamControl: Send + Sync {
    async fn ensure(&self, state: &RemoteDisplayState) -> Result<(), VduError>;
    async fn close(&self);
}
