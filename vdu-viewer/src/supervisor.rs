//! Stream supervision.
//!
//! Joins the three moving parts behind the controller's stream seam:
//! the renderer selector picks and pins a decode variant, the socket
//! carries compressed frames, and the pump forwards them into the
//! variant's pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use vdu_core::{
    EngineConfig, RemoteDisplayState, RendererDescriptor, RendererSelector, StreamControl,
    StreamEvent, StreamSocket, StreamSocketHandle, VduError,
};

use crate::overlay::LoadingOverlay;

struct ActiveStream {
    descriptor: RendererDescriptor,
    socket: StreamSocketHandle,
}

/// [`StreamControl`] implementation for a TCP frame stream.
pub struct StreamSupervisor {
    selector: Arc<RendererSelector>,
    stream_addr: String,
    overlay: LoadingOverlay,
    active: Mutex<Option<ActiveStream>>,
}

impl StreamSupervisor {
    pub fn new(
        selector: Arc<RendererSelector>,
        stream_addr: impl Into<String>,
        overlay: LoadingOverlay,
    ) -> Self {
        Self {
            selector,
            stream_addr: stream_addr.into(),
            overlay,
            active: Mutex::new(None),
        }
    }
}

#[async_trait]
impl StreamControl for StreamSupervisor {
    async fn ensure(&self, state: &RemoteDisplayState) -> Result<(), VduError> {
        let descriptor = RendererDescriptor::for_renderer_id(state.renderer);
        let variant = self.selector.ensure(descriptor).await?;

        // The pipeline always tracks the latest negotiated size, even
        // when the connection itself is reused.
        variant.pipeline.configure(EngineConfig::new(
            state.width,
            state.height,
            state.width,
            state.height,
        ));

        let mut active = self.active.lock().await;
        if let Some(current) = &*active
            && current.descriptor == descriptor
        {
            return Ok(());
        }
        if let Some(stale) = active.take() {
            stale.socket.close();
        }

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let socket =
            StreamSocket::new(self.stream_addr.clone(), descriptor.framing).spawn(events_tx);

        let overlay = self.overlay.clone();
        let pipeline = variant.pipeline.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    StreamEvent::Frame(frame) => {
                        overlay.on_frame();
                        pipeline.submit(frame);
                    }
                    StreamEvent::Connected => tracing::info!("display stream up"),
                    StreamEvent::Disconnected => {
                        tracing::info!("display stream lost, reconnecting");
                    }
                    StreamEvent::Error(error) => {
                        tracing::debug!("display stream error: {error}");
                    }
                }
            }
        });

        *active = Some(ActiveStream { descriptor, socket });
        Ok(())
    }

    async fn close(&self) {
        if let Some(stream) = self.active.lock().await.take() {
            // Closing the socket ends its task, which ends the pump.
            stream.socket.close();
        }
    }
}
