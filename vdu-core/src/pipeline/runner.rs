//! Decode-domain task.
//!
//! Owns an engine, the frame queue, and the draw surface. The control
//! domain talks to it exclusively through a one-way channel: runtime
//! config in, compressed bytes in, nothing back. Load shedding happens
//! entirely on this side via the queue's drop policies.

use bytes::Bytes;
use tokio::sync::mpsc;

use super::queue::{FrameQueue, RenderScheduler};
use super::{DecodeEngine, EngineConfig, Surface};

// ── Messages ─────────────────────────────────────────────────────

#[derive(Debug)]
enum PipelineMsg {
    Configure(EngineConfig),
    Submit(Bytes),
}

/// Control-domain handle into a running pipeline.
///
/// Sends never block; if the decode task is gone the message is
/// silently dropped, matching the no-backpressure contract.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<PipelineMsg>,
}

impl PipelineHandle {
    pub fn configure(&self, config: EngineConfig) {
        let _ = self.tx.send(PipelineMsg::Configure(config));
    }

    pub fn submit(&self, data: Bytes) {
        let _ = self.tx.send(PipelineMsg::Submit(data));
    }
}

// ── PipelineRunner ───────────────────────────────────────────────

/// The decode-domain event loop.
pub struct PipelineRunner<E: DecodeEngine, S: Surface> {
    engine: E,
    surface: S,
    queue: FrameQueue,
    scheduler: RenderScheduler,
    rx: mpsc::UnboundedReceiver<PipelineMsg>,
}

impl<E: DecodeEngine, S: Surface> PipelineRunner<E, S> {
    pub fn new(engine: E, surface: S) -> (PipelineHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            PipelineHandle { tx },
            Self {
                engine,
                surface,
                queue: FrameQueue::new(),
                scheduler: RenderScheduler::new(),
                rx,
            },
        )
    }

    /// Runs until every [`PipelineHandle`] is dropped.
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                PipelineMsg::Configure(config) => {
                    tracing::debug!(
                        "pipeline reconfigure: {}x{} surface {}x{}",
                        config.display_width,
                        config.display_height,
                        config.surface_width,
                        config.surface_height
                    );
                    self.engine.configure(config, &mut self.queue);
                }
                PipelineMsg::Submit(data) => {
                    self.engine.submit(data, &mut self.queue);
                    if !self.queue.is_empty() && self.scheduler.request() {
                        while self.scheduler.render_pass(&mut self.queue, &mut self.surface) {
                            tokio::task::yield_now().await;
                        }
                    }
                }
            }
        }
    }
}
