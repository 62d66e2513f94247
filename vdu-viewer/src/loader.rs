//! Engine construction per renderer tier.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use vdu_core::{
    MosaicEngine, PipelineRunner, RendererDescriptor, RendererKind, RendererVariant,
    SoftwareEngine, VariantLoader, VduError,
};

use crate::surface::{PresentedFrame, ViewportSurface};

/// Builds the decode domain for a renderer tier: engine, surface, and
/// the spawned runner task. Every variant publishes into the same
/// frame slot.
pub struct EngineLoader {
    frames: Arc<watch::Sender<Option<PresentedFrame>>>,
}

impl EngineLoader {
    pub fn new(frames: Arc<watch::Sender<Option<PresentedFrame>>>) -> Self {
        Self { frames }
    }

    fn spawn_error_drain() -> mpsc::UnboundedSender<VduError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<VduError>();
        tokio::spawn(async move {
            while let Some(error) = rx.recv().await {
                tracing::warn!("decode error: {error}");
            }
        });
        tx
    }
}

#[async_trait]
impl VariantLoader for EngineLoader {
    async fn load(&self, descriptor: RendererDescriptor) -> Result<RendererVariant, VduError> {
        let errors = Self::spawn_error_drain();
        let surface = ViewportSurface::new(self.frames.clone());

        let pipeline = match descriptor.kind {
            RendererKind::MotionJpeg => {
                let (pipeline, runner) = PipelineRunner::new(MosaicEngine::new(errors), surface);
                tokio::spawn(runner.run());
                pipeline
            }
            RendererKind::SoftwareH264 | RendererKind::HardwareH264 => {
                if descriptor.kind == RendererKind::HardwareH264 {
                    // No platform decode surface on this host; the
                    // hardware tier decodes in software instead.
                    tracing::info!("hardware tier requested, decoding in software");
                }
                let (pipeline, runner) = PipelineRunner::new(
                    SoftwareEngine::new(vdu_core::pipeline::OpenH264Backend::new(), errors),
                    surface,
                );
                tokio::spawn(runner.run());
                pipeline
            }
        };

        tracing::info!("loaded {} renderer", descriptor.kind);
        Ok(RendererVariant {
            descriptor,
            pipeline,
        })
    }
}
