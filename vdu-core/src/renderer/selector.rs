//! Renderer variant loading and switching.
//!
//! Loading a variant is idempotent and memoized: concurrent requests
//! for the same variant share one in-flight load, and a loaded variant
//! is reused for the life of the session. Requesting a different
//! variant than the active one is refused — decode contexts cannot be
//! re-created in place, the whole session must restart.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

use crate::error::VduError;
use crate::pipeline::PipelineHandle;

use super::RendererDescriptor;

// ── RendererVariant ──────────────────────────────────────────────

/// A loaded decode/render implementation: the descriptor it was
/// loaded for plus the entry point into its decode domain.
pub struct RendererVariant {
    pub descriptor: RendererDescriptor,
    pub pipeline: PipelineHandle,
}

/// Builds the decode domain for a variant: engine, surface, and the
/// spawned runner task.
#[async_trait]
pub trait VariantLoader: Send + Sync {
    async fn load(&self, descriptor: RendererDescriptor) -> Result<RendererVariant, VduError>;
}

// ── RendererSelector ─────────────────────────────────────────────

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<RendererVariant>, Arc<VduError>>>>;

#[derive(Default)]
struct SelectorState {
    active: Option<RendererDescriptor>,
    loaded: Option<Arc<RendererVariant>>,
    in_flight: Option<LoadFuture>,
}

/// Chooses and owns the active decode/render variant.
pub struct RendererSelector {
    loader: Arc<dyn VariantLoader>,
    state: Mutex<SelectorState>,
}

impl RendererSelector {
    pub fn new(loader: Arc<dyn VariantLoader>) -> Self {
        Self {
            loader,
            state: Mutex::new(SelectorState::default()),
        }
    }

    /// The descriptor committed to this session, if any.
    pub async fn active(&self) -> Option<RendererDescriptor> {
        self.state.lock().await.active
    }

    /// Returns the loaded variant for `descriptor`, starting the load
    /// if nobody has yet.
    ///
    /// Errors: [`VduError::SessionRestartRequired`] when a different
    /// variant is already active; [`VduError::RendererLoad`] when the
    /// load fails (every concurrent waiter sees the failure; a later
    /// call starts a fresh load).
    pub async fn ensure(
        &self,
        descriptor: RendererDescriptor,
    ) -> Result<Arc<RendererVariant>, VduError> {
        let load = {
            let mut state = self.state.lock().await;

            if let Some(active) = state.active
                && active != descriptor
            {
                tracing::warn!(
                    "renderer changed from {} to {}, session restart required",
                    active.kind,
                    descriptor.kind
                );
                return Err(VduError::SessionRestartRequired);
            }
            if let Some(variant) = &state.loaded {
                return Ok(variant.clone());
            }

            match &state.in_flight {
                Some(load) => load.clone(),
                None => {
                    state.active = Some(descriptor);
                    let loader = self.loader.clone();
                    let load: LoadFuture = async move {
                        loader
                            .load(descriptor)
                            .await
                            .map(Arc::new)
                            .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    state.in_flight = Some(load.clone());
                    load
                }
            }
        };

        let result = load.await;

        let mut state = self.state.lock().await;
        match result {
            Ok(variant) => {
                state.loaded = Some(variant.clone());
                state.in_flight = None;
                Ok(variant)
            }
            Err(error) => {
                state.in_flight = None;
                state.active = None;
                Err(VduError::RendererLoad(error.to_string()))
            }
        }
    }
}
