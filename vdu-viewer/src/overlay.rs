//! Loading overlay state.
//!
//! The overlay covers the viewport while the first negotiation is in
//! flight. It only appears after a short debounce so a fast startup
//! never flashes it, it never reappears once the first normal state
//! commits, and any received frame clears it instantly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::time::Duration;
use vdu_core::NegotiationMode;

/// Delay before a loading state becomes visible.
pub const OVERLAY_DEBOUNCE: Duration = Duration::from_millis(150);

struct Inner {
    token: AtomicU64,
    suppressed: AtomicBool,
    visible: watch::Sender<bool>,
}

/// Debounced overlay visibility tracker. Cloneable; clones share
/// state.
#[derive(Clone)]
pub struct LoadingOverlay {
    inner: Arc<Inner>,
}

impl LoadingOverlay {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (visible, rx) = watch::channel(false);
        (
            Self {
                inner: Arc::new(Inner {
                    token: AtomicU64::new(0),
                    suppressed: AtomicBool::new(false),
                    visible,
                }),
            },
            rx,
        )
    }

    /// Feeds a negotiation mode change into the tracker.
    pub fn on_mode(&self, mode: NegotiationMode) {
        if mode == NegotiationMode::Normal {
            self.inner.suppressed.store(true, Ordering::SeqCst);
            self.hide();
            return;
        }
        if self.inner.suppressed.load(Ordering::SeqCst) {
            return;
        }

        let token = self.inner.token.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(OVERLAY_DEBOUNCE).await;
            if inner.token.load(Ordering::SeqCst) == token
                && !inner.suppressed.load(Ordering::SeqCst)
            {
                let _ = inner.visible.send(true);
            }
        });
    }

    /// A frame arrived; whatever state we are in, content wins.
    pub fn on_frame(&self) {
        self.hide();
    }

    fn hide(&self) {
        self.inner.token.fetch_add(1, Ordering::SeqCst);
        let _ = self.inner.visible.send(false);
    }
}
