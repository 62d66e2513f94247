//! Display negotiation controller.
//!
//! The top-level state machine: it tracks the local viewport, the
//! authoritative remote display state, and runs the debounced,
//! cancellable protocol that requests a new remote size and
//! coordinates the resulting stream restart.
//!
//! The controller is an actor. Commands arrive on a mailbox; fetches,
//! posts, and timers run as spawned tasks that report back through the
//! same mailbox, stamped with the generation token they were minted
//! under. A result whose token no longer matches the live token is
//! discarded — that comparison is the sole cancellation mechanism, no
//! locks anywhere.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

use crate::display::mode::NegotiationMode;
use crate::display::prefs::{self, PreferenceStore};
use crate::display::sizing::{self, NON_RESPONSIVE_SIZE, ViewSize};
use crate::error::VduError;
use crate::remote::{ConfigService, RemoteDisplayState};
use crate::stream::StreamControl;

// ── Timing ───────────────────────────────────────────────────────

/// Debounce window between a trigger and the post.
pub const RESIZE_COOLDOWN: Duration = Duration::from_millis(1000);

/// Settle delay after a successful post. The producer gives no
/// completion signal, so its resize latency is absorbed blind.
pub const RESIZE_SETTLE: Duration = Duration::from_millis(1000);

// ── Messages ─────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    TriggerResize(ViewSize),
    SetPaused(bool),
    ResolveDisplayType { is_primary: bool },
    Shutdown,
    // Internal: spawned fetch/post/timer tasks reporting back.
    FetchResolved {
        token: u64,
        view: ViewSize,
        result: Result<RemoteDisplayState, VduError>,
    },
    CooldownElapsed {
        token: u64,
    },
    PostResolved {
        token: u64,
        payload: RemoteDisplayState,
        result: Result<(), VduError>,
    },
    SettleElapsed {
        token: u64,
    },
}

/// Events the controller emits toward the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    /// A secondary display is enabled and no stored preference exists.
    /// The host must present the choice and call
    /// [`DisplayHandle::resolve_display_type`].
    DisplayTypeSelectionRequired,

    /// The stream session was torn down after a resize; dependent
    /// producer-bound channels should restart at the new size.
    SessionRefreshed { size: ViewSize },

    /// The advertised renderer variant changed. Decode contexts are
    /// not hot-swappable; the host session must restart.
    SessionRestartRequired,
}

// ── DisplayHandle ────────────────────────────────────────────────

/// Cloneable command handle into a running controller.
#[derive(Clone)]
pub struct DisplayHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl DisplayHandle {
    /// Requests a renegotiation for the given viewport size.
    /// Ignored while paused.
    pub fn trigger_resize(&self, view: ViewSize) {
        let _ = self.tx.send(Command::TriggerResize(view));
    }

    pub fn set_paused(&self, paused: bool) {
        let _ = self.tx.send(Command::SetPaused(paused));
    }

    /// Answers a pending display type selection.
    pub fn resolve_display_type(&self, is_primary: bool) {
        let _ = self.tx.send(Command::ResolveDisplayType { is_primary });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

/// Receiving ends handed to the host when a controller is built.
pub struct DisplayHandles {
    pub handle: DisplayHandle,
    pub events: mpsc::UnboundedReceiver<DisplayEvent>,
    pub mode: watch::Receiver<NegotiationMode>,
    pub adjusted_size: watch::Receiver<ViewSize>,
}

// ── ResizeSession ────────────────────────────────────────────────

/// Ephemeral record of one scheduled resize. Lives from cooldown
/// entry until the commit (or supersession).
#[derive(Debug, Clone)]
struct ResizeSession {
    token: u64,
    view_size: ViewSize,
    adjusted_size: ViewSize,
    resolution_preset: i32,
    renderer: i32,
    is_responsive: bool,
    quality: i32,
    refresh_rate: i32,
    is_rear_display_enabled: bool,
    is_rear_display_prioritised: bool,
}

// ── DisplayController ────────────────────────────────────────────

/// The negotiation actor. Build with [`DisplayController::new`],
/// optionally seed with [`initialize`](Self::initialize), then drive
/// with [`run`](Self::run) on its own task.
pub struct DisplayController {
    config: Arc<dyn ConfigService>,
    prefs: Arc<dyn PreferenceStore>,
    stream: Arc<dyn StreamControl>,

    rx: mpsc::UnboundedReceiver<Command>,
    tx: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedSender<DisplayEvent>,
    mode_tx: watch::Sender<NegotiationMode>,
    size_tx: watch::Sender<ViewSize>,

    mode: NegotiationMode,
    remote: Option<RemoteDisplayState>,
    view_size: ViewSize,
    adjusted_size: ViewSize,
    token: u64,
    pending_view: Option<ViewSize>,
    cooldown: Option<ResizeSession>,
    paused: bool,
}

impl DisplayController {
    pub fn new(
        config: Arc<dyn ConfigService>,
        prefs: Arc<dyn PreferenceStore>,
        stream: Arc<dyn StreamControl>,
    ) -> (Self, DisplayHandles) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (mode_tx, mode_rx) = watch::channel(NegotiationMode::Initial);
        let (size_tx, size_rx) = watch::channel(ViewSize::new(1, 1));

        let controller = Self {
            config,
            prefs,
            stream,
            rx,
            tx: tx.clone(),
            events: events_tx,
            mode_tx,
            size_tx,
            mode: NegotiationMode::Initial,
            remote: None,
            view_size: ViewSize::new(1, 1),
            adjusted_size: ViewSize::new(1, 1),
            token: 0,
            pending_view: None,
            cooldown: None,
            paused: false,
        };

        let handles = DisplayHandles {
            handle: DisplayHandle { tx },
            events: events_rx,
            mode: mode_rx,
            adjusted_size: size_rx,
        };

        (controller, handles)
    }

    /// Fetches the initial remote state, commits it as the first
    /// normal state, brings the stream up, and queues an immediate
    /// renegotiation for the actual viewport.
    ///
    /// A fetch failure here is fatal to startup; the caller decides
    /// whether to retry.
    pub async fn initialize(&mut self, view: ViewSize) -> Result<(), VduError> {
        let state = self.config.fetch_display_state().await?;
        tracing::info!(
            "initial remote display state {}x{} renderer {}",
            state.width,
            state.height,
            state.renderer
        );
        self.remote = Some(state);
        self.commit_normal(view, None).await;
        self.start_resize(view);
        Ok(())
    }

    /// Runs the actor until [`DisplayHandle::shutdown`] is called.
    pub async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::TriggerResize(view) => {
                    if !self.paused {
                        self.start_resize(view);
                    }
                }
                Command::SetPaused(paused) => self.handle_set_paused(paused).await,
                Command::ResolveDisplayType { is_primary } => {
                    prefs::store_primary_display(self.prefs.as_ref(), is_primary);
                    let view = self.pending_view.unwrap_or(self.view_size);
                    if !self.paused {
                        self.start_resize(view);
                    }
                }
                Command::Shutdown => break,
                Command::FetchResolved {
                    token,
                    view,
                    result,
                } => self.handle_fetch_resolved(token, view, result).await,
                Command::CooldownElapsed { token } => self.handle_cooldown_elapsed(token),
                Command::PostResolved {
                    token,
                    payload,
                    result,
                } => self.handle_post_resolved(token, payload, result),
                Command::SettleElapsed { token } => self.handle_settle_elapsed(token).await,
            }
        }
    }

    // ── Resize flow ──────────────────────────────────────────────

    fn start_resize(&mut self, view: ViewSize) {
        // Coalesce: an identical size already scheduled in cooldown
        // keeps its timer.
        if self.mode == NegotiationMode::ResizeCooldown
            && let Some(session) = &self.cooldown
            && session.view_size == view
        {
            return;
        }

        // Superseded: the old session must not coalesce later
        // triggers onto a timer that will never be honored.
        self.cooldown = None;
        self.token += 1;
        let token = self.token;
        self.pending_view = Some(view);

        let config = self.config.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = config.fetch_display_state().await;
            let _ = tx.send(Command::FetchResolved {
                token,
                view,
                result,
            });
        });
    }

    async fn handle_fetch_resolved(
        &mut self,
        token: u64,
        view: ViewSize,
        result: Result<RemoteDisplayState, VduError>,
    ) {
        if token != self.token {
            return;
        }

        let state = match result {
            Ok(state) => state,
            Err(error) => {
                // Recoverable: last-known state stays authoritative,
                // the next viewport trigger retries.
                tracing::debug!("display state fetch failed: {error}");
                return;
            }
        };
        self.remote = Some(state.clone());

        let rear_enabled = state.is_rear_display_enabled();
        let rear_prioritised = state.is_rear_display_prioritised();
        let is_primary = if rear_enabled {
            prefs::read_primary_display(self.prefs.as_ref())
        } else {
            Some(true)
        };

        let Some(is_primary) = is_primary else {
            self.set_mode(NegotiationMode::DisplayTypeSelection);
            let _ = self.events.send(DisplayEvent::DisplayTypeSelectionRequired);
            return;
        };

        if !is_primary && !rear_prioritised {
            // The other display owns aspect selection; take the
            // remote's size verbatim.
            let size = ViewSize::new(state.width, state.height);
            self.commit_normal(view, Some(size)).await;
            return;
        }

        let basis = if state.is_responsive() {
            view
        } else {
            NON_RESPONSIVE_SIZE
        };
        let desired = sizing::compute_optimal_size(
            basis,
            state.resolution_preset,
            state.is_h264(),
            state.is_headless(),
        );

        self.set_mode(NegotiationMode::ResizeCooldown);
        self.cooldown = Some(ResizeSession {
            token,
            view_size: view,
            adjusted_size: desired,
            resolution_preset: state.resolution_preset,
            renderer: state.renderer,
            is_responsive: state.is_responsive(),
            quality: state.quality,
            refresh_rate: state.refresh_rate,
            is_rear_display_enabled: rear_enabled,
            is_rear_display_prioritised: rear_prioritised,
        });

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RESIZE_COOLDOWN).await;
            let _ = tx.send(Command::CooldownElapsed { token });
        });
    }

    fn handle_cooldown_elapsed(&mut self, token: u64) {
        // A superseding trigger mints a new live token before its
        // fetch resolves; a timer from the old generation must never
        // fire into it, even while the old session is still in place.
        if token != self.token {
            return;
        }
        if self.paused {
            return;
        }
        let Some(session) = self.cooldown.clone() else {
            return;
        };
        if self.mode != NegotiationMode::ResizeCooldown || session.token != token {
            return;
        }

        self.set_mode(NegotiationMode::ResizeInProgress);

        let is_h264 = session.renderer != 0;
        let payload = RemoteDisplayState {
            width: session.adjusted_size.width,
            height: session.adjusted_size.height,
            density: sizing::density_for_preset(session.resolution_preset, is_h264),
            resolution_preset: session.resolution_preset,
            renderer: session.renderer,
            is_headless: self.remote.as_ref().map_or(1, |s| s.is_headless),
            is_responsive: i32::from(session.is_responsive),
            is_h264: i32::from(is_h264),
            refresh_rate: session.refresh_rate,
            quality: session.quality,
            is_rear_display_enabled: i32::from(session.is_rear_display_enabled),
            is_rear_display_prioritised: i32::from(session.is_rear_display_prioritised),
        };

        tracing::info!(
            "posting adjusted display size {} (density {})",
            session.adjusted_size,
            payload.density
        );

        let config = self.config.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = config.post_display_state(&payload).await;
            let _ = tx.send(Command::PostResolved {
                token,
                payload,
                result,
            });
        });
    }

    fn handle_post_resolved(
        &mut self,
        token: u64,
        payload: RemoteDisplayState,
        result: Result<(), VduError>,
    ) {
        if token != self.token {
            return;
        }

        if let Err(error) = result {
            // Revert without applying; the next trigger retries.
            tracing::warn!("resize request failed: {error}");
            self.cooldown = None;
            self.set_mode(NegotiationMode::Normal);
            return;
        }

        self.remote = Some(payload);

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RESIZE_SETTLE).await;
            let _ = tx.send(Command::SettleElapsed { token });
        });
    }

    async fn handle_settle_elapsed(&mut self, token: u64) {
        if token != self.token {
            return;
        }
        let Some(session) = self.cooldown.clone() else {
            return;
        };

        if !self.paused {
            self.stream.close().await;
            let _ = self.events.send(DisplayEvent::SessionRefreshed {
                size: session.adjusted_size,
            });
        }

        self.commit_normal(session.view_size, Some(session.adjusted_size))
            .await;
    }

    // ── State commits ────────────────────────────────────────────

    async fn commit_normal(&mut self, view: ViewSize, adjusted: Option<ViewSize>) {
        let Some(state) = self.remote.clone() else {
            return;
        };

        self.cooldown = None;
        self.set_mode(NegotiationMode::Normal);
        self.view_size = view;
        self.adjusted_size = adjusted.unwrap_or(ViewSize::new(state.width, state.height));
        let _ = self.size_tx.send(self.adjusted_size);

        if !self.paused {
            self.ensure_stream(&state).await;
        }
    }

    async fn handle_set_paused(&mut self, paused: bool) {
        if paused == self.paused {
            return;
        }
        self.paused = paused;

        if paused {
            // Cancels the pending debounce; the settle guard keys off
            // the cleared session as well.
            self.cooldown = None;
            self.stream.close().await;
        } else {
            if let Some(state) = self.remote.clone() {
                self.ensure_stream(&state).await;
            }
            // A resize may have happened while paused.
            let view = self.view_size;
            self.start_resize(view);
        }
    }

    async fn ensure_stream(&mut self, state: &RemoteDisplayState) {
        match self.stream.ensure(state).await {
            Ok(()) => {}
            Err(VduError::SessionRestartRequired) => {
                let _ = self.events.send(DisplayEvent::SessionRestartRequired);
            }
            Err(error) => tracing::warn!("stream ensure failed: {error}"),
        }
    }

    fn set_mode(&mut self, next: NegotiationMode) {
        if self.mode == next {
            return;
        }
        if !self.mode.can_enter(next) {
            tracing::warn!("unexpected mode transition {} -> {}", self.mode, next);
        }
        tracing::debug!("negotiation mode {} -> {}", self.mode, next);
        self.mode = next;
        let _ = self.mode_tx.send(next);
    }
}

// ── Tests ────────────────────────────────────────────────────────
