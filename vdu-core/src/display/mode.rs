//! Negotiation mode state machine.
//!
//! Models the lifecycle of a display size negotiation. Transitions are
//! driven by the controller; this module only encodes which moves are
//! legal so the controller can assert them.

// ── NegotiationMode ──────────────────────────────────────────────

/// The current phase of display size negotiation.
///
/// ```text
///  Initial ──► Normal ──► ResizeCooldown ──► ResizeInProgress
///                ▲  ▲           │  ▲                │
///                │  │           ▼  │                │
///                │  └── DisplayTypeSelection        │
///                └──────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationMode {
    /// No negotiation has completed yet. Initial state.
    #[default]
    Initial,

    /// A negotiated size is committed and the stream is live.
    Normal,

    /// Waiting for the operator to pick primary or rear display.
    DisplayTypeSelection,

    /// A resize is scheduled; the debounce window is open.
    ResizeCooldown,

    /// The adjusted size has been posted; waiting for the device to
    /// apply it.
    ResizeInProgress,
}

impl std::fmt::Display for NegotiationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Normal => write!(f, "normal"),
            Self::DisplayTypeSelection => write!(f, "display_type_selection"),
            Self::ResizeCooldown => write!(f, "resize_cooldown"),
            Self::ResizeInProgress => write!(f, "resize_in_progress"),
        }
    }
}

impl NegotiationMode {
    /// Returns `true` while a resize is pending or being applied.
    ///
    /// Hosts use this to decide whether a loading overlay applies.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::ResizeCooldown | Self::ResizeInProgress)
    }

    /// Returns `true` once the first negotiation has completed.
    pub fn has_left_initial(&self) -> bool {
        !matches!(self, Self::Initial)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// A new trigger may supersede any in-flight negotiation, so most
    /// moves are legal. The two hard rules: `Initial` is never
    /// re-entered, and a post only ever starts from the cooldown.
    pub fn can_enter(&self, next: NegotiationMode) -> bool {
        use NegotiationMode::*;
        match (self, next) {
            (current, candidate) if *current == candidate => true,
            (_, Initial) => false,
            (current, ResizeInProgress) => matches!(current, ResizeCooldown),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mode = NegotiationMode::Initial;
        assert!(mode.can_enter(NegotiationMode::ResizeCooldown));
        assert!(NegotiationMode::ResizeCooldown.can_enter(NegotiationMode::ResizeInProgress));
        assert!(NegotiationMode::ResizeInProgress.can_enter(NegotiationMode::Normal));
    }

    #[test]
    fn post_cannot_start_outside_cooldown() {
        assert!(!NegotiationMode::Normal.can_enter(NegotiationMode::ResizeInProgress));
        assert!(!NegotiationMode::Initial.can_enter(NegotiationMode::ResizeInProgress));
    }

    #[test]
    fn selection_resumes_into_cooldown() {
        assert!(NegotiationMode::DisplayTypeSelection.can_enter(NegotiationMode::ResizeCooldown));
    }

    #[test]
    fn initial_is_never_re_entered() {
        assert!(!NegotiationMode::Normal.can_enter(NegotiationMode::Initial));
        assert!(!NegotiationMode::ResizeCooldown.can_enter(NegotiationMode::Initial));
    }

    #[test]
    fn loading_states() {
        assert!(NegotiationMode::ResizeCooldown.is_loading());
        assert!(NegotiationMode::ResizeInProgress.is_loading());
        assert!(!NegotiationMode::Normal.is_loading());
        assert!(!NegotiationMode::Initial.is_loading());
    }

    #[test]
    fn display_format() {
        assert_eq!(NegotiationMode::ResizeCooldown.to_string(), "resize_cooldown");
        assert_eq!(
            NegotiationMode::DisplayTypeSelection.to_string(),
            "display_type_selection"
        );
    }
}
