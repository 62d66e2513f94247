//! Display negotiation: sizing, mode tracking, preferences, and the
//! controller that drives the resize protocol against the device.

pub mod controller;
pub mod mode;
pub mod prefs;
pub mod sizing;

pub use controller::{DisplayController, DisplayEvent, DisplayHandle, DisplayHandles};
pub use mode::NegotiationMode;
pub use prefs::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
pub use sizing::{ViewSize, compute_optimal_size};
