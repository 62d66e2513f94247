//! VDU viewer library surface.
//!
//! The binary wires these together; they are exposed as a library so
//! the integration points stay testable.

pub mod config;
pub mod loader;
pub mod overlay;
pub mod supervisor;
pub mod surface;
