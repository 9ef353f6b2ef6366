//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build store client → Start monitor & admin API
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Tasks exit → Process exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then store client, then background tasks
//! - An unreachable store never aborts startup; the in-memory store takes over

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
