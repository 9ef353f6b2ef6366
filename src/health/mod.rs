//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe the backing store (ping, or reconnect when unhealthy)
//!     → Connection flags updated inside the backend
//!
//! Passive signals:
//!     Command failure observed by the backend
//!     → Reconnect-worthy errors mark the connection unhealthy
//!     → ResilientClient serves degraded defaults and starts a background
//!       connection check; the backend is used again once it reconnects
//! ```
//!
//! # Design Decisions
//! - Connection health (transport) and breaker state (call outcomes) are
//!   tracked separately and combined in `HealthStatus`
//! - Reconnects happen off the request path

pub mod active;

pub use active::StoreHealthMonitor;
