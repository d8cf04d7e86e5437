//! Daemon lifecycle.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → TcpRuntime → StreamManager → EchoService (listener open)
//!
//! Run loop (main.rs):
//!     interval tick → manager.turn()
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger → loop exits → manager.release()
//! ```
//!
//! # Design Decisions
//! - Ordered startup: runtime first, then manager, then listener
//! - The manager is single-threaded; signals reach it only through the
//!   shutdown channel polled by the run loop

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, Daemon, StartupError};
