//! Bounded TCP stream manager.
//!
//! Accepts connections on one port, keeps at most a fixed number of them as
//! claimed streams, and drives them from a single-threaded event loop through
//! edge-triggered readable/writable notifications.

pub mod config;
pub mod echo;
pub mod lifecycle;
pub mod manager;
pub mod net;
pub mod observability;
pub mod runtime;
pub mod stream;

pub use config::ManagerConfig;
pub use echo::{EchoService, EchoStats};
pub use manager::{ManagerOptions, ManagerStats, StreamManager};
pub use net::{EphemeralPorts, ListenerCallback, ListenerError};
pub use runtime::{Runtime, SimRuntime, TcpRuntime};
pub use stream::{Interests, StreamCallback, StreamError, StreamEvent, StreamHandle, StreamState};
