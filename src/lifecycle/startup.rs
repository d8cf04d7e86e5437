//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the TCP runtime from validated configuration
//! - Create the stream manager and attach the echo service
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener opens last, once everything behind it exists

use std::io;
use std::net::{AddrParseError, IpAddr};

use thiserror::Error;

use crate::config::ManagerConfig;
use crate::echo::EchoService;
use crate::manager::{ManagerOptions, StreamManager};
use crate::net::{EphemeralPorts, ListenerError};
use crate::runtime::TcpRuntime;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid bind address: {0}")]
    BindAddress(#[from] AddrParseError),

    #[error("failed to create event loop: {0}")]
    Runtime(#[from] io::Error),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Everything the run loop drives.
pub struct Daemon {
    pub manager: StreamManager,
    pub echo: EchoService,
}

pub fn start(config: &ManagerConfig) -> Result<Daemon, StartupError> {
    let bind_address: IpAddr = config.listener.bind_address.parse()?;
    let runtime = TcpRuntime::new(bind_address, config.io.max_inbound_bytes)?;

    let mut ports = EphemeralPorts::starting_at(config.listener.ephemeral_port_base);
    let mut manager = StreamManager::new(runtime, ManagerOptions::from(config), &mut ports);
    let echo = EchoService::attach(&mut manager)?;

    tracing::info!(
        bind_address = %bind_address,
        port = manager.listener_port(),
        capacity = config.listener.max_concurrent_streams,
        "Daemon started"
    );
    Ok(Daemon { manager, echo })
}
