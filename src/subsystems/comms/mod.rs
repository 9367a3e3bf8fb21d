//! Comms subsystem: external transports that feed the relay handler.
//!
//! Each channel is a [`Component`](crate::subsystems::runtime::Component);
//! [`start`] spawns them under one shutdown token and returns a handle
//! whose `join` surfaces the first channel error.

#[cfg(feature = "channel-telegram")]
pub mod telegram;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::subsystems::relay::RelayHandler;
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};

/// Spawn every enabled channel.
pub fn start(
    relay: Arc<RelayHandler>,
    telegram_token: String,
    shutdown: CancellationToken,
) -> SubsystemHandle {
    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-telegram")]
    components.push(Box::new(telegram::TelegramChannel::new("telegram0", telegram_token, relay)));

    #[cfg(not(feature = "channel-telegram"))]
    let _ = (relay, telegram_token);

    info!(channels = components.len(), "comms subsystem starting");
    spawn_components(components, shutdown)
}
