//! WebSocket client for the moltis gateway.
//!
//! [`GatewayClient`] owns one logical connection to the gateway. It performs
//! the `hello` / `hello-ok` handshake, correlates `req` frames with their
//! `res` by id, fans `event` frames out to listeners and reconnects after an
//! established connection drops.
//!
//! ```no_run
//! # async fn run() -> moltis_gateway_client::Result<()> {
//! use moltis_gateway_client::{GatewayClient, GatewayClientConfig};
//! use moltis_protocol::monitor::SessionsListParams;
//!
//! let client = GatewayClient::new(GatewayClientConfig::from_env())?;
//! client.connect().await?;
//! let _sub = client.on_event(|event| println!("{}", event.event));
//! let sessions = client.list_sessions(&SessionsListParams::default()).await?;
//! println!("{} sessions", sessions.len());
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
pub mod error;
mod listeners;
mod pending;
pub mod state;

pub use {
    client::GatewayClient,
    config::{GatewayClientConfig, ReconnectPolicy},
    error::{Error, Result},
    listeners::Subscription,
    state::ConnectionState,
};
