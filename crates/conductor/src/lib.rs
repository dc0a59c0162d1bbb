//! # Hostlink Conductor
//!
//! Remote-control bridge: accepts commands over WebSocket, resolves each to an
//! intent and runs it against the host.
//!
//! ## Architecture
//!
//! - **Device Backend**: host primitives, one per intent
//! - **Intent Registry**: intent → capability, with parameter shapes
//! - **Dispatcher**: shell policy, validation, invocation, normalization
//! - **Bridge**: drives session → interpretation → dispatch for one message
//! - **Server**: one task per WebSocket connection
//!
//! ## Example
//!
//! ```no_run
//! use hostlink_conductor::{Bridge, BridgeConfig, HostBackend};
//! use hostlink_intent::OsContext;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::default();
//!     let bridge = Arc::new(Bridge::from_config(
//!         &config,
//!         Arc::new(HostBackend::new()),
//!         None,
//!         OsContext::detect(),
//!     ));
//!
//!     let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
//!     hostlink_conductor::serve(listener, bridge).await
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod registry;
pub mod server;

pub use bridge::{Bridge, Reply};
pub use config::{BridgeConfig, ConfigError};
pub use device::{BackendError, DeviceBackend, HostBackend, RadioState};
pub use dispatcher::{Dispatch, Dispatcher, OutcomeKind};
pub use registry::{IntentRegistry, ParamError};
pub use server::serve;
