//! # Remote-Events Server Library
//!
//! This library implements the server side of the remote-events protocol:
//! a long-lived UDP service that lets phones, hardware remotes and other
//! input devices steer a host application. It reassembles per-client
//! packet streams into discrete input events and forwards them to the
//! host's action dispatcher.
//!
//! ## Core Responsibilities
//!
//! ### Session Management
//! Each remote device gets one session, identified by the token embedded
//! in its packets (or derived from its source address when it sends
//! none). Sessions are admitted up to a configured maximum, tracked for
//! liveness, and evicted when they time out or say goodbye.
//!
//! ### Event Translation and Dispatch
//! Raw packet bodies are buffered on the receive path and translated into
//! actions during the per-iteration maintenance sweep. At most one action
//! is handed to the host per sweep; held-button and pointer state is
//! cached for the host input layer to poll.
//!
//! ### Lifecycle
//! The listener loop runs as a single background tokio task and is the
//! only writer of session membership. Configuration problems are clamped
//! with a logged error; socket failures end the current run cleanly and
//! the host may start the server again. There is no partial-degraded
//! state.
//!
//! ## Module Organization
//!
//! - [`config`] — configuration snapshot and sanitization
//! - [`session`] — one remote client's buffered events and cached state
//! - [`registry`] — token-to-session map with bounded admission
//! - [`dispatch`] — action events and the host action surface
//! - [`server`] — lifecycle, listener loop, query surface
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::dispatch::ActionSink;
//! use server::server::{EventServer, NullAnnouncer};
//! use std::sync::Arc;
//!
//! struct Host;
//!
//! impl ActionSink for Host {
//!     fn execute_builtin(&self, command: &str) -> bool {
//!         println!("builtin: {}", command);
//!         true
//!     }
//!     fn translate_button_name(&self, _name: &str) -> u32 {
//!         0
//!     }
//!     fn dispatch_action(&self, _action_id: u32, name: &str) -> bool {
//!         println!("action: {}", name);
//!         true
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut server = EventServer::new(
//!         ServerConfig::default(),
//!         Arc::new(Host),
//!         Arc::new(NullAnnouncer),
//!     );
//!     server.start();
//!
//!     // ... the host runs; its input layer polls server.handle() ...
//!
//!     server.stop(true).await;
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod registry;
pub mod server;
pub mod session;
