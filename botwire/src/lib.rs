//! Botwire
//!
//! A client runtime for RLBot-style match servers. User agents exchange
//! length-prefixed binary frames with an external server over a single TCP
//! connection; this crate handles everything between the socket and the
//! agent callbacks — framing, pooled buffers, fan-out of tick state to
//! agent worker threads, fan-in of their outputs to a single writer, and
//! the control-plane handshake that spawns agents from configuration.
//!
//! The transport runs on one service thread per connection, driving a
//! completion-based I/O runtime (io_uring on Linux, IOCP on Windows via
//! compio). The primary agent context runs inline on that thread, saving a
//! context switch on every tick; further contexts get dedicated threads.
//!
//! ```no_run
//! use botwire::{Agent, AgentManager, ConnectOptions};
//! use botwire::schema::*;
//!
//! struct Idle;
//!
//! impl Agent for Idle {
//!     fn update(
//!         &mut self,
//!         _packet: &GamePacket,
//!         _prediction: Option<&BallPrediction>,
//!         _field: &FieldInfo,
//!         _config: &MatchConfiguration,
//!     ) {
//!     }
//!
//!     fn output(&mut self, _index: u32) -> ControllerState {
//!         ControllerState::default()
//!     }
//! }
//!
//! let manager = AgentManager::new(false, |_indices: botwire::IndexSet, _team, _name: String| {
//!     Box::new(Idle) as Box<dyn botwire::Agent>
//! });
//! manager.connect(ConnectOptions::new().with_agent_id("example/idle"))?;
//! manager.join();
//! # Ok::<(), botwire::Error>(())
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod agent;
pub mod manager;
pub mod schema;
pub mod transport;

mod context;
mod router;

pub use agent::{Agent, AgentFactory, AgentOutbox, IndexSet};
pub use manager::{AgentManager, ConnectOptions};
pub use transport::{Connection, Handler, NullHandler, State};

pub use botwire_core as core;
pub use botwire_core::error::{Error, Result};
pub use botwire_core::logging;
pub use botwire_core::message::{Kind, Message};
