//! Botwire Core
//!
//! This crate contains the runtime-agnostic core building blocks:
//! - Pooled, refcount-shared I/O buffers (`buffer`, `pool`)
//! - Zero-copy message views over pooled buffers (`message`)
//! - Length-prefixed frame codec: reader reassembly + writer queue (`codec`)
//! - Waitable user-space events (`event`)
//! - Server endpoint resolution with environment defaults (`endpoint`)
//! - TCP socket tuning for low-latency framed traffic (`tcp`)
//! - Error taxonomy (`error`) and log-level setup (`logging`)

// The buffer module needs raw pointer access for completion-based I/O
#![cfg_attr(not(test), deny(unsafe_code))]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

pub mod buffer;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod logging;
pub mod message;
pub mod pool;
pub mod tcp;

// A small prelude for downstream crates. Kept minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::buffer::{Buffer, FrameSlice, ReadSlice};
    pub use crate::codec::{Dialect, FrameReader, WriteQueue};
    pub use crate::endpoint::ServerEndpoint;
    pub use crate::error::{Error, Result};
    pub use crate::event::Event;
    pub use crate::message::{Kind, Message};
    pub use crate::pool::{BufferPools, EncodeBuffer, Pool, PoolRef};
}
