#![warn(missing_docs)]
//! Backend-independent building blocks of recurrent MADDPG agents.
//!
//! The crate provides the history-aware replay buffer each agent owns,
//! the transition and action-space types shared by every backend, and
//! the [`Record`](record::Record) type in which agents report diagnostics.
//!
//! Tensor computation lives in backend crates such as `maddpg-candle-agent`.
pub mod error;
pub mod record;
pub mod replay_buffer;

mod base;
pub use base::{ActionSpace, ExperienceBufferBase, ObsHistory, Transition};
pub use error::MaddpgError;
