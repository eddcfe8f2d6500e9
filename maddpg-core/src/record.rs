//! Key-value records of training diagnostics.
//!
//! Agents report the outcome of an update as a [`Record`], which a driver can
//! hand to whatever recorder it uses.
//!
//! ```rust
//! use maddpg_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("critic_loss", 0.25);
//! record.insert("agent", RecordValue::String("agent_0".to_string()));
//! assert_eq!(record.get_scalar("critic_loss").unwrap(), 0.25);
//! ```
mod base;
pub use base::{Record, RecordValue};
