//! Replay buffer sampling fixed-length observation histories.
//!
//! Transitions are kept in a ring of fixed capacity. A sample for base index
//! `p` consists of the `history_length` observations ending at `p`, the
//! action, reward and done flag at `p`, and the history ending at `p + 1`.
//! Histories never mix two episodes, see [`BoundaryPolicy`].
mod base;
mod batch;
mod config;
pub use base::HistoryReplayBuffer;
pub use batch::HistoryBatch;
pub use config::{BoundaryPolicy, HistoryReplayBufferConfig};
