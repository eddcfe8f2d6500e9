//! Batch of histories sampled from the replay buffer.
use ndarray::{Array2, Array3};

/// A batch of transitions with observation histories.
///
/// All fields are row aligned: row `b` of every array belongs to the base
/// index `ixs[b]`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBatch {
    /// Histories ending at the base indices, `[batch_size, history_length, obs_dim]`.
    pub obs: Array3<f32>,

    /// Actions at the base indices, `[batch_size, act_dim]`.
    pub act: Array2<f32>,

    /// Histories ending at the successors, `[batch_size, history_length, obs_dim]`.
    pub next_obs: Array3<f32>,

    /// Rewards at the base indices.
    pub reward: Vec<f32>,

    /// Done flags at the base indices.
    pub is_done: Vec<i8>,

    /// Logical base indices of the samples.
    pub ixs: Vec<usize>,
}

impl HistoryBatch {
    /// Unpacks the data `(o_t, a_t, r_t, o_t+1, is_done_t)`.
    pub fn unpack(self) -> (Array3<f32>, Array2<f32>, Vec<f32>, Array3<f32>, Vec<i8>) {
        (self.obs, self.act, self.reward, self.next_obs, self.is_done)
    }

    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch holds no sample.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }
}
