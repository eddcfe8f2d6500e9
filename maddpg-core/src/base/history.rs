//! Rolling observation history for acting in an environment.
use crate::error::MaddpgError;
use anyhow::Result;
use ndarray::{Array2, Array3, Axis};
use std::collections::VecDeque;

/// The last `history_length` observations of the current episode.
///
/// The window is laid out like the histories sampled from
/// [`HistoryReplayBuffer`](crate::replay_buffer::HistoryReplayBuffer): the
/// latest observation is the last row and rows before the episode start are
/// zero.
#[derive(Debug, Clone)]
pub struct ObsHistory {
    history_length: usize,
    obs_dim: usize,
    buf: VecDeque<Vec<f32>>,
}

impl ObsHistory {
    /// Creates an empty history.
    pub fn new(history_length: usize, obs_dim: usize) -> Self {
        Self {
            history_length,
            obs_dim,
            buf: VecDeque::with_capacity(history_length),
        }
    }

    /// Appends an observation, dropping the oldest one if the window is full.
    pub fn push(&mut self, obs: &[f32]) -> Result<()> {
        if obs.len() != self.obs_dim {
            return Err(MaddpgError::ShapeMismatch {
                what: "observation".to_string(),
                expected: vec![self.obs_dim],
                got: vec![obs.len()],
            }
            .into());
        }
        if self.buf.len() == self.history_length {
            self.buf.pop_front();
        }
        self.buf.push_back(obs.to_vec());
        Ok(())
    }

    /// Forgets all observations. Call at the start of an episode.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Number of observations of the current episode in the window.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no observation has been pushed since the last reset.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the window as an array of shape `[history_length, obs_dim]`.
    pub fn to_array(&self) -> Array2<f32> {
        let mut out = Array2::zeros((self.history_length, self.obs_dim));
        let offset = self.history_length - self.buf.len();
        for (j, obs) in self.buf.iter().enumerate() {
            for (k, &v) in obs.iter().enumerate() {
                out[[offset + j, k]] = v;
            }
        }
        out
    }

    /// Returns the window as a batch of one, `[1, history_length, obs_dim]`.
    pub fn to_batch(&self) -> Array3<f32> {
        self.to_array().insert_axis(Axis(0))
    }
}
