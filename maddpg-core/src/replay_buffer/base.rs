//! Ring buffer of transitions sampled as observation histories.
use super::{BoundaryPolicy, HistoryBatch, HistoryReplayBufferConfig};
use crate::{error::MaddpgError, ExperienceBufferBase, Transition};
use anyhow::Result;
use log::trace;
use ndarray::{Array2, Array3, ArrayView1, ArrayViewMut2, Axis};
use rand::Rng;
use std::ops::Range;

/// Maximum number of draws per requested sample under [`BoundaryPolicy::Strict`].
const MAX_DRAWS_PER_SAMPLE: usize = 100;

/// A replay buffer that samples histories of consecutive observations.
///
/// Transitions are addressed by logical indices: `0` is the oldest retained
/// transition and `len() - 1` the latest one. Once the buffer is full, each
/// [`add`](Self::add) evicts the oldest transition.
///
/// Sampling only reads the buffer. Random draws take the generator as an
/// argument, so the buffers of other agents can be sampled through shared
/// references.
pub struct HistoryReplayBuffer {
    capacity: usize,
    history_length: usize,
    obs_dim: usize,
    act_dim: usize,
    boundary_policy: BoundaryPolicy,

    // Next slot to be written.
    i: usize,
    size: usize,

    obs: Vec<f32>,
    act: Vec<f32>,
    reward: Vec<f32>,
    is_done: Vec<i8>,
    is_terminal: Vec<i8>,
}

impl HistoryReplayBuffer {
    /// Builds an empty buffer.
    pub fn build(config: &HistoryReplayBufferConfig) -> Result<Self> {
        config.check()?;
        let capacity = config.capacity;

        Ok(Self {
            capacity,
            history_length: config.history_length,
            obs_dim: config.obs_dim,
            act_dim: config.act_dim,
            boundary_policy: config.boundary_policy,
            i: 0,
            size: 0,
            obs: vec![0.; capacity * config.obs_dim],
            act: vec![0.; capacity * config.act_dim],
            reward: vec![0.; capacity],
            is_done: vec![0; capacity],
            is_terminal: vec![0; capacity],
        })
    }

    /// Stores a transition, evicting the oldest one when the buffer is full.
    pub fn add(
        &mut self,
        obs: &[f32],
        act: &[f32],
        reward: f32,
        is_done: bool,
        is_terminal: bool,
    ) -> Result<()> {
        check_len("observation", obs, self.obs_dim)?;
        check_len("action", act, self.act_dim)?;

        let i = self.i;
        self.obs[i * self.obs_dim..(i + 1) * self.obs_dim].copy_from_slice(obs);
        self.act[i * self.act_dim..(i + 1) * self.act_dim].copy_from_slice(act);
        self.reward[i] = reward;
        self.is_done[i] = is_done as i8;
        self.is_terminal[i] = is_terminal as i8;

        self.i = (self.i + 1) % self.capacity;
        if self.size < self.capacity {
            self.size += 1;
        }

        Ok(())
    }

    /// Maximum number of transitions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of observations in a sampled history.
    pub fn history_length(&self) -> usize {
        self.history_length
    }

    /// Length of observation vectors.
    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    /// Length of action vectors.
    pub fn act_dim(&self) -> usize {
        self.act_dim
    }

    /// Physical slot to be written by the next [`add`](Self::add).
    pub fn next_index(&self) -> usize {
        self.i
    }

    /// Range of logical indices that can be the base of a sample.
    ///
    /// A base needs `history_length` transitions before it and a successor,
    /// so the range is `history_length..len() - 1`. It is empty while
    /// `len() <= history_length + 1`.
    pub fn valid_range(&self) -> Range<usize> {
        let end = self.size.saturating_sub(1);
        self.history_length..end.max(self.history_length)
    }

    /// Returns `true` if a sample can be drawn.
    pub fn can_sample(&self) -> bool {
        !self.valid_range().is_empty()
    }

    /// Returns the transition at logical index `p`.
    pub fn transition(&self, p: usize) -> Option<Transition> {
        if p >= self.size {
            return None;
        }
        let s = self.slot(p);
        Some(Transition {
            obs: self.obs_at(s).to_vec(),
            act: self.act_at(s).to_vec(),
            reward: self.reward[s],
            is_done: self.is_done[s] == 1,
            is_terminal: self.is_terminal[s] == 1,
        })
    }

    /// Returns `true` if `p` can be the base of a sample.
    ///
    /// Under [`BoundaryPolicy::Strict`], bases whose history would cross an
    /// episode boundary are not accepted.
    pub fn accepts(&self, p: usize) -> bool {
        self.valid_range().contains(&p)
            && (self.boundary_policy == BoundaryPolicy::ZeroPad || !self.is_cut(p))
    }

    /// Draws `batch_size` base indices uniformly from [`valid_range`](Self::valid_range).
    ///
    /// Under [`BoundaryPolicy::Strict`], bases whose history would cross an
    /// episode boundary are redrawn.
    pub fn make_index<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<usize>> {
        self.make_index_where(batch_size, rng, |_| true)
    }

    /// Draws `batch_size` base indices like [`make_index`](Self::make_index),
    /// redrawing those for which `pred` is `false`.
    ///
    /// Fails with [`MaddpgError::InsufficientHistory`] when the range is empty
    /// or no acceptable base is found within a bounded number of draws.
    pub fn make_index_where<R, F>(&self, batch_size: usize, rng: &mut R, pred: F) -> Result<Vec<usize>>
    where
        R: Rng,
        F: Fn(usize) -> bool,
    {
        let range = self.valid_range();
        if range.is_empty() {
            return Err(self.insufficient_history().into());
        }

        let mut ixs = Vec::with_capacity(batch_size);
        let mut n_draws = 0;
        while ixs.len() < batch_size {
            if n_draws == MAX_DRAWS_PER_SAMPLE * batch_size {
                return Err(self.insufficient_history().into());
            }
            n_draws += 1;
            let p = rng.gen_range(range.clone());
            if self.accepts(p) && pred(p) {
                ixs.push(p);
            }
        }
        if n_draws > batch_size {
            trace!("Drew {} indices in {} draws", batch_size, n_draws);
        }
        Ok(ixs)
    }

    /// Builds a batch from the given logical base indices.
    pub fn sample_index(&self, ixs: &[usize]) -> Result<HistoryBatch> {
        let range = self.valid_range();
        if range.is_empty() {
            return Err(self.insufficient_history().into());
        }

        let n = ixs.len();
        let h = self.history_length;
        let mut obs = Array3::zeros((n, h, self.obs_dim));
        let mut next_obs = Array3::zeros((n, h, self.obs_dim));
        let mut act = Array2::zeros((n, self.act_dim));
        let mut reward = Vec::with_capacity(n);
        let mut is_done = Vec::with_capacity(n);

        for (b, &p) in ixs.iter().enumerate() {
            if !range.contains(&p) {
                return Err(MaddpgError::InvalidIndex {
                    index: p,
                    start: range.start,
                    end: range.end,
                }
                .into());
            }
            if self.boundary_policy == BoundaryPolicy::Strict && self.is_cut(p) {
                return Err(MaddpgError::EpisodeBoundaryViolation(p).into());
            }

            self.fill_history(p, obs.index_axis_mut(Axis(0), b));

            // No observation after the last step of an episode is stored.
            let p_next = if self.ends_episode(p) { p } else { p + 1 };
            self.fill_history(p_next, next_obs.index_axis_mut(Axis(0), b));

            let s = self.slot(p);
            act.row_mut(b).assign(&ArrayView1::from(self.act_at(s)));
            reward.push(self.reward[s]);
            is_done.push(self.is_done[s]);
        }

        Ok(HistoryBatch {
            obs,
            act,
            next_obs,
            reward,
            is_done,
            ixs: ixs.to_vec(),
        })
    }

    /// Samples a batch of `batch_size` histories.
    pub fn sample<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Result<HistoryBatch> {
        let ixs = self.make_index(batch_size, rng)?;
        self.sample_index(&ixs)
    }

    fn insufficient_history(&self) -> MaddpgError {
        MaddpgError::InsufficientHistory {
            len: self.size,
            history_length: self.history_length,
        }
    }

    /// Physical slot of logical index `p`.
    fn slot(&self, p: usize) -> usize {
        (self.i + self.capacity - self.size + p) % self.capacity
    }

    fn obs_at(&self, s: usize) -> &[f32] {
        &self.obs[s * self.obs_dim..(s + 1) * self.obs_dim]
    }

    fn act_at(&self, s: usize) -> &[f32] {
        &self.act[s * self.act_dim..(s + 1) * self.act_dim]
    }

    fn ends_episode(&self, p: usize) -> bool {
        let s = self.slot(p);
        self.is_done[s] == 1 || self.is_terminal[s] == 1
    }

    /// First logical index of the history ending at `p`.
    ///
    /// Requires `p + 1 >= history_length`.
    fn window_start(&self, p: usize) -> usize {
        let first = p + 1 - self.history_length;
        let mut start = p;
        while start > first && !self.ends_episode(start - 1) {
            start -= 1;
        }
        start
    }

    /// Returns `true` if the history ending at `p` is shortened by an episode start.
    fn is_cut(&self, p: usize) -> bool {
        self.window_start(p) + self.history_length > p + 1
    }

    /// Writes the history ending at `p` into `out`, which must be zero.
    fn fill_history(&self, p: usize, mut out: ArrayViewMut2<f32>) {
        let start = self.window_start(p);
        for q in start..=p {
            let row = self.history_length - 1 - (p - q);
            out.row_mut(row)
                .assign(&ArrayView1::from(self.obs_at(self.slot(q))));
        }
    }
}

impl ExperienceBufferBase for HistoryReplayBuffer {
    type Item = Transition;

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        self.add(&tr.obs, &tr.act, tr.reward, tr.is_done, tr.is_terminal)
    }

    fn len(&self) -> usize {
        self.size
    }
}

fn check_len(what: &str, v: &[f32], dim: usize) -> Result<()> {
    if v.len() != dim {
        return Err(MaddpgError::ShapeMismatch {
            what: what.to_string(),
            expected: vec![dim],
            got: vec![v.len()],
        }
        .into());
    }
    Ok(())
}
