//! Configuration of [`HistoryReplayBuffer`](super::HistoryReplayBuffer).
use crate::error::MaddpgError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// How histories are built around episode boundaries.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum BoundaryPolicy {
    /// Rows of a history before the start of the episode are zero.
    ZeroPad,

    /// Histories must lie inside one episode.
    ///
    /// Index draws skip bases whose history would be cut and sampling such a
    /// base explicitly fails with
    /// [`EpisodeBoundaryViolation`](crate::MaddpgError::EpisodeBoundaryViolation).
    Strict,
}

/// Configuration of [`HistoryReplayBuffer`](super::HistoryReplayBuffer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct HistoryReplayBufferConfig {
    /// Maximum number of transitions.
    pub capacity: usize,

    /// Number of consecutive observations in a sampled history.
    pub history_length: usize,

    /// Length of an observation vector.
    pub obs_dim: usize,

    /// Length of an action vector.
    pub act_dim: usize,

    /// Handling of episode boundaries inside histories.
    pub boundary_policy: BoundaryPolicy,
}

impl Default for HistoryReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            history_length: 1,
            obs_dim: 1,
            act_dim: 1,
            boundary_policy: BoundaryPolicy::ZeroPad,
        }
    }
}

impl HistoryReplayBufferConfig {
    /// Sets the capacity of the replay buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the history length.
    pub fn history_length(mut self, history_length: usize) -> Self {
        self.history_length = history_length;
        self
    }

    /// Sets the length of observation vectors.
    pub fn obs_dim(mut self, obs_dim: usize) -> Self {
        self.obs_dim = obs_dim;
        self
    }

    /// Sets the length of action vectors.
    pub fn act_dim(mut self, act_dim: usize) -> Self {
        self.act_dim = act_dim;
        self
    }

    /// Sets the episode boundary policy.
    pub fn boundary_policy(mut self, boundary_policy: BoundaryPolicy) -> Self {
        self.boundary_policy = boundary_policy;
        self
    }

    /// Checks the constraints between the values.
    pub fn check(&self) -> Result<()> {
        let msg = if self.history_length == 0 {
            "history_length must be positive".to_string()
        } else if self.history_length > self.capacity {
            format!(
                "history_length ({}) exceeds capacity ({})",
                self.history_length, self.capacity
            )
        } else if self.obs_dim == 0 || self.act_dim == 0 {
            "obs_dim and act_dim must be positive".to_string()
        } else {
            return Ok(());
        };
        Err(MaddpgError::InvalidConfig(msg).into())
    }

    /// Constructs [`HistoryReplayBufferConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`HistoryReplayBufferConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_config() -> Result<()> {
        let config = HistoryReplayBufferConfig::default()
            .capacity(100)
            .history_length(4)
            .obs_dim(3)
            .act_dim(2)
            .boundary_policy(BoundaryPolicy::Strict);

        let dir = TempDir::new("history_replay_buffer")?;
        let path = dir.path().join("history_replay_buffer.yaml");
        config.save(&path)?;
        let config_ = HistoryReplayBufferConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[test]
    fn test_check() {
        assert!(HistoryReplayBufferConfig::default().check().is_ok());
        assert!(HistoryReplayBufferConfig::default()
            .history_length(0)
            .check()
            .is_err());
        assert!(HistoryReplayBufferConfig::default()
            .capacity(3)
            .history_length(4)
            .check()
            .is_err());
    }
}
