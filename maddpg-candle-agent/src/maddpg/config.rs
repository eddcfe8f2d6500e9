//! Configuration of MADDPG agents.
use crate::{opt::OptimizerConfig, Device};
use anyhow::Result;
use maddpg_core::{
    replay_buffer::{BoundaryPolicy, HistoryReplayBufferConfig},
    MaddpgError,
};
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// How the batches of the agents in an update are aligned.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum SampleAlignment {
    /// Every agent's buffer is read at the indices drawn by the updating agent.
    Synchronized,

    /// Every agent's buffer is read at its own random indices.
    ///
    /// Rewards and done flags still come from the updating agent's batch.
    Independent,
}

/// Configuration of [`Maddpg`](super::Maddpg).
///
/// The same configuration is usually shared by all agents of an environment.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MaddpgConfig {
    /// Learning rate of the actor and the critic.
    ///
    /// Overrides the learning rate in [`opt_config`](Self::opt_config).
    pub learning_rate: f64,

    /// Optimizer of the actor and the critic.
    pub opt_config: OptimizerConfig,

    /// Discount factor.
    pub gamma: f64,

    /// Batch size.
    pub batch_size: usize,

    /// Maximum number of steps in an episode.
    ///
    /// Not used by the agent itself; kept so that a driver reads it from the
    /// same file.
    pub max_episode_len: usize,

    /// Number of consecutive observations fed to the networks.
    pub history_length: usize,

    /// Width of the hidden layers and the LSTM.
    pub num_units: usize,

    /// Maximum L2 norm of the gradient of each variable.
    pub grad_norm_clip: f64,

    /// Soft update coefficient of the target networks.
    pub tau: f64,

    /// Capacity of the replay buffer.
    pub buffer_capacity: usize,

    /// Handling of episode boundaries in replay histories.
    pub boundary_policy: BoundaryPolicy,

    /// Alignment of the batches of all agents.
    pub sample_alignment: SampleAlignment,

    /// Number of target action draws averaged in the TD target.
    pub num_target_samples: usize,

    /// If `true`, the critic only sees the history and action of its own agent.
    pub local_q_func: bool,

    /// Coefficient of the penalty on the squared policy output.
    pub policy_reg: f64,

    /// Parameters are updated at steps `t` with `t % update_interval == 0`.
    pub update_interval: usize,

    /// Minimum number of transitions in the buffer before the first update.
    pub min_transitions_warmup: usize,

    /// Seed of the index sampler. The agent index is added to it.
    pub seed: u64,

    /// Device of the networks.
    pub device: Device,
}

impl Default for MaddpgConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-2,
            opt_config: OptimizerConfig::default(),
            gamma: 0.95,
            batch_size: 1024,
            max_episode_len: 25,
            history_length: 1,
            num_units: 64,
            grad_norm_clip: 0.5,
            tau: 0.01,
            buffer_capacity: 1_000_000,
            boundary_policy: BoundaryPolicy::ZeroPad,
            sample_alignment: SampleAlignment::Synchronized,
            num_target_samples: 1,
            local_q_func: false,
            policy_reg: 1e-3,
            update_interval: 1,
            min_transitions_warmup: 0,
            seed: 42,
            device: Device::Cpu,
        }
    }
}

impl MaddpgConfig {
    /// Sets the learning rate.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.learning_rate = v;
        self
    }

    /// Sets the optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the maximum episode length.
    pub fn max_episode_len(mut self, v: usize) -> Self {
        self.max_episode_len = v;
        self
    }

    /// Sets the history length.
    pub fn history_length(mut self, v: usize) -> Self {
        self.history_length = v;
        self
    }

    /// Sets the width of the networks.
    pub fn num_units(mut self, v: usize) -> Self {
        self.num_units = v;
        self
    }

    /// Sets the gradient clipping norm.
    pub fn grad_norm_clip(mut self, v: f64) -> Self {
        self.grad_norm_clip = v;
        self
    }

    /// Sets the soft update coefficient.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Sets the capacity of the replay buffer.
    pub fn buffer_capacity(mut self, v: usize) -> Self {
        self.buffer_capacity = v;
        self
    }

    /// Sets the episode boundary policy of the replay buffer.
    pub fn boundary_policy(mut self, v: BoundaryPolicy) -> Self {
        self.boundary_policy = v;
        self
    }

    /// Sets the sample alignment.
    pub fn sample_alignment(mut self, v: SampleAlignment) -> Self {
        self.sample_alignment = v;
        self
    }

    /// Sets the number of target action draws.
    pub fn num_target_samples(mut self, v: usize) -> Self {
        self.num_target_samples = v;
        self
    }

    /// Sets the local critic mode.
    pub fn local_q_func(mut self, v: bool) -> Self {
        self.local_q_func = v;
        self
    }

    /// Sets the policy regularization coefficient.
    pub fn policy_reg(mut self, v: f64) -> Self {
        self.policy_reg = v;
        self
    }

    /// Sets the update interval.
    pub fn update_interval(mut self, v: usize) -> Self {
        self.update_interval = v;
        self
    }

    /// Sets the minimum number of transitions before the first update.
    pub fn min_transitions_warmup(mut self, v: usize) -> Self {
        self.min_transitions_warmup = v;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Checks the values of the configuration.
    pub fn check(&self) -> Result<()> {
        let msg = if !(self.gamma > 0.0 && self.gamma < 1.0) {
            format!("gamma must be in (0, 1), got {}", self.gamma)
        } else if self.batch_size == 0 {
            "batch_size must be positive".to_string()
        } else if self.history_length == 0 || self.history_length > self.buffer_capacity {
            format!(
                "history_length must be in [1, {}], got {}",
                self.buffer_capacity, self.history_length
            )
        } else if !(self.grad_norm_clip > 0.0) {
            format!("grad_norm_clip must be positive, got {}", self.grad_norm_clip)
        } else if !(self.tau > 0.0 && self.tau <= 1.0) {
            format!("tau must be in (0, 1], got {}", self.tau)
        } else if self.num_target_samples == 0 {
            "num_target_samples must be positive".to_string()
        } else if self.update_interval == 0 {
            "update_interval must be positive".to_string()
        } else {
            return Ok(());
        };
        Err(MaddpgError::InvalidConfig(msg).into())
    }

    /// Optimizer configuration of the actor and the critic with
    /// [`learning_rate`](Self::learning_rate) applied.
    pub fn optimizer_config(&self) -> OptimizerConfig {
        self.opt_config.clone().learning_rate(self.learning_rate)
    }

    /// Replay buffer configuration for an agent with the given dimensions.
    pub fn replay_buffer_config(&self, obs_dim: usize, act_dim: usize) -> HistoryReplayBufferConfig {
        HistoryReplayBufferConfig::default()
            .capacity(self.buffer_capacity)
            .history_length(self.history_length)
            .obs_dim(obs_dim)
            .act_dim(act_dim)
            .boundary_policy(self.boundary_policy)
    }

    /// Constructs [`MaddpgConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`MaddpgConfig`] as YAML file.
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
    fn test_serde_maddpg_config() -> Result<()> {
        let config = MaddpgConfig::default()
            .batch_size(32)
            .history_length(5)
            .boundary_policy(BoundaryPolicy::Strict)
            .sample_alignment(SampleAlignment::Independent)
            .local_q_func(true);

        let dir = TempDir::new("maddpg_config")?;
        let path = dir.path().join("maddpg_config.yaml");
        println!("{:?}", path);

        config.save(&path)?;
        let config_ = MaddpgConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[test]
    fn test_check() {
        assert!(MaddpgConfig::default().check().is_ok());

        let err = MaddpgConfig::default().gamma(1.0).check().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MaddpgError>(),
            Some(MaddpgError::InvalidConfig(_))
        ));
        assert!(MaddpgConfig::default().batch_size(0).check().is_err());
        assert!(MaddpgConfig::default()
            .buffer_capacity(4)
            .history_length(5)
            .check()
            .is_err());
        assert!(MaddpgConfig::default().tau(0.0).check().is_err());
    }

    #[test]
    fn test_optimizer_config() -> Result<()> {
        let adamw = OptimizerConfig::AdamW {
            lr: 1.0,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.01,
        };
        let config = MaddpgConfig::default().opt_config(adamw).learning_rate(0.05);
        assert!(matches!(
            config.optimizer_config(),
            OptimizerConfig::AdamW { lr, .. } if lr == 0.05
        ));
        assert_eq!(
            MaddpgConfig::default().optimizer_config(),
            OptimizerConfig::Adam { lr: 1e-2 }
        );

        let dir = TempDir::new("maddpg_config")?;
        let path = dir.path().join("maddpg_adamw.yaml");
        config.save(&path)?;
        assert_eq!(MaddpgConfig::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_replay_buffer_config() {
        let config = MaddpgConfig::default().history_length(3).buffer_capacity(10);
        let rb = config.replay_buffer_config(4, 2);
        assert_eq!(rb.capacity, 10);
        assert_eq!(rb.history_length, 3);
        assert_eq!(rb.obs_dim, 4);
        assert_eq!(rb.act_dim, 2);
    }
}
