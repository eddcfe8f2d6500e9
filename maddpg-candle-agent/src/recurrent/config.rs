use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`RecurrentMlp`](super::RecurrentMlp).
pub struct RecurrentMlpConfig {
    /// Length of each observation in the history.
    pub(super) in_dim: usize,

    /// Size of the hidden state of the LSTM.
    pub(super) lstm_units: usize,

    /// Widths of the hidden layers of the MLP.
    pub(super) units: Vec<usize>,

    /// Length of the vector concatenated to the encoded history.
    ///
    /// Zero for actors, the joint action length for critics.
    pub(super) aux_dim: usize,

    /// Output dimension.
    pub(super) out_dim: usize,
}

impl RecurrentMlpConfig {
    /// Creates configuration of a network without auxiliary input.
    pub fn new(in_dim: usize, lstm_units: usize, units: Vec<usize>, out_dim: usize) -> Self {
        Self {
            in_dim,
            lstm_units,
            units,
            aux_dim: 0,
            out_dim,
        }
    }

    /// Sets the length of the auxiliary input.
    pub fn aux_dim(mut self, v: usize) -> Self {
        self.aux_dim = v;
        self
    }

    /// Configuration of a policy network.
    ///
    /// The LSTM and both hidden layers have `num_units` units.
    pub fn actor(obs_dim: usize, out_dim: usize, num_units: usize) -> Self {
        Self::new(obs_dim, num_units, vec![num_units, num_units], out_dim)
    }

    /// Configuration of an action-value network with a scalar output.
    pub fn critic(obs_dim: usize, act_dim: usize, num_units: usize) -> Self {
        Self::new(obs_dim, num_units, vec![num_units, num_units], 1).aux_dim(act_dim)
    }

    /// Returns the output dimension.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Constructs [`RecurrentMlpConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`RecurrentMlpConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
