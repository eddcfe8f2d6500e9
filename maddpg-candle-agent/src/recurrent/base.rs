use super::RecurrentMlpConfig;
use crate::model::{SubModel1, SubModel2};
use anyhow::{Context, Result};
use candle_core::{Device, Module, Tensor, D};
use candle_nn::{linear, lstm, LSTMConfig, Linear, VarBuilder, LSTM, RNN};

/// LSTM encoder followed by a multilayer perceptron with ReLU activations.
///
/// The LSTM runs over a history of shape `[batch_size, history_length, in_dim]`
/// and its last hidden state is fed to the MLP. As a [`SubModel2`], the
/// second input (e.g. actions) is concatenated to the hidden state.
pub struct RecurrentMlp {
    config: RecurrentMlpConfig,
    device: Device,
    lstm: LSTM,
    layers: Vec<Linear>,
}

impl RecurrentMlp {
    fn build_(vb: VarBuilder, config: RecurrentMlpConfig) -> Result<Self> {
        let device = vb.device().clone();
        let lstm = lstm(
            config.in_dim,
            config.lstm_units,
            LSTMConfig::default(),
            vb.pp("lstm"),
        )?;

        let mut dims = vec![config.lstm_units + config.aux_dim];
        dims.extend(config.units.iter().copied());
        dims.push(config.out_dim);
        let vb = vb.pp("mlp");
        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, w)| linear(w[0], w[1], vb.pp(format!("ln{}", i))))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            device,
            lstm,
            layers,
        })
    }

    /// Returns the last hidden state of the LSTM, `[batch_size, lstm_units]`.
    pub fn encode(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = xs.to_device(&self.device)?;
        let states = self.lstm.seq(&xs)?;
        let last = states.last().context("Empty observation history")?;
        Ok(last.h().clone())
    }

    fn mlp(&self, xs: Tensor) -> Result<Tensor> {
        let n_layers = self.layers.len();
        let mut xs = xs;
        for (i, layer) in self.layers.iter().enumerate() {
            xs = layer.forward(&xs)?;
            if i + 1 < n_layers {
                xs = xs.relu()?;
            }
        }
        Ok(xs)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RecurrentMlpConfig {
        &self.config
    }
}

impl SubModel1 for RecurrentMlp {
    type Config = RecurrentMlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        Self::build_(vb, config)
    }

    fn forward(&self, xs: &Self::Input) -> Result<Tensor> {
        self.mlp(self.encode(xs)?)
    }
}

impl SubModel2 for RecurrentMlp {
    type Config = RecurrentMlpConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        Self::build_(vb, config)
    }

    fn forward(&self, xs: &Self::Input1, aux: &Self::Input2) -> Result<Tensor> {
        let h = self.encode(xs)?;
        let aux = aux.to_device(&self.device)?;
        self.mlp(Tensor::cat(&[&h, &aux], D::Minus1)?)
    }
}
