//! Optimizers.
use anyhow::Result;
use candle_core::{backprop::GradStore, Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::adam::{Adam, ParamsAdam};
use log::trace;
use serde::{Deserialize, Serialize};

/// Configuration of optimizer for training neural networks in an agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,
        #[serde(default = "default_beta1")]
        /// Coefficient of the running average of the gradient.
        beta1: f64,
        #[serde(default = "default_beta2")]
        /// Coefficient of the running average of the squared gradient.
        beta2: f64,
        #[serde(default = "default_eps")]
        /// Term added to the denominator.
        eps: f64,
        #[serde(default = "default_weight_decay")]
        /// Weight decay.
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl OptimizerConfig {
    /// Constructs an optimizer of the given variables.
    pub fn build(&self, vars: Vec<Var>) -> Result<Optimizer> {
        match &self {
            OptimizerConfig::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr: *lr,
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    weight_decay: *weight_decay,
                };
                let opt = AdamW::new(vars, params)?;
                Ok(Optimizer::AdamW(opt))
            }
            OptimizerConfig::Adam { lr } => {
                let params = ParamsAdam {
                    lr: *lr,
                    ..ParamsAdam::default()
                };
                let opt = Adam::new(vars, params)?;
                Ok(Optimizer::Adam(opt))
            }
        }
    }

    /// Override learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::AdamW {
                lr: _,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            },
            Self::Adam { lr: _ } => Self::Adam { lr },
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam { lr: 1e-2 }
    }
}

/// Optimizers.
///
/// This is a thin wrapper of the optimizers of `candle_nn` and `candle_optimisers`.
pub enum Optimizer {
    /// AdamW optimizer.
    AdamW(AdamW),

    /// Adam optimizer.
    Adam(Adam),
}

impl Optimizer {
    /// Applies a backward step pass after clipping the gradient of each variable.
    ///
    /// The gradient of every variable in `vars` whose L2 norm exceeds
    /// `max_norm` is rescaled to norm `max_norm`. Gradients of variables
    /// outside `vars` are left untouched and ignored by the optimizer.
    pub fn clipped_backward_step(&mut self, loss: &Tensor, vars: &[Var], max_norm: f64) -> Result<()> {
        let mut grads = loss.backward()?;
        clip_grad_norm(&mut grads, vars, max_norm)?;
        self.step(&grads)
    }

    /// Applies an optimization step with the given gradients.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match self {
            Self::AdamW(opt) => Ok(opt.step(grads)?),
            Self::Adam(opt) => Ok(opt.step(grads)?),
        }
    }
}

/// Clips the gradient of each variable to L2 norm `max_norm`.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f64) -> Result<()> {
    for var in vars {
        let clipped = match grads.get(var.as_tensor()) {
            Some(grad) => {
                let norm = grad.sqr()?.sum_all()?.sqrt()?.to_scalar::<f32>()? as f64;
                if norm > max_norm {
                    trace!("Clip gradient norm {} to {}", norm, max_norm);
                    Some((grad * (max_norm / norm))?)
                } else {
                    None
                }
            }
            None => None,
        };
        if let Some(grad) = clipped {
            grads.insert(var.as_tensor(), grad);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_clip_grad_norm() -> Result<()> {
        let x = Var::from_tensor(&Tensor::from_slice(&[3.0f32, 4.0], (2,), &Device::Cpu)?)?;
        let y = Var::from_tensor(&Tensor::from_slice(&[0.1f32, 0.1], (2,), &Device::Cpu)?)?;

        // d/dx = 2 * [3, 4] has norm 10, d/dy = 2 * [0.1, 0.1] is small.
        let loss = (x.as_tensor().sqr()?.sum_all()? + y.as_tensor().sqr()?.sum_all()?)?;
        let mut grads = loss.backward()?;
        clip_grad_norm(&mut grads, &[x.clone(), y.clone()], 0.5)?;

        let gx = grads.get(x.as_tensor()).unwrap().to_vec1::<f32>()?;
        assert!((gx[0] - 0.3).abs() < 1e-5);
        assert!((gx[1] - 0.4).abs() < 1e-5);

        let gy = grads.get(y.as_tensor()).unwrap().to_vec1::<f32>()?;
        assert!((gy[0] - 0.2).abs() < 1e-5);
        assert_eq!(grads.get(x.as_tensor()).unwrap().dtype(), DType::F32);
        Ok(())
    }

    #[test]
    fn test_learning_rate_override() {
        let config = OptimizerConfig::default().learning_rate(0.5);
        assert_eq!(config, OptimizerConfig::Adam { lr: 0.5 });

        let config = OptimizerConfig::AdamW {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.01,
        }
        .learning_rate(0.5);
        assert!(matches!(
            config,
            OptimizerConfig::AdamW { lr, weight_decay, .. } if lr == 0.5 && weight_decay == 0.01
        ));
    }

    #[test]
    fn test_adamw_step() -> Result<()> {
        let x = Var::from_tensor(&Tensor::from_slice(&[1.0f32, -1.0], (2,), &Device::Cpu)?)?;
        let config = OptimizerConfig::AdamW {
            lr: 0.1,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        };
        let mut opt = config.build(vec![x.clone()])?;
        let loss = x.as_tensor().sqr()?.sum_all()?;
        opt.clipped_backward_step(&loss, &[x.clone()], 0.5)?;

        let v = x.as_tensor().to_vec1::<f32>()?;
        assert!(v[0] < 1.0);
        assert!(v[1] > -1.0);
        Ok(())
    }
}
