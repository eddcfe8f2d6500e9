//! Decentralized actor with a target network.
use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::track_with_replace_substring,
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{ops::softmax_last_dim, VarBuilder, VarMap};
use log::info;
use maddpg_core::ActionSpace;

/// Bounds of the uniform noise of the Gumbel-softmax trick, avoiding `log(0)`.
const GUMBEL_EPS: f64 = 1e-10;

/// Policy of one agent and its target copy.
///
/// The policy network outputs the parameters of an action distribution over
/// the [`ActionSpace`] of the agent: logits for discrete actions, and means
/// followed by log standard deviations for continuous actions.
pub struct Actor<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
{
    device: Device,
    action_space: ActionSpace,
    tau: f64,
    grad_norm_clip: f64,

    varmap: VarMap,
    varmap_tgt: VarMap,
    pi: P,
    pi_tgt: P,

    opt: Optimizer, // target network is not optimized
}

impl<P> Actor<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: Clone,
{
    /// Constructs [`Actor`]. The target network starts as a copy of the policy.
    pub fn build(
        pi_config: P::Config,
        opt_config: &OptimizerConfig,
        action_space: ActionSpace,
        tau: f64,
        grad_norm_clip: f64,
        device: Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let pi = P::build(
            VarBuilder::from_varmap(&varmap, DType::F32, &device).set_prefix("actor"),
            pi_config.clone(),
        )?;
        let varmap_tgt = VarMap::new();
        let pi_tgt = P::build(
            VarBuilder::from_varmap(&varmap_tgt, DType::F32, &device).set_prefix("actor_tgt"),
            pi_config,
        )?;
        let opt = opt_config.build(varmap.all_vars())?;
        track_with_replace_substring(&varmap_tgt, &varmap, 1.0, ("actor", "actor_tgt"))?;
        info!(
            "Actor for {:?} with {} variables",
            action_space,
            varmap.all_vars().len()
        );

        Ok(Self {
            device,
            action_space,
            tau,
            grad_norm_clip,
            varmap,
            varmap_tgt,
            pi,
            pi_tgt,
            opt,
        })
    }
}

impl<P> Actor<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
{
    /// Returns the distribution parameters, `[batch_size, param_dim]`.
    pub fn forward(&self, obs: &Tensor) -> Result<Tensor> {
        let params = self.pi.forward(obs)?;
        debug_assert_eq!(params.dims()[1], self.action_space.param_dim());
        Ok(params)
    }

    /// Returns the distribution parameters of the target network.
    pub fn forward_tgt(&self, obs: &Tensor) -> Result<Tensor> {
        self.pi_tgt.forward(obs)
    }

    /// Converts distribution parameters into actions, `[batch_size, dim]`.
    ///
    /// With `explore`, discrete actions are soft one-hot vectors drawn with the
    /// Gumbel-softmax trick and continuous actions are reparameterized
    /// Gaussian samples. Both are differentiable with respect to `params`.
    /// Otherwise the softmax of the logits or the mean is returned.
    pub fn sample(&self, params: &Tensor, explore: bool) -> Result<Tensor> {
        match self.action_space {
            ActionSpace::Discrete(_) => {
                if explore {
                    let u = params
                        .rand_like(0.0, 1.0)?
                        .clamp(GUMBEL_EPS, 1.0 - GUMBEL_EPS)?;
                    let g = u.log()?.neg()?.log()?;
                    Ok(softmax_last_dim(&(params - g)?)?)
                } else {
                    Ok(softmax_last_dim(params)?)
                }
            }
            ActionSpace::Continuous(d) => {
                let mean = params.narrow(D::Minus1, 0, d)?;
                if explore {
                    let std = params.narrow(D::Minus1, d, d)?.exp()?;
                    Ok((&mean + (std * mean.randn_like(0.0, 1.0)?)?)?)
                } else {
                    Ok(mean)
                }
            }
        }
    }

    /// Returns actions of the policy.
    pub fn act(&self, obs: &Tensor, explore: bool) -> Result<Tensor> {
        self.sample(&self.forward(obs)?, explore)
    }

    /// Returns sampled actions of the target policy.
    pub fn act_tgt(&self, obs: &Tensor) -> Result<Tensor> {
        self.sample(&self.forward_tgt(obs)?, true)
    }

    /// Applies an optimization step with per-variable gradient clipping.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let vars = self.varmap.all_vars();
        self.opt
            .clipped_backward_step(loss, &vars, self.grad_norm_clip)
    }

    /// Moves the target network towards the policy by `tau`.
    pub fn soft_update(&mut self) -> Result<()> {
        track_with_replace_substring(&self.varmap_tgt, &self.varmap, self.tau, ("actor", "actor_tgt"))
    }

    /// Action space of the agent.
    pub fn action_space(&self) -> ActionSpace {
        self.action_space
    }

    /// Device of the networks.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Variables of the policy.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Variables of the target policy.
    pub fn get_varmap_tgt(&self) -> &VarMap {
        &self.varmap_tgt
    }
}
