//! Centralized critic with a target network.
use crate::{
    model::SubModel2,
    opt::{Optimizer, OptimizerConfig},
    util::track_with_replace_substring,
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;

/// Action-value function of one agent and its target copy.
///
/// The inputs are the joint observation histories `[batch_size, history_length, joint_obs_dim]`
/// and the joint actions `[batch_size, joint_act_dim]` of all agents, or only
/// those of the agent itself for a local critic.
pub struct Critic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    tau: f64,
    grad_norm_clip: f64,
    varmap: VarMap,
    varmap_tgt: VarMap,
    q: Q,
    q_tgt: Q,
    opt: Optimizer,
}

impl<Q> Critic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: Clone,
{
    /// Constructs [`Critic`]. The target network starts as a copy of the critic.
    pub fn build(
        q_config: Q::Config,
        opt_config: &OptimizerConfig,
        tau: f64,
        grad_norm_clip: f64,
        device: Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let q = Q::build(
            VarBuilder::from_varmap(&varmap, DType::F32, &device).set_prefix("critic"),
            q_config.clone(),
        )?;
        let varmap_tgt = VarMap::new();
        let q_tgt = Q::build(
            VarBuilder::from_varmap(&varmap_tgt, DType::F32, &device).set_prefix("critic_tgt"),
            q_config,
        )?;
        let opt = opt_config.build(varmap.all_vars())?;
        track_with_replace_substring(&varmap_tgt, &varmap, 1.0, ("critic", "critic_tgt"))?;
        info!("Critic with {} variables", varmap.all_vars().len());

        Ok(Self {
            tau,
            grad_norm_clip,
            varmap,
            varmap_tgt,
            q,
            q_tgt,
            opt,
        })
    }
}

impl<Q> Critic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    /// Returns action values, `[batch_size]`.
    pub fn qvals(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        Ok(self.q.forward(obs, act)?.squeeze(D::Minus1)?)
    }

    /// Returns action values of the target network, `[batch_size]`.
    pub fn qvals_tgt(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        Ok(self.q_tgt.forward(obs, act)?.squeeze(D::Minus1)?)
    }

    /// Applies an optimization step with per-variable gradient clipping.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let vars = self.varmap.all_vars();
        self.opt
            .clipped_backward_step(loss, &vars, self.grad_norm_clip)
    }

    /// Moves the target network towards the critic by `tau`.
    pub fn soft_update(&mut self) -> Result<()> {
        track_with_replace_substring(
            &self.varmap_tgt,
            &self.varmap,
            self.tau,
            ("critic", "critic_tgt"),
        )
    }

    /// Variables of the critic.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Variables of the target critic.
    pub fn get_varmap_tgt(&self) -> &VarMap {
        &self.varmap_tgt
    }
}
