use super::{Actor, Critic, MaddpgConfig, Peers, SampleAlignment};
use crate::{
    model::{SubModel1, SubModel2},
    recurrent::{RecurrentMlp, RecurrentMlpConfig},
    util::{self, array2_to_tensor, array3_to_tensor, td_target, tensor_to_array2, vec_to_tensor},
};
use anyhow::{Context, Result};
use candle_core::{Device, Tensor, D};
use candle_nn::loss::mse;
use log::{debug, info, trace};
use maddpg_core::{
    record::{Record, RecordValue},
    replay_buffer::{BoundaryPolicy, HistoryReplayBuffer},
    ActionSpace, ExperienceBufferBase, MaddpgError,
};
use ndarray::{Array2, Array3};
use rand::{rngs::StdRng, SeedableRng};

/// Diagnostics of an update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateStats {
    /// Mean squared TD error of the critic.
    pub critic_loss: f32,

    /// Loss of the actor including the policy regularization.
    pub actor_loss: f32,

    /// Mean of the TD targets.
    pub mean_target_q: f32,

    /// Mean of the sampled rewards.
    pub mean_reward: f32,

    /// Mean of the target critic values at the successor histories.
    pub mean_target_q_next: f32,

    /// Standard deviation of the TD targets.
    pub std_target_q: f32,
}

impl UpdateStats {
    /// Returns `[critic_loss, actor_loss, mean_target_q, mean_reward, mean_target_q_next, std_target_q]`.
    pub fn to_array(&self) -> [f32; 6] {
        [
            self.critic_loss,
            self.actor_loss,
            self.mean_target_q,
            self.mean_reward,
            self.mean_target_q_next,
            self.std_target_q,
        ]
    }
}

impl From<UpdateStats> for Record {
    fn from(stats: UpdateStats) -> Self {
        Record::from_slice(&[
            ("critic_loss", RecordValue::Scalar(stats.critic_loss)),
            ("actor_loss", RecordValue::Scalar(stats.actor_loss)),
            ("mean_target_q", RecordValue::Scalar(stats.mean_target_q)),
            ("mean_reward", RecordValue::Scalar(stats.mean_reward)),
            ("mean_target_q_next", RecordValue::Scalar(stats.mean_target_q_next)),
            ("std_target_q", RecordValue::Scalar(stats.std_target_q)),
        ])
    }
}

/// Row-aligned batches of all agents.
struct JointBatch {
    obs: Vec<Tensor>,
    act: Vec<Tensor>,
    next_obs: Vec<Tensor>,
    reward: Tensor,
    is_done: Tensor,
}

/// One agent of recurrent MADDPG.
///
/// The actor maps the observation history of this agent to its action. The
/// critic evaluates the histories and actions of all agents. Both come with
/// target networks that follow them by soft updates.
pub struct Maddpg<P, Q>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    name: String,
    agent_index: usize,
    obs_dims: Vec<usize>,
    act_spaces: Vec<ActionSpace>,
    config: MaddpgConfig,
    actor: Actor<P>,
    critic: Critic<Q>,
    buffer: HistoryReplayBuffer,
    rng: StdRng,
    replay_sample_index: Option<Vec<usize>>,
    train: bool,
}

impl<P, Q> Maddpg<P, Q>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P::Config: Clone,
    Q::Config: Clone,
{
    /// Constructs an agent.
    ///
    /// `obs_dims` and `act_spaces` describe every agent of the environment,
    /// `agent_index` selects this one. The networks are built from
    /// `pi_config` and `q_config`, whose dimensions must agree with
    /// [`ActionSpace::param_dim`] and with the critic inputs.
    pub fn build(
        name: impl Into<String>,
        obs_dims: &[usize],
        act_spaces: &[ActionSpace],
        agent_index: usize,
        config: &MaddpgConfig,
        pi_config: P::Config,
        q_config: Q::Config,
    ) -> Result<Self> {
        let name = name.into();
        check_agents(obs_dims, act_spaces, agent_index)?;
        config.check()?;

        let device: Device = config.device.try_into()?;
        let opt_config = config.optimizer_config();
        let action_space = act_spaces[agent_index];
        let actor = Actor::build(
            pi_config,
            &opt_config,
            action_space,
            config.tau,
            config.grad_norm_clip,
            device.clone(),
        )?;
        let critic = Critic::build(q_config, &opt_config, config.tau, config.grad_norm_clip, device)?;
        let buffer = HistoryReplayBuffer::build(
            &config.replay_buffer_config(obs_dims[agent_index], action_space.dim()),
        )?;
        let rng = StdRng::seed_from_u64(config.seed + agent_index as u64);
        info!(
            "Built agent {} ({}/{}), {:?}, local_q_func = {}",
            name,
            agent_index,
            obs_dims.len(),
            action_space,
            config.local_q_func
        );

        Ok(Self {
            name,
            agent_index,
            obs_dims: obs_dims.to_vec(),
            act_spaces: act_spaces.to_vec(),
            config: config.clone(),
            actor,
            critic,
            buffer,
            rng,
            replay_sample_index: None,
            train: true,
        })
    }
}

impl Maddpg<RecurrentMlp, RecurrentMlp> {
    /// Constructs an agent with [`RecurrentMlp`] actor and critic of width
    /// [`MaddpgConfig::num_units`].
    pub fn build_recurrent(
        name: impl Into<String>,
        obs_dims: &[usize],
        act_spaces: &[ActionSpace],
        agent_index: usize,
        config: &MaddpgConfig,
    ) -> Result<Self> {
        check_agents(obs_dims, act_spaces, agent_index)?;
        let (q_obs_dim, q_act_dim) = if config.local_q_func {
            (obs_dims[agent_index], act_spaces[agent_index].dim())
        } else {
            (obs_dims.iter().sum(), ActionSpace::joint_dim(act_spaces))
        };
        let pi_config = RecurrentMlpConfig::actor(
            obs_dims[agent_index],
            act_spaces[agent_index].param_dim(),
            config.num_units,
        );
        let q_config = RecurrentMlpConfig::critic(q_obs_dim, q_act_dim, config.num_units);
        Self::build(
            name,
            obs_dims,
            act_spaces,
            agent_index,
            config,
            pi_config,
            q_config,
        )
    }
}

impl<P, Q> Maddpg<P, Q>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    /// Returns actions for a batch of observation histories `[batch_size, history_length, obs_dim]`.
    ///
    /// Actions are sampled in training mode and deterministic in evaluation mode.
    pub fn action(&self, obs: &Array3<f32>) -> Result<Array2<f32>> {
        let (batch_size, history_length, obs_dim) = obs.dim();
        if history_length != self.config.history_length || obs_dim != self.obs_dim() {
            return Err(MaddpgError::ShapeMismatch {
                what: "observation history".to_string(),
                expected: vec![batch_size, self.config.history_length, self.obs_dim()],
                got: obs.shape().to_vec(),
            }
            .into());
        }
        let obs = array3_to_tensor(obs, self.actor.device())?;
        let act = self.actor.act(&obs, self.train)?;
        tensor_to_array2(&act)
    }

    /// Stores a transition in the replay buffer.
    pub fn experience(
        &mut self,
        obs: &[f32],
        act: &[f32],
        reward: f32,
        is_done: bool,
        is_terminal: bool,
    ) -> Result<()> {
        self.buffer.add(obs, act, reward, is_done, is_terminal)
    }

    /// Clears the sample cursor before a training round.
    pub fn preupdate(&mut self) {
        self.replay_sample_index = None;
    }

    /// Trains the critic and the actor on a batch of all agents.
    ///
    /// Returns `None` without touching any parameter when `t` is not a
    /// multiple of [`MaddpgConfig::update_interval`] or the replay buffers
    /// cannot provide a sample yet. Under [`BoundaryPolicy::Strict`] the
    /// latter includes buffers whose episodes are all shorter than the
    /// history.
    pub fn update(&mut self, peers: &Peers<P, Q>, t: usize) -> Result<Option<UpdateStats>> {
        if t % self.config.update_interval != 0 {
            return Ok(None);
        }
        if !self.buffer.can_sample() || self.buffer.len() < self.config.min_transitions_warmup {
            trace!("{}: skip update with {} transitions", self.name, self.buffer.len());
            return Ok(None);
        }
        self.check_peers(peers)?;

        trace!("Draw sample indices");
        let index_sets = match self.draw_index_sets(peers)? {
            Some(index_sets) => index_sets,
            None => {
                trace!("{}: skip update without acceptable bases", self.name);
                return Ok(None);
            }
        };
        self.replay_sample_index = Some(index_sets[self.agent_index].clone());

        trace!("Sample batches");
        let batch = self.joint_batch(peers, &index_sets)?;

        trace!("Compute target values");
        let (target_q, target_q_next) = self.target_q(peers, &batch)?;

        trace!("Update critic");
        let critic_loss = self.update_critic(&batch, &target_q)?;

        trace!("Update actor");
        let actor_loss = self.update_actor(&batch)?;

        trace!("Soft update of target networks");
        self.actor.soft_update()?;
        self.critic.soft_update()?;

        let stats = UpdateStats {
            critic_loss,
            actor_loss,
            mean_target_q: util::mean(&target_q)?,
            mean_reward: util::mean(&batch.reward)?,
            mean_target_q_next: util::mean(&target_q_next)?,
            std_target_q: util::std(&target_q)?,
        };
        debug!("{} at step {}: {:?}", self.name, t, stats);

        Ok(Some(stats))
    }

    fn check_peers(&self, peers: &Peers<P, Q>) -> Result<()> {
        if peers.agent_index() != self.agent_index || peers.n_agents() != self.n_agents() {
            return Err(MaddpgError::InvalidConfig(format!(
                "agent {} of {} got peers of agent {} of {}",
                self.agent_index,
                self.n_agents(),
                peers.agent_index(),
                peers.n_agents()
            ))
            .into());
        }
        Ok(())
    }

    /// Draws the base indices read from the buffer of every agent.
    ///
    /// Under [`SampleAlignment::Synchronized`] all agents share the indices
    /// drawn from this agent's buffer. With [`BoundaryPolicy::Strict`] only
    /// bases whose history is intact in every buffer are drawn. Returns
    /// `None` if some buffer has no acceptable base.
    fn draw_index_sets(&mut self, peers: &Peers<P, Q>) -> Result<Option<Vec<Vec<usize>>>> {
        let n = self.n_agents();
        let batch_size = self.config.batch_size;
        let others: Vec<&HistoryReplayBuffer> =
            (0..n).filter_map(|i| peers.get(i)).map(|agent| &agent.buffer).collect();

        let ixs = match (self.config.sample_alignment, self.config.boundary_policy) {
            (SampleAlignment::Synchronized, BoundaryPolicy::Strict) => {
                self.buffer.make_index_where(batch_size, &mut self.rng, |p| {
                    others.iter().all(|buffer| buffer.accepts(p))
                })
            }
            _ => self.buffer.make_index(batch_size, &mut self.rng),
        };
        let ixs = match or_insufficient(ixs)? {
            Some(ixs) => ixs,
            None => return Ok(None),
        };

        let mut index_sets = Vec::with_capacity(n);
        for i in 0..n {
            if i == self.agent_index || self.config.sample_alignment == SampleAlignment::Synchronized {
                index_sets.push(ixs.clone());
                continue;
            }
            let buffer = &peers.get(i).with_context(|| format!("No agent {}", i))?.buffer;
            match or_insufficient(buffer.make_index(batch_size, &mut self.rng))? {
                Some(ixs_i) => index_sets.push(ixs_i),
                None => return Ok(None),
            }
        }
        Ok(Some(index_sets))
    }

    /// Returns this agent for `i == agent_index` and the peer `i` otherwise.
    fn agent<'s>(&'s self, peers: &Peers<'s, P, Q>, i: usize) -> Result<&'s Self> {
        if i == self.agent_index {
            Ok(self)
        } else {
            peers.get(i).with_context(|| format!("No agent {}", i))
        }
    }

    fn joint_batch(&self, peers: &Peers<P, Q>, index_sets: &[Vec<usize>]) -> Result<JointBatch> {
        let device = self.actor.device();
        let n = self.n_agents();
        let mut obs = Vec::with_capacity(n);
        let mut act = Vec::with_capacity(n);
        let mut next_obs = Vec::with_capacity(n);
        let mut own = None;

        for (i, ixs) in index_sets.iter().enumerate() {
            let batch = self.agent(peers, i)?.buffer.sample_index(ixs)?;
            let (o, a, r, o_next, d) = batch.unpack();
            obs.push(array3_to_tensor(&o, device)?);
            act.push(array2_to_tensor(&a, device)?);
            next_obs.push(array3_to_tensor(&o_next, device)?);
            if i == self.agent_index {
                own = Some((r, d));
            }
        }

        let (reward, is_done) = own.context("No batch of the updating agent")?;
        Ok(JointBatch {
            obs,
            act,
            next_obs,
            reward: vec_to_tensor(&reward, device)?,
            is_done: vec_to_tensor(&is_done, device)?,
        })
    }

    /// Inputs of the critic, joint or local depending on `local_q_func`.
    fn critic_inputs(&self, obs: &[Tensor], act: &[Tensor]) -> Result<(Tensor, Tensor)> {
        if self.config.local_q_func {
            Ok((obs[self.agent_index].clone(), act[self.agent_index].clone()))
        } else {
            Ok((Tensor::cat(obs, D::Minus1)?, Tensor::cat(act, D::Minus1)?))
        }
    }

    /// Returns the TD targets and the target values at the successors, both
    /// averaged over `num_target_samples` draws of the target actions.
    fn target_q(&self, peers: &Peers<P, Q>, batch: &JointBatch) -> Result<(Tensor, Tensor)> {
        let mut target_q = batch.reward.zeros_like()?;
        let mut target_q_next = batch.reward.zeros_like()?;

        for _ in 0..self.config.num_target_samples {
            let act_next = (0..self.n_agents())
                .map(|i| self.agent(peers, i)?.actor.act_tgt(&batch.next_obs[i]))
                .collect::<Result<Vec<_>>>()?;
            let (obs, act) = self.critic_inputs(&batch.next_obs, &act_next)?;
            let q_next = self.critic.qvals_tgt(&obs, &act)?;
            let tgt = td_target(&batch.reward, &batch.is_done, self.config.gamma, &q_next)?;
            target_q = (target_q + tgt)?;
            target_q_next = (target_q_next + q_next)?;
        }

        let k = self.config.num_target_samples as f64;
        Ok(((target_q / k)?.detach(), (target_q_next / k)?.detach()))
    }

    fn update_critic(&mut self, batch: &JointBatch, target_q: &Tensor) -> Result<f32> {
        let (obs, act) = self.critic_inputs(&batch.obs, &batch.act)?;
        let q = self.critic.qvals(&obs, &act)?;
        let loss = mse(&q, target_q)?;
        self.critic.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }

    fn update_actor(&mut self, batch: &JointBatch) -> Result<f32> {
        let params = self.actor.forward(&batch.obs[self.agent_index])?;
        let mut act = batch.act.clone();
        act[self.agent_index] = self.actor.sample(&params, true)?;

        let (obs, act) = self.critic_inputs(&batch.obs, &act)?;
        let pg_loss = self.critic.qvals(&obs, &act)?.mean_all()?.neg()?;
        let reg = (params.sqr()?.mean_all()? * self.config.policy_reg)?;
        let loss = (pg_loss + reg)?;
        self.actor.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }

    /// Switches to training mode, in which actions are sampled.
    pub fn train(&mut self) {
        self.train = true;
    }

    /// Switches to evaluation mode, in which actions are deterministic.
    pub fn eval(&mut self) {
        self.train = false;
    }

    /// Returns `true` in training mode.
    pub fn is_train(&self) -> bool {
        self.train
    }

    /// Name of the agent.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the agent in its environment.
    pub fn agent_index(&self) -> usize {
        self.agent_index
    }

    /// Number of agents in the environment.
    pub fn n_agents(&self) -> usize {
        self.obs_dims.len()
    }

    /// Length of the observations of this agent.
    pub fn obs_dim(&self) -> usize {
        self.obs_dims[self.agent_index]
    }

    /// Action space of this agent.
    pub fn action_space(&self) -> ActionSpace {
        self.act_spaces[self.agent_index]
    }

    /// Configuration of the agent.
    pub fn config(&self) -> &MaddpgConfig {
        &self.config
    }

    /// The actor and its target.
    pub fn actor(&self) -> &Actor<P> {
        &self.actor
    }

    /// The critic and its target.
    pub fn critic(&self) -> &Critic<Q> {
        &self.critic
    }

    /// The replay buffer.
    pub fn buffer(&self) -> &HistoryReplayBuffer {
        &self.buffer
    }

    /// Base indices drawn by the last update, `None` before it.
    pub fn replay_sample_index(&self) -> Option<&[usize]> {
        self.replay_sample_index.as_deref()
    }
}

/// Maps [`MaddpgError::InsufficientHistory`] to `None`.
fn or_insufficient(ixs: Result<Vec<usize>>) -> Result<Option<Vec<usize>>> {
    match ixs {
        Ok(ixs) => Ok(Some(ixs)),
        Err(e) => match e.downcast_ref::<MaddpgError>() {
            Some(MaddpgError::InsufficientHistory {
                len,
                history_length,
            }) => {
                trace!(
                    "No acceptable base in {} transitions with history_length = {}",
                    len,
                    history_length
                );
                Ok(None)
            }
            _ => Err(e),
        },
    }
}

fn check_agents(obs_dims: &[usize], act_spaces: &[ActionSpace], agent_index: usize) -> Result<()> {
    if obs_dims.len() != act_spaces.len() {
        return Err(MaddpgError::InvalidConfig(format!(
            "{} observation sizes for {} action spaces",
            obs_dims.len(),
            act_spaces.len()
        ))
        .into());
    }
    if agent_index >= obs_dims.len() {
        return Err(MaddpgError::InvalidConfig(format!(
            "agent index {} out of {} agents",
            agent_index,
            obs_dims.len()
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{maddpg::update_all, opt::OptimizerConfig};
    use candle_nn::VarMap;

    type Agent = Maddpg<RecurrentMlp, RecurrentMlp>;

    fn agents(config: &MaddpgConfig) -> Result<Vec<Agent>> {
        let obs_dims = [3, 2];
        let act_spaces = [ActionSpace::Discrete(3), ActionSpace::Continuous(2)];
        (0..2)
            .map(|i| Agent::build_recurrent(format!("agent_{}", i), &obs_dims, &act_spaces, i, config))
            .collect()
    }

    fn fill(agents: &mut [Agent], n: usize, reward: f32) -> Result<()> {
        for k in 0..n {
            let v = (k % 7) as f32 / 7.0;
            let ends = k % 10 == 9;
            agents[0].experience(&[v, -v, 1.0], &[1.0, 0.0, 0.0], reward, false, ends)?;
            agents[1].experience(&[v, 0.5], &[v, -v], reward, false, ends)?;
        }
        Ok(())
    }

    fn snapshot(varmap: &VarMap) -> Vec<(String, Vec<f32>)> {
        let data = varmap.data().lock().unwrap();
        let mut vars: Vec<_> = data
            .iter()
            .map(|(k, v)| {
                let t = v.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap();
                (k.clone(), t)
            })
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        vars
    }

    /// Adds `n` transitions whose observations start with the step number
    /// `k + 1`. Agent 1 is done at the steps where `done1` holds, both agents
    /// reach the end of an episode where `ends` holds.
    fn fill_steps(
        agents: &mut [Agent],
        n: usize,
        done1: impl Fn(usize) -> bool,
        ends: impl Fn(usize) -> bool,
    ) -> Result<()> {
        for k in 0..n {
            let s = (k + 1) as f32;
            agents[0].experience(&[s, 0.0, 0.0], &[1.0, 0.0, 0.0], 1.0, false, ends(k))?;
            agents[1].experience(&[s, 0.0], &[0.0, 0.0], 1.0, done1(k), ends(k))?;
        }
        Ok(())
    }

    fn column(t: &Tensor) -> Result<Vec<f32>> {
        Ok(t.narrow(2, 0, 1)?.flatten_all()?.to_vec1::<f32>()?)
    }

    fn config() -> MaddpgConfig {
        MaddpgConfig::default()
            .batch_size(8)
            .history_length(3)
            .num_units(8)
            .buffer_capacity(100)
            .tau(0.1)
    }

    #[test]
    fn test_warmup_returns_none() -> Result<()> {
        let config = config().history_length(5);
        let mut agents = agents(&config)?;
        fill(&mut agents, 3, 1.0)?;

        let stats = update_all(&mut agents, 0)?;
        assert_eq!(stats, vec![None, None]);
        assert!(agents[0].replay_sample_index().is_none());

        // The range of bases is still empty with `history_length + 1` transitions.
        fill(&mut agents, 3, 1.0)?;
        assert_eq!(agents[0].buffer().len(), 6);
        assert_eq!(update_all(&mut agents, 0)?, vec![None, None]);
        Ok(())
    }

    #[test]
    fn test_update_interval_and_min_transitions() -> Result<()> {
        let config = config().update_interval(4).min_transitions_warmup(50);
        let mut agents = agents(&config)?;
        fill(&mut agents, 30, 1.0)?;
        assert_eq!(update_all(&mut agents, 4)?, vec![None, None]);

        fill(&mut agents, 30, 1.0)?;
        assert_eq!(update_all(&mut agents, 3)?, vec![None, None]);
        assert!(update_all(&mut agents, 8)?.iter().all(|s| s.is_some()));
        Ok(())
    }

    #[test]
    fn test_diagnostics() -> Result<()> {
        let mut agents = agents(&config())?;
        fill(&mut agents, 40, 1.0)?;

        let stats = update_all(&mut agents, 0)?;
        assert_eq!(stats.len(), 2);
        for s in stats {
            let s = s.expect("an update");
            let values = s.to_array();
            assert_eq!(values.len(), 6);
            assert!(values.iter().all(|v| v.is_finite()));
            assert!((s.mean_reward - 1.0).abs() < 1e-6);
            assert!(s.critic_loss >= 0.0);
            assert!(s.std_target_q >= 0.0);

            let record = Record::from(s);
            assert_eq!(record.len(), 6);
            assert_eq!(record.get_scalar("mean_reward")?, s.mean_reward);
        }
        Ok(())
    }

    #[test]
    fn test_synchronized_sample_index() -> Result<()> {
        let mut agents = agents(&config())?;
        fill(&mut agents, 40, 1.0)?;
        update_all(&mut agents, 0)?;

        for agent in agents.iter() {
            let ixs = agent.replay_sample_index().expect("indices of the update");
            assert_eq!(ixs.len(), 8);
            assert!(ixs.iter().all(|p| (3..39).contains(p)));
        }

        agents[0].preupdate();
        assert!(agents[0].replay_sample_index().is_none());
        Ok(())
    }

    #[test]
    fn test_soft_update_after_both_steps() -> Result<()> {
        let tau = 0.1;
        let mut agents = agents(&config().tau(tau))?;
        fill(&mut agents, 40, 1.0)?;

        let actor_tgt_before = snapshot(agents[0].actor().get_varmap_tgt());
        let critic_tgt_before = snapshot(agents[0].critic().get_varmap_tgt());

        agents[0].preupdate();
        let (agent, peers) = Peers::split(&mut agents, 0).unwrap();
        assert!(agent.update(&peers, 0)?.is_some());

        let pairs = [
            (
                actor_tgt_before,
                snapshot(agent.actor().get_varmap()),
                snapshot(agent.actor().get_varmap_tgt()),
            ),
            (
                critic_tgt_before,
                snapshot(agent.critic().get_varmap()),
                snapshot(agent.critic().get_varmap_tgt()),
            ),
        ];
        for (before, live, after) in pairs.iter() {
            assert_eq!(before.len(), live.len());
            for ((b, l), a) in before.iter().zip(live.iter()).zip(after.iter()) {
                for ((b, l), a) in b.1.iter().zip(l.1.iter()).zip(a.1.iter()) {
                    let expected = tau as f32 * l + (1.0 - tau as f32) * b;
                    assert!((a - expected).abs() < 1e-5, "{} vs {}", a, expected);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_action_shape() -> Result<()> {
        let mut agents = agents(&config())?;
        let act = agents[0].action(&Array3::zeros((1, 3, 3)))?;
        assert_eq!(act.shape(), &[1, 3]);

        agents[1].eval();
        let act = agents[1].action(&Array3::zeros((4, 3, 2)))?;
        assert_eq!(act.shape(), &[4, 2]);

        let err = agents[1].action(&Array3::zeros((1, 2, 2))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MaddpgError>(),
            Some(MaddpgError::ShapeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_experience_shape_mismatch() -> Result<()> {
        let mut agents = agents(&config())?;
        let err = agents[0]
            .experience(&[0.0, 1.0], &[1.0, 0.0, 0.0], 0.0, false, false)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MaddpgError>(),
            Some(MaddpgError::ShapeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_local_q_func() -> Result<()> {
        let config = config().local_q_func(true);
        let mut agents = agents(&config)?;
        fill(&mut agents, 40, 0.5)?;
        let stats = update_all(&mut agents, 0)?;
        assert!(stats.iter().all(|s| s.is_some()));
        Ok(())
    }

    #[test]
    fn test_strict_synchronized_with_peer_episodes() -> Result<()> {
        let config = config()
            .buffer_capacity(1000)
            .boundary_policy(BoundaryPolicy::Strict);
        let mut agents = agents(&config)?;
        fill_steps(&mut agents, 200, |k| k % 7 == 6, |k| k % 20 == 19)?;

        let stats = update_all(&mut agents, 0)?;
        assert!(stats.iter().all(|s| s.is_some()));
        for agent in agents.iter() {
            let ixs = agent.replay_sample_index().expect("indices of the update");
            assert!(ixs.iter().all(|&p| agents.iter().all(|a| a.buffer().accepts(p))));
        }
        Ok(())
    }

    #[test]
    fn test_strict_short_episodes_skip_update() -> Result<()> {
        let config = config()
            .history_length(4)
            .boundary_policy(BoundaryPolicy::Strict);
        let mut agents = agents(&config)?;
        fill_steps(&mut agents, 30, |_| false, |k| k % 3 == 2)?;
        assert!(agents[0].buffer().can_sample());

        assert_eq!(update_all(&mut agents, 0)?, vec![None, None]);
        assert!(agents.iter().all(|a| a.replay_sample_index().is_none()));
        Ok(())
    }

    #[test]
    fn test_joint_batch_rows_are_aligned() -> Result<()> {
        let h = 3;
        for policy in [BoundaryPolicy::ZeroPad, BoundaryPolicy::Strict] {
            let config = config()
                .batch_size(16)
                .buffer_capacity(1000)
                .boundary_policy(policy);
            let mut agents = agents(&config)?;
            fill_steps(&mut agents, 200, |k| k % 7 == 6, |k| k % 20 == 19)?;

            let (agent, peers) = Peers::split(&mut agents, 1).unwrap();
            let index_sets = agent.draw_index_sets(&peers)?.expect("index sets");
            assert!(index_sets.iter().all(|ixs| *ixs == index_sets[1]));
            let ixs = &index_sets[1];
            let batch = agent.joint_batch(&peers, &index_sets)?;

            for i in 0..2 {
                let last = column(&batch.obs[i].narrow(1, h - 1, 1)?)?;
                let next_last = column(&batch.next_obs[i].narrow(1, h - 1, 1)?)?;
                let buffer = agent.agent(&peers, i)?.buffer();
                for (b, &p) in ixs.iter().enumerate() {
                    assert_eq!(last[b], (p + 1) as f32);
                    let tr = buffer.transition(p).unwrap();
                    let next = if tr.is_done || tr.is_terminal { p + 1 } else { p + 2 };
                    assert_eq!(next_last[b], next as f32);
                }
                if policy == BoundaryPolicy::Strict {
                    // Every row of every history is a stored observation.
                    assert!(column(&batch.obs[i])?.iter().all(|v| *v > 0.0));
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_adamw_optimizer() -> Result<()> {
        let opt_config = OptimizerConfig::AdamW {
            lr: 1.0,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.01,
        };
        let config = config().opt_config(opt_config).learning_rate(1e-3);
        let mut agents = agents(&config)?;
        fill(&mut agents, 40, 1.0)?;

        let before = snapshot(agents[0].critic().get_varmap());
        let stats = update_all(&mut agents, 0)?;
        assert!(stats.iter().all(|s| s.is_some()));
        assert_ne!(before, snapshot(agents[0].critic().get_varmap()));
        Ok(())
    }

    #[test]
    fn test_invalid_agent_index() {
        let config = config();
        let obs_dims = [3, 2];
        let act_spaces = [ActionSpace::Discrete(3), ActionSpace::Continuous(2)];
        assert!(Agent::build_recurrent("agent", &obs_dims, &act_spaces, 2, &config).is_err());
        assert!(Agent::build_recurrent("agent", &obs_dims, &act_spaces[..1], 0, &config).is_err());
    }
}
