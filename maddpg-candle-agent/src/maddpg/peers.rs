//! Read-only access to the other agents during an update.
use super::{Maddpg, UpdateStats};
use crate::model::{SubModel1, SubModel2};
use anyhow::{Context, Result};
use candle_core::Tensor;

/// The agents of an environment other than the one being updated.
///
/// Obtained from [`Peers::split`], which hands out the updating agent
/// mutably and every other agent through shared references.
pub struct Peers<'a, P, Q>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    agent_index: usize,
    before: &'a [Maddpg<P, Q>],
    after: &'a [Maddpg<P, Q>],
}

impl<'a, P, Q> Peers<'a, P, Q>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    /// Splits `agents` into the agent at `agent_index` and its peers.
    ///
    /// Returns `None` if `agent_index` is out of range.
    pub fn split(
        agents: &'a mut [Maddpg<P, Q>],
        agent_index: usize,
    ) -> Option<(&'a mut Maddpg<P, Q>, Self)> {
        if agent_index >= agents.len() {
            return None;
        }
        let (before, rest) = agents.split_at_mut(agent_index);
        let (agent, after) = rest.split_first_mut()?;
        Some((
            agent,
            Self {
                agent_index,
                before,
                after,
            },
        ))
    }

    /// Returns the agent with index `i`, or `None` for the updating agent.
    pub fn get(&self, i: usize) -> Option<&'a Maddpg<P, Q>> {
        match i {
            i if i < self.agent_index => self.before.get(i),
            i if i == self.agent_index => None,
            i => self.after.get(i - self.agent_index - 1),
        }
    }

    /// Index of the updating agent.
    pub fn agent_index(&self) -> usize {
        self.agent_index
    }

    /// Number of agents including the updating one.
    pub fn n_agents(&self) -> usize {
        self.before.len() + self.after.len() + 1
    }
}

/// Runs a training round at step `t`.
///
/// Clears the sample cursors of all agents, then updates each agent in turn
/// with the others as its peers. Returns the diagnostics of every agent,
/// `None` for agents that skipped the update.
pub fn update_all<P, Q>(agents: &mut [Maddpg<P, Q>], t: usize) -> Result<Vec<Option<UpdateStats>>>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    agents.iter_mut().for_each(|agent| agent.preupdate());

    let mut stats = Vec::with_capacity(agents.len());
    for i in 0..agents.len() {
        let (agent, peers) = Peers::split(agents, i).context("Agent index out of range")?;
        stats.push(agent.update(&peers, t)?);
    }
    Ok(stats)
}
