//! Recurrent MADDPG agent.
//!
//! Every agent of an environment is a [`Maddpg`] with its own replay buffer,
//! actor and critic. The driver stores each step with
//! [`Maddpg::experience`] on every agent and periodically trains all agents
//! with [`update_all`]:
//!
//! ```no_run
//! # use anyhow::Result;
//! # use maddpg_candle_agent::maddpg::{update_all, Maddpg, MaddpgConfig};
//! # use maddpg_core::ActionSpace;
//! # fn main() -> Result<()> {
//! let config = MaddpgConfig::default().history_length(4).batch_size(32);
//! let obs_dims = [6, 6];
//! let act_spaces = [ActionSpace::Discrete(5), ActionSpace::Discrete(5)];
//! let mut agents = (0..2)
//!     .map(|i| Maddpg::build_recurrent(format!("agent_{}", i), &obs_dims, &act_spaces, i, &config))
//!     .collect::<Result<Vec<_>>>()?;
//!
//! for t in 0..1000 {
//!     // step the environment and call `experience` on every agent ...
//!     for stats in update_all(&mut agents, t)?.into_iter().flatten() {
//!         println!("{:?}", stats.to_array());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
mod actor;
mod base;
mod config;
mod critic;
mod peers;
pub use actor::Actor;
pub use base::{Maddpg, UpdateStats};
pub use config::{MaddpgConfig, SampleAlignment};
pub use critic::Critic;
pub use peers::{update_all, Peers};
