//! A single environment step of one agent.

/// One environment step as seen by one agent.
///
/// The next observation is not part of a transition: the replay buffer reads
/// it from the following slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation at this step.
    pub obs: Vec<f32>,

    /// Action taken at this step.
    pub act: Vec<f32>,

    /// Reward received for the action.
    pub reward: f32,

    /// The episode ended by failure at this step.
    pub is_done: bool,

    /// The episode ended by reaching the horizon at this step.
    pub is_terminal: bool,
}

impl Transition {
    /// Creates a transition.
    pub fn new(obs: Vec<f32>, act: Vec<f32>, reward: f32, is_done: bool, is_terminal: bool) -> Self {
        Self {
            obs,
            act,
            reward,
            is_done,
            is_terminal,
        }
    }

    /// Returns `true` if this is the last step of its episode.
    pub fn ends_episode(&self) -> bool {
        self.is_done || self.is_terminal
    }
}
