//! Action spaces.
use serde::{Deserialize, Serialize};

/// Action space of an agent.
///
/// Actions are always stored and exchanged as `f32` vectors of length
/// [`ActionSpace::dim`]: a (soft) one-hot vector for discrete spaces and a
/// real vector for continuous spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ActionSpace {
    /// `n` discrete actions.
    Discrete(usize),

    /// A real vector of the given dimension.
    Continuous(usize),
}

impl ActionSpace {
    /// Length of an action vector.
    pub fn dim(&self) -> usize {
        match self {
            Self::Discrete(n) => *n,
            Self::Continuous(d) => *d,
        }
    }

    /// Number of distribution parameters a policy emits for this space.
    ///
    /// Discrete spaces are parameterized by logits, continuous spaces by a
    /// mean and a log standard deviation per dimension.
    pub fn param_dim(&self) -> usize {
        match self {
            Self::Discrete(n) => *n,
            Self::Continuous(d) => 2 * d,
        }
    }

    /// Total action length of a set of agents.
    pub fn joint_dim(spaces: &[ActionSpace]) -> usize {
        spaces.iter().map(|s| s.dim()).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dims() {
        let spaces = [ActionSpace::Discrete(5), ActionSpace::Continuous(2)];
        assert_eq!(spaces[0].param_dim(), 5);
        assert_eq!(spaces[1].param_dim(), 4);
        assert_eq!(ActionSpace::joint_dim(&spaces), 7);
    }
}
