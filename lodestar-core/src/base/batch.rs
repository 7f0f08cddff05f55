//! Batches of transitions returned by buffers.

/// A batch of transitions sampled from a replay buffer.
///
/// All arrays are flattened in row-major order with `len()` rows.
/// `mask[i]` is `0` if the episode terminated at the `i`-th transition and
/// the discount factor otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionBatch {
    /// Observations, `len() * obs_dim` elements.
    pub obs: Vec<f32>,

    /// Actions, `len() * act_dim` elements.
    pub act: Vec<f32>,

    /// Next observations, `len() * obs_dim` elements.
    pub next_obs: Vec<f32>,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Continuation masks.
    pub mask: Vec<f32>,

    /// Importance weights of prioritized sampling.
    pub weight: Option<Vec<f32>>,

    /// Dimension of observations.
    pub obs_dim: usize,

    /// Dimension of actions.
    pub act_dim: usize,
}

impl TransitionBatch {
    /// The number of transitions.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch has no transitions.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }
}

/// All transitions held by an on-policy trajectory buffer, in insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectoryBatch {
    /// Observations, `len() * obs_dim` elements.
    pub obs: Vec<f32>,

    /// Actions, `len() * act_dim` elements.
    pub act: Vec<f32>,

    /// Auxiliary data, `len() * aux_dim` elements.
    pub aux: Vec<f32>,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Continuation masks.
    pub mask: Vec<f32>,

    /// `true` at the last transition of every pushed trajectory.
    ///
    /// Trajectories of different environment instances are stored back to
    /// back, so returns must not be accumulated across these positions even
    /// where the episode has not ended.
    pub is_last: Vec<bool>,

    /// Dimension of observations.
    pub obs_dim: usize,

    /// Dimension of actions.
    pub act_dim: usize,

    /// Dimension of auxiliary data.
    pub aux_dim: usize,
}

impl TrajectoryBatch {
    /// The number of transitions.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch has no transitions.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }
}
