//! Environment step and transitions.

/// Output of a single environment step `(o_t+1, r_t, done_t)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    /// Observation after the step.
    pub next_obs: Vec<f32>,

    /// Reward.
    pub reward: f32,

    /// Flag denoting if the episode is terminated.
    pub is_done: bool,
}

impl Step {
    /// Constructs a [`Step`] object.
    pub fn new(next_obs: Vec<f32>, reward: f32, is_done: bool) -> Self {
        Self {
            next_obs,
            reward,
            is_done,
        }
    }
}

/// A transition `(o_t, a_t, r_t, done_t, o_t+1)` recorded by an agent.
///
/// `act` is the action in the agent's own representation: the raw policy
/// output for continuous agents (before any squashing applied for the
/// environment), or the action index stored as `f32` for discrete agents.
/// `aux` holds algorithm-specific data, such as the exploration noise or the
/// action probabilities of on-policy agents. It is empty for off-policy agents.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Observation.
    pub obs: Vec<f32>,

    /// Action taken at `obs`.
    pub act: Vec<f32>,

    /// Reward.
    pub reward: f32,

    /// Flag denoting if the episode terminated at this step.
    pub is_done: bool,

    /// Observation after the step.
    pub next_obs: Vec<f32>,

    /// Auxiliary data.
    pub aux: Vec<f32>,
}

/// Ordered transitions of a single environment instance.
pub type Trajectory = Vec<Transition>;
