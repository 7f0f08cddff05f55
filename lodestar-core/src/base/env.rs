//! Environment.
use super::Step;
use anyhow::Result;

/// Represents an environment, typically an MDP.
///
/// Observations are flat `f32` vectors. The action type is chosen by the
/// environment: discrete environments typically use `i64`, continuous ones
/// `Vec<f32>` with every element in `[-1, 1]`.
pub trait Env {
    /// Action of the environment.
    type Act;

    /// Resets the environment and returns the initial observation.
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Performs an environment step.
    ///
    /// The returned [`Step`] holds the observation reached by the action. When
    /// the episode is done, the caller is responsible for calling
    /// [`Env::reset`] before the next step.
    fn step(&mut self, a: &Self::Act) -> Result<Step>;
}

/// A batch of environment instances advanced in lockstep.
///
/// Unlike [`Env`], a vectorized environment resets finished instances by
/// itself: when `steps[i].is_done` is true, `steps[i].next_obs` is the first
/// observation of the next episode of the `i`-th instance.
pub trait VecEnv {
    /// Action of a single environment instance.
    type Act;

    /// The number of environment instances.
    fn n_envs(&self) -> usize;

    /// Resets all instances and returns their initial observations.
    fn reset(&mut self) -> Result<Vec<Vec<f32>>>;

    /// Steps all instances with one action each.
    ///
    /// `acts.len()` must be equal to [`VecEnv::n_envs`].
    fn step(&mut self, acts: &[Self::Act]) -> Result<Vec<Step>>;
}
