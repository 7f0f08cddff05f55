//! Small deterministic environments used for tests.
use crate::{Env, Step, VecEnv};
use anyhow::Result;
use std::marker::PhantomData;

/// An environment whose episodes last a fixed number of steps.
///
/// The observation is `[t / episode_len, 1, ..., 1]` where `t` is the step
/// count within the episode. `DummyEnv<i64>` rewards action `0` with `1`;
/// `DummyEnv<Vec<f32>>` rewards `-sum(a^2)`.
#[derive(Clone, Debug)]
pub struct DummyEnv<A> {
    obs_dim: usize,
    episode_len: usize,
    t: usize,
    /// Number of `reset` calls.
    pub n_resets: usize,
    phantom: PhantomData<A>,
}

impl<A> DummyEnv<A> {
    /// Creates the environment.
    pub fn new(obs_dim: usize, episode_len: usize) -> Self {
        Self {
            obs_dim,
            episode_len: episode_len.max(1),
            t: 0,
            n_resets: 0,
            phantom: PhantomData,
        }
    }

    fn obs(&self) -> Vec<f32> {
        let mut obs = vec![1f32; self.obs_dim];
        if let Some(o) = obs.first_mut() {
            *o = self.t as f32 / self.episode_len as f32;
        }
        obs
    }

    fn reset_(&mut self) -> Vec<f32> {
        self.t = 0;
        self.n_resets += 1;
        self.obs()
    }

    fn step_(&mut self, reward: f32) -> Step {
        self.t += 1;
        let is_done = self.t >= self.episode_len;
        Step::new(self.obs(), reward, is_done)
    }
}

impl Env for DummyEnv<i64> {
    type Act = i64;

    fn reset(&mut self) -> Result<Vec<f32>> {
        Ok(self.reset_())
    }

    fn step(&mut self, a: &i64) -> Result<Step> {
        let reward = if *a == 0 { 1.0 } else { 0.0 };
        Ok(self.step_(reward))
    }
}

impl Env for DummyEnv<Vec<f32>> {
    type Act = Vec<f32>;

    fn reset(&mut self) -> Result<Vec<f32>> {
        Ok(self.reset_())
    }

    fn step(&mut self, a: &Vec<f32>) -> Result<Step> {
        let reward = -a.iter().map(|x| x * x).sum::<f32>();
        Ok(self.step_(reward))
    }
}

/// Runs several environments in lockstep, resetting finished ones.
pub struct DummyVecEnv<E> {
    envs: Vec<E>,
}

impl<E> DummyVecEnv<E> {
    /// Creates a vectorized environment from its instances.
    pub fn new(envs: Vec<E>) -> Self {
        Self { envs }
    }

    /// The instances.
    pub fn envs(&self) -> &[E] {
        &self.envs
    }
}

impl<E: Env> VecEnv for DummyVecEnv<E> {
    type Act = E::Act;

    fn n_envs(&self) -> usize {
        self.envs.len()
    }

    fn reset(&mut self) -> Result<Vec<Vec<f32>>> {
        self.envs.iter_mut().map(|env| env.reset()).collect()
    }

    fn step(&mut self, acts: &[Self::Act]) -> Result<Vec<Step>> {
        self.envs
            .iter_mut()
            .zip(acts.iter())
            .map(|(env, a)| {
                let mut step = env.step(a)?;
                if step.is_done {
                    step.next_obs = env.reset()?;
                }
                Ok(step)
            })
            .collect()
    }
}
