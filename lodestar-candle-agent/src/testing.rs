//! Helpers of unit tests.
use crate::Agent;
use anyhow::Result;
use lodestar_core::{
    replay_buffer::{PerConfig, SimpleReplayBuffer, SimpleReplayBufferConfig},
    Env, ExperienceBufferBase, ReplayBufferBase, Transition, TransitionBatch,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn replay_buffer(obs_dim: usize, act_dim: usize, use_per: bool) -> SimpleReplayBuffer {
    let config = SimpleReplayBufferConfig::default()
        .capacity(1000)
        .obs_dim(obs_dim)
        .act_dim(act_dim)
        .gamma(0.99)
        .seed(7)
        .per_config(match use_per {
            true => Some(PerConfig::default()),
            false => None,
        });
    SimpleReplayBuffer::build(&config)
}

/// Explores `steps` steps and pushes the returned trajectories, returning
/// the number of pushed transitions.
pub fn collect<A, E, B>(agent: &mut A, env: &mut E, buffer: &mut B, steps: usize) -> Result<usize>
where
    A: Agent,
    E: Env<Act = A::Act>,
    B: ExperienceBufferBase,
{
    let trajectories = agent.explore_env(env, steps)?;
    let mut n = 0;
    for trajectory in trajectories.iter() {
        buffer.push(trajectory)?;
        n += trajectory.len();
    }
    Ok(n)
}

/// Replay buffer recording the TD errors reported by agents.
pub struct TdErrorLog<B> {
    pub buffer: B,
    pub td_errors: Vec<Vec<f32>>,
}

impl<B> TdErrorLog<B> {
    pub fn new(buffer: B) -> Self {
        Self {
            buffer,
            td_errors: vec![],
        }
    }
}

impl<B: ExperienceBufferBase> ExperienceBufferBase for TdErrorLog<B> {
    fn push(&mut self, trajectory: &[Transition]) -> Result<()> {
        self.buffer.push(trajectory)
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }
}

impl<B: ReplayBufferBase> ReplayBufferBase for TdErrorLog<B> {
    fn update_now_len(&mut self) {
        self.buffer.update_now_len()
    }

    fn now_len(&self) -> usize {
        self.buffer.now_len()
    }

    fn max_len(&self) -> usize {
        self.buffer.max_len()
    }

    fn sample_batch(&mut self, batch_size: usize) -> Result<TransitionBatch> {
        self.buffer.sample_batch(batch_size)
    }

    fn td_error_update(&mut self, td_err: &[f32]) -> Result<()> {
        self.td_errors.push(td_err.to_vec());
        self.buffer.td_error_update(td_err)
    }
}
