//! On-policy trajectory container.
//!
//! On-policy agents consume every collected transition exactly once, in
//! collection order. [`TrajectoryBuffer`] appends trajectories and hands all of
//! them back through [`ReplayBufferBase::sample_all`].
use crate::{
    error::LodestarError, ExperienceBufferBase, ReplayBufferBase, TrajectoryBatch, Transition,
    TransitionBatch,
};
use anyhow::Result;
use log::trace;

/// Plain container of on-policy transitions.
///
/// Alongside the observation and the action, every transition carries
/// auxiliary data of a fixed dimension, such as the exploration noise of a
/// Gaussian policy or the action probabilities of a categorical one.
pub struct TrajectoryBuffer {
    obs_dim: usize,
    act_dim: usize,
    aux_dim: usize,
    gamma: f32,
    reward_scale: f32,
    obs: Vec<f32>,
    act: Vec<f32>,
    aux: Vec<f32>,
    reward: Vec<f32>,
    mask: Vec<f32>,
    is_last: Vec<bool>,
    now_len: usize,
}

impl TrajectoryBuffer {
    /// Creates an empty buffer.
    pub fn new(obs_dim: usize, act_dim: usize, aux_dim: usize, gamma: f32) -> Self {
        Self {
            obs_dim,
            act_dim,
            aux_dim,
            gamma,
            reward_scale: 1.0,
            obs: vec![],
            act: vec![],
            aux: vec![],
            reward: vec![],
            mask: vec![],
            is_last: vec![],
            now_len: 0,
        }
    }

    /// Sets the factor multiplied to rewards on insertion.
    pub fn reward_scale(mut self, reward_scale: f32) -> Self {
        self.reward_scale = reward_scale;
        self
    }

    /// Discards all transitions.
    pub fn clear(&mut self) {
        self.obs.clear();
        self.act.clear();
        self.aux.clear();
        self.reward.clear();
        self.mask.clear();
        self.is_last.clear();
        self.now_len = 0;
    }

    fn check_len(expected: usize, actual: usize) -> Result<()> {
        if expected != actual {
            return Err(LodestarError::LengthMismatch { expected, actual }.into());
        }
        Ok(())
    }
}

impl ExperienceBufferBase for TrajectoryBuffer {
    fn push(&mut self, trajectory: &[Transition]) -> Result<()> {
        let n = trajectory.len();
        for (i, tr) in trajectory.iter().enumerate() {
            Self::check_len(self.obs_dim, tr.obs.len())?;
            Self::check_len(self.act_dim, tr.act.len())?;
            Self::check_len(self.aux_dim, tr.aux.len())?;
            self.obs.extend_from_slice(&tr.obs);
            self.act.extend_from_slice(&tr.act);
            self.aux.extend_from_slice(&tr.aux);
            self.reward.push(tr.reward * self.reward_scale);
            self.mask.push(if tr.is_done { 0.0 } else { self.gamma });
            self.is_last.push(i + 1 == n);
        }
        trace!("Pushed {} transitions", trajectory.len());
        Ok(())
    }

    fn len(&self) -> usize {
        self.reward.len()
    }
}

impl ReplayBufferBase for TrajectoryBuffer {
    fn update_now_len(&mut self) {
        self.now_len = self.reward.len();
    }

    fn now_len(&self) -> usize {
        self.now_len
    }

    fn max_len(&self) -> usize {
        self.reward.len()
    }

    fn sample_batch(&mut self, _batch_size: usize) -> Result<TransitionBatch> {
        Err(LodestarError::UnsupportedSampling("sample_batch".to_string()).into())
    }

    fn sample_all(&mut self) -> Result<TrajectoryBatch> {
        let n = self.now_len;
        if n == 0 {
            return Err(LodestarError::BufferUnderflow {
                requested: 1,
                available: 0,
            }
            .into());
        }

        Ok(TrajectoryBatch {
            obs: self.obs[..n * self.obs_dim].to_vec(),
            act: self.act[..n * self.act_dim].to_vec(),
            aux: self.aux[..n * self.aux_dim].to_vec(),
            reward: self.reward[..n].to_vec(),
            mask: self.mask[..n].to_vec(),
            is_last: self.is_last[..n].to_vec(),
            obs_dim: self.obs_dim,
            act_dim: self.act_dim,
            aux_dim: self.aux_dim,
        })
    }
}
