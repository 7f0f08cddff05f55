//! Ring-buffer storage with uniform or prioritized sampling.
use super::{config::SimpleReplayBufferConfig, IwScheduler, SumTree};
use crate::{
    error::LodestarError, ExperienceBufferBase, ReplayBufferBase, Transition, TransitionBatch,
};
use anyhow::Result;
use log::trace;
use rand::{rngs::StdRng, Rng, SeedableRng};

struct PerState {
    sum_tree: SumTree,
    iw_scheduler: IwScheduler,
}

/// A replay buffer holding transitions in flat ring arrays.
///
/// Continuation masks are formed on insertion: `0` for terminal transitions,
/// `gamma` otherwise.
pub struct SimpleReplayBuffer {
    capacity: usize,
    obs_dim: usize,
    act_dim: usize,
    gamma: f32,
    reward_scale: f32,
    obs: Vec<f32>,
    act: Vec<f32>,
    next_obs: Vec<f32>,
    reward: Vec<f32>,
    mask: Vec<f32>,

    // Write position and number of stored transitions.
    i: usize,
    size: usize,

    // Number of transitions visible to sampling.
    now_len: usize,

    rng: StdRng,
    per: Option<PerState>,
    last_ixs: Vec<usize>,
}

impl SimpleReplayBuffer {
    /// Builds a replay buffer.
    pub fn build(config: &SimpleReplayBufferConfig) -> Self {
        let capacity = config.capacity.max(1);
        let per = config.per_config.as_ref().map(|per_config| PerState {
            sum_tree: SumTree::new(capacity, per_config.alpha),
            iw_scheduler: IwScheduler::new(
                per_config.beta_0,
                per_config.beta_final,
                per_config.n_opts_final,
            ),
        });

        Self {
            capacity,
            obs_dim: config.obs_dim,
            act_dim: config.act_dim,
            gamma: config.gamma,
            reward_scale: config.reward_scale,
            obs: vec![0f32; capacity * config.obs_dim],
            act: vec![0f32; capacity * config.act_dim],
            next_obs: vec![0f32; capacity * config.obs_dim],
            reward: vec![0f32; capacity],
            mask: vec![0f32; capacity],
            i: 0,
            size: 0,
            now_len: 0,
            rng: StdRng::seed_from_u64(config.seed),
            per,
            last_ixs: vec![],
        }
    }

    /// Returns `true` if sampling is prioritized.
    pub fn is_prioritized(&self) -> bool {
        self.per.is_some()
    }

    fn check_len(expected: usize, actual: usize) -> Result<()> {
        if expected != actual {
            return Err(LodestarError::LengthMismatch { expected, actual }.into());
        }
        Ok(())
    }

    fn push_transition(&mut self, tr: &Transition) -> Result<()> {
        Self::check_len(self.obs_dim, tr.obs.len())?;
        Self::check_len(self.obs_dim, tr.next_obs.len())?;
        Self::check_len(self.act_dim, tr.act.len())?;

        let i = self.i;
        self.obs[i * self.obs_dim..(i + 1) * self.obs_dim].copy_from_slice(&tr.obs);
        self.next_obs[i * self.obs_dim..(i + 1) * self.obs_dim].copy_from_slice(&tr.next_obs);
        self.act[i * self.act_dim..(i + 1) * self.act_dim].copy_from_slice(&tr.act);
        self.reward[i] = tr.reward * self.reward_scale;
        self.mask[i] = if tr.is_done { 0.0 } else { self.gamma };

        if let Some(per) = self.per.as_mut() {
            per.sum_tree.add(i);
        }

        self.i = (self.i + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
        Ok(())
    }

    fn gather(&self, ixs: &[usize], weight: Option<Vec<f32>>) -> TransitionBatch {
        let rows = |data: &[f32], dim: usize| -> Vec<f32> {
            ixs.iter()
                .flat_map(|&ix| data[ix * dim..(ix + 1) * dim].iter().copied())
                .collect()
        };

        TransitionBatch {
            obs: rows(&self.obs, self.obs_dim),
            act: rows(&self.act, self.act_dim),
            next_obs: rows(&self.next_obs, self.obs_dim),
            reward: ixs.iter().map(|&ix| self.reward[ix]).collect(),
            mask: ixs.iter().map(|&ix| self.mask[ix]).collect(),
            weight,
            obs_dim: self.obs_dim,
            act_dim: self.act_dim,
        }
    }
}

impl ExperienceBufferBase for SimpleReplayBuffer {
    fn push(&mut self, trajectory: &[Transition]) -> Result<()> {
        for tr in trajectory.iter() {
            self.push_transition(tr)?;
        }
        trace!("Pushed {} transitions", trajectory.len());
        Ok(())
    }

    fn len(&self) -> usize {
        self.size
    }
}

impl ReplayBufferBase for SimpleReplayBuffer {
    fn update_now_len(&mut self) {
        self.now_len = self.size;
    }

    fn now_len(&self) -> usize {
        self.now_len
    }

    fn max_len(&self) -> usize {
        self.capacity
    }

    fn sample_batch(&mut self, batch_size: usize) -> Result<TransitionBatch> {
        if batch_size == 0 || batch_size > self.now_len {
            return Err(LodestarError::BufferUnderflow {
                requested: batch_size,
                available: self.now_len,
            }
            .into());
        }

        let (ixs, weight) = match self.per.as_mut() {
            None => {
                let now_len = self.now_len;
                let ixs = (0..batch_size)
                    .map(|_| self.rng.gen_range(0..now_len))
                    .collect::<Vec<_>>();
                (ixs, None)
            }
            Some(per) => {
                let beta = per.iw_scheduler.beta();
                let (ixs, ws) = per
                    .sum_tree
                    .sample(batch_size, self.now_len, beta, &mut self.rng);
                per.iw_scheduler.add_n_opts();
                (ixs, Some(ws))
            }
        };

        let batch = self.gather(&ixs, weight);
        self.last_ixs = ixs;
        Ok(batch)
    }

    fn td_error_update(&mut self, td_err: &[f32]) -> Result<()> {
        if let Some(per) = self.per.as_mut() {
            Self::check_len(self.last_ixs.len(), td_err.len())?;
            for (&ix, &e) in self.last_ixs.iter().zip(td_err.iter()) {
                per.sum_tree.update(ix, e);
            }
        }
        Ok(())
    }
}
