//! Interface of agents and exploration shared by all of them.
use crate::util::{column_tensor, rows_to_tensor, smooth_l1_loss, weighted_smooth_l1_loss};
use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use lodestar_core::{
    record::Record, Env, ReplayBufferBase, Trajectory, Transition, TransitionBatch, VecEnv,
};
use log::trace;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An action chosen by an agent for one observation.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision<A> {
    /// Action passed to the environment.
    pub act: A,

    /// Action recorded in the transition.
    pub stored_act: Vec<f32>,

    /// Auxiliary data recorded in the transition.
    pub aux: Vec<f32>,
}

impl<A> Decision<A> {
    /// A decision without auxiliary data.
    pub fn new(act: A, stored_act: Vec<f32>) -> Self {
        Self {
            act,
            stored_act,
            aux: vec![],
        }
    }
}

/// Objective of the critic of off-policy agents.
///
/// Chosen once when an agent is built.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum CriticObjective {
    /// Mean of the loss over the batch.
    Raw,

    /// Mean of the loss weighted by the importance weights of the batch. The
    /// absolute TD errors are reported back to the buffer as new priorities.
    ///
    /// A batch without importance weights is weighted uniformly.
    Prioritized,
}

impl CriticObjective {
    /// [`CriticObjective::Prioritized`] if `use_per`, [`CriticObjective::Raw`] otherwise.
    pub fn from_flag(use_per: bool) -> Self {
        match use_per {
            true => Self::Prioritized,
            false => Self::Raw,
        }
    }
}

/// Number of gradient steps of an update, `floor(now_len / batch_size * repeat_times)`.
pub fn n_updates(now_len: usize, batch_size: usize, repeat_times: f64) -> usize {
    if batch_size == 0 {
        return 0;
    }
    (now_len as f64 / batch_size as f64 * repeat_times).floor() as usize
}

/// Per-instance state of exploration: the observation to act on next and,
/// for on-policy agents, the transitions of the unfinished episode.
#[derive(Default)]
pub struct Collector {
    states: Vec<Option<Vec<f32>>>,
    tails: Vec<Trajectory>,
    splice_episodes: bool,
}

impl Collector {
    /// Creates a collector.
    ///
    /// With `splice_episodes`, collected trajectories are cut at the last
    /// finished episode and the remainder is held back for the next call.
    pub fn new(splice_episodes: bool) -> Self {
        Self {
            states: vec![],
            tails: vec![],
            splice_episodes,
        }
    }

    fn ensure(&mut self, n: usize) {
        if self.states.len() < n {
            self.states.resize(n, None);
            self.tails.resize(n, vec![]);
        }
    }

    /// Observation the `ix`-th instance will act on next.
    pub fn state(&self, ix: usize) -> Option<&Vec<f32>> {
        self.states.get(ix).and_then(|s| s.as_ref())
    }

    /// Sets the observation the `ix`-th instance will act on next.
    pub fn set_state(&mut self, ix: usize, state: Vec<f32>) {
        self.ensure(ix + 1);
        self.states[ix] = Some(state);
    }

    /// Transitions held back for the `ix`-th instance.
    pub fn tail(&self, ix: usize) -> &[Transition] {
        self.tails.get(ix).map(|t| t.as_slice()).unwrap_or(&[])
    }

    /// Forgets all observations and held back transitions.
    pub fn clear(&mut self) {
        self.states.clear();
        self.tails.clear();
    }

    /// Joins freshly collected transitions of the `ix`-th instance with the
    /// held back ones.
    ///
    /// If `fresh` contains a finished episode, the held back transitions and
    /// `fresh` up to its last finished episode are returned, and the rest of
    /// `fresh` is held back. Otherwise the previously held back transitions
    /// are returned and `fresh` is held back. No transition is dropped or
    /// returned twice.
    pub fn splice(&mut self, ix: usize, fresh: Trajectory) -> Trajectory {
        self.ensure(ix + 1);
        match fresh.iter().rposition(|tr| tr.is_done) {
            Some(last_done) => {
                let mut fresh = fresh;
                let tail = fresh.split_off(last_done + 1);
                let mut out = std::mem::replace(&mut self.tails[ix], tail);
                out.extend(fresh);
                out
            }
            None => std::mem::replace(&mut self.tails[ix], fresh),
        }
    }

    fn finish(&mut self, trajectories: Vec<Trajectory>) -> Vec<Trajectory> {
        if !self.splice_episodes {
            return trajectories;
        }
        trajectories
            .into_iter()
            .enumerate()
            .map(|(ix, tr)| self.splice(ix, tr))
            .collect()
    }
}

/// Represents an RL agent.
///
/// The caller alternates [`Agent::explore_env`] (or [`Agent::explore_vec_env`]),
/// pushing the returned trajectories into a buffer, and [`Agent::update_net`].
pub trait Agent {
    /// Action of the environment.
    type Act;

    /// Chooses actions with exploration for a batch of observations.
    fn select_actions(&mut self, obs: &[Vec<f32>]) -> Result<Vec<Decision<Self::Act>>>;

    /// The exploration state.
    fn collector_mut(&mut self) -> &mut Collector;

    /// Updates the networks with transitions in `buffer`.
    ///
    /// `repeat_times` scales the number of gradient steps relative to one pass
    /// over the buffer. `soft_update_tau` is the blend factor of target networks.
    fn update_net<R: ReplayBufferBase>(
        &mut self,
        buffer: &mut R,
        batch_size: usize,
        repeat_times: f64,
        soft_update_tau: f64,
    ) -> Result<Record>;

    /// Saves the parameters of the agent in `dir`.
    fn save<T: AsRef<Path>>(&self, dir: T) -> Result<()>;

    /// Loads the parameters of the agent from `dir`, skipping missing files.
    fn load<T: AsRef<Path>>(&mut self, dir: T) -> Result<()>;

    /// Chooses an action with exploration for one observation.
    fn select_action(&mut self, obs: &[f32]) -> Result<Self::Act> {
        let decision = self
            .select_actions(&[obs.to_vec()])?
            .pop()
            .context("No action selected")?;
        Ok(decision.act)
    }

    /// Runs `target_step` steps in a single environment.
    ///
    /// The environment is reset when an episode ends, and before the first
    /// step if there is no observation to continue from.
    fn explore_env<E: Env<Act = Self::Act>>(
        &mut self,
        env: &mut E,
        target_step: usize,
    ) -> Result<Vec<Trajectory>> {
        let mut trajectory = Vec::with_capacity(target_step);
        for _ in 0..target_step {
            let obs = match self.collector_mut().state(0) {
                Some(obs) => obs.clone(),
                None => env.reset()?,
            };
            let decision = self
                .select_actions(std::slice::from_ref(&obs))?
                .pop()
                .context("No action selected")?;
            let step = env.step(&decision.act)?;
            let state = match step.is_done {
                true => env.reset()?,
                false => step.next_obs.clone(),
            };
            self.collector_mut().set_state(0, state);
            trajectory.push(Transition {
                obs,
                act: decision.stored_act,
                reward: step.reward,
                is_done: step.is_done,
                next_obs: step.next_obs,
                aux: decision.aux,
            });
        }
        trace!("Collected {} transitions", trajectory.len());
        Ok(self.collector_mut().finish(vec![trajectory]))
    }

    /// Runs `target_step` lockstep iterations of a vectorized environment,
    /// returning one trajectory per instance.
    fn explore_vec_env<E: VecEnv<Act = Self::Act>>(
        &mut self,
        env: &mut E,
        target_step: usize,
    ) -> Result<Vec<Trajectory>> {
        let n_envs = env.n_envs();
        let mut obs = match (0..n_envs)
            .map(|ix| self.collector_mut().state(ix).cloned())
            .collect::<Option<Vec<_>>>()
        {
            Some(obs) => obs,
            None => env.reset()?,
        };

        let mut trajectories = vec![Vec::with_capacity(target_step); n_envs];
        for _ in 0..target_step {
            let (acts, decisions): (Vec<_>, Vec<_>) = self
                .select_actions(&obs)?
                .into_iter()
                .map(|d| (d.act, (d.stored_act, d.aux)))
                .unzip();
            let steps = env.step(&acts)?;
            let next_obs = steps.iter().map(|s| s.next_obs.clone()).collect::<Vec<_>>();
            for (ix, ((o, (act, aux)), step)) in obs
                .into_iter()
                .zip(decisions.into_iter())
                .zip(steps.into_iter())
                .enumerate()
            {
                trajectories[ix].push(Transition {
                    obs: o,
                    act,
                    reward: step.reward,
                    is_done: step.is_done,
                    next_obs: step.next_obs,
                    aux,
                });
            }
            obs = next_obs;
        }

        for (ix, o) in obs.into_iter().enumerate() {
            self.collector_mut().set_state(ix, o);
        }
        Ok(self.collector_mut().finish(trajectories))
    }

    /// Saves the agent if `is_save`, loads it otherwise.
    fn save_or_load_agent<T: AsRef<Path>>(&mut self, dir: T, is_save: bool) -> Result<()> {
        match is_save {
            true => {
                std::fs::create_dir_all(dir.as_ref())?;
                self.save(dir)
            }
            false => self.load(dir),
        }
    }
}

/// A sampled batch moved onto a device.
///
/// `reward`, `mask` and `weight` have shape `[batch, 1]`.
pub(crate) struct TensorBatch {
    pub obs: Tensor,
    pub act: Tensor,
    pub next_obs: Tensor,
    pub reward: Tensor,
    pub mask: Tensor,
    pub weight: Option<Tensor>,
}

impl TensorBatch {
    pub fn new(batch: TransitionBatch, device: &Device) -> Result<Self> {
        let n = batch.len();
        let weight = match &batch.weight {
            Some(w) => Some(column_tensor(w, device)?),
            None => None,
        };
        Ok(Self {
            obs: rows_to_tensor(&batch.obs, n, device)?,
            act: rows_to_tensor(&batch.act, n, device)?,
            next_obs: rows_to_tensor(&batch.next_obs, n, device)?,
            reward: column_tensor(&batch.reward, device)?,
            mask: column_tensor(&batch.mask, device)?,
            weight,
        })
    }

    /// Importance weights, ones if the batch has none.
    pub fn weight_or_ones(&self) -> Result<Tensor> {
        match &self.weight {
            Some(w) => Ok(w.clone()),
            None => Ok(self.reward.ones_like()?),
        }
    }
}

impl CriticObjective {
    /// Smooth L1 loss between `q` and `label`, weighted per sample if prioritized.
    pub(crate) fn loss(&self, q: &Tensor, label: &Tensor, batch: &TensorBatch) -> Result<Tensor> {
        match self {
            Self::Raw => smooth_l1_loss(q, label),
            Self::Prioritized => weighted_smooth_l1_loss(q, label, Some(&batch.weight_or_ones()?)),
        }
    }

    /// Reports `|label - q|` of the last sampled batch to the buffer if prioritized.
    pub(crate) fn report_td_error<R: ReplayBufferBase>(
        &self,
        buffer: &mut R,
        q: &Tensor,
        label: &Tensor,
    ) -> Result<()> {
        if let Self::Prioritized = self {
            let td_err = (label - q)?.abs()?.flatten_all()?.to_vec1::<f32>()?;
            buffer.td_error_update(&td_err)?;
        }
        Ok(())
    }
}

/// Rows of a batch of observations as a `[batch, obs_dim]` tensor.
pub(crate) fn obs_to_tensor(obs: &[Vec<f32>], device: &Device) -> Result<Tensor> {
    let data = obs.iter().flatten().copied().collect::<Vec<_>>();
    rows_to_tensor(&data, obs.len(), device)
}

/// Decisions storing the same continuous actions passed to the environment.
pub(crate) fn continuous_decisions(act: &Tensor) -> Result<Vec<Decision<Vec<f32>>>> {
    Ok(act
        .to_vec2::<f32>()?
        .into_iter()
        .map(|a| Decision::new(a.clone(), a))
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;

    fn tr(v: f32, is_done: bool) -> Transition {
        Transition {
            obs: vec![v],
            act: vec![0.0],
            reward: 1.0,
            is_done,
            next_obs: vec![v + 1.0],
            aux: vec![],
        }
    }

    fn obs_of(trajectory: &[Transition]) -> Vec<f32> {
        trajectory.iter().map(|t| t.obs[0]).collect()
    }

    #[test]
    fn test_n_updates() {
        assert_eq!(n_updates(1000, 100, 1.0), 10);
        assert_eq!(n_updates(1000, 300, 1.0), 3);
        assert_eq!(n_updates(1000, 100, 0.25), 2);
        assert_eq!(n_updates(10, 0, 1.0), 0);
    }

    #[test]
    fn test_splice_holds_back_unfinished_episode() {
        let mut collector = Collector::new(true);

        // Episode ends at the third step; the last two are held back
        let fresh = vec![
            tr(0., false),
            tr(1., false),
            tr(2., true),
            tr(3., false),
            tr(4., false),
        ];
        let out = collector.splice(0, fresh);
        assert_eq!(obs_of(&out), vec![0., 1., 2.]);
        assert_eq!(obs_of(collector.tail(0)), vec![3., 4.]);

        // The held back part is prefixed to the next finished episode
        let out = collector.splice(0, vec![tr(5., true), tr(6., false)]);
        assert_eq!(obs_of(&out), vec![3., 4., 5.]);
        assert_eq!(obs_of(collector.tail(0)), vec![6.]);
    }

    #[test]
    fn test_splice_conserves_transitions() {
        let mut collector = Collector::new(true);
        let calls = vec![
            vec![tr(0., false), tr(1., true), tr(2., false)],
            vec![tr(3., false), tr(4., false), tr(5., false)],
            vec![tr(6., true), tr(7., false), tr(8., true)],
        ];
        let mut returned = vec![];
        for fresh in calls.into_iter() {
            returned.extend(obs_of(&collector.splice(0, fresh)));
        }
        returned.extend(obs_of(collector.tail(0)));
        assert_eq!(returned, (0..9).map(|v| v as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_collector_without_splice() {
        let mut collector = Collector::new(false);
        let out = collector.finish(vec![vec![tr(0., false)]]);
        assert_eq!(out[0].len(), 1);
        assert!(collector.tail(0).is_empty());
    }
}
