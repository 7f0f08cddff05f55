//! Exploration strategies of DQN.
use anyhow::Result;
use candle_core::{shape::D, Tensor};
use candle_nn::ops::softmax;
use rand::{distributions::WeightedIndex, Rng};
use serde::{Deserialize, Serialize};

/// Explorers for DQN.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum DqnExplorer {
    /// Softmax action selection.
    Softmax(Softmax),

    /// Epsilon-greedy action selection.
    EpsilonGreedy(EpsilonGreedy),
}

impl DqnExplorer {
    /// Takes an action for every row of action values `qs` of shape `[batch, n_actions]`.
    pub fn action(&self, qs: &Tensor, rng: &mut impl Rng) -> Result<Vec<i64>> {
        match self {
            Self::Softmax(softmax) => softmax.action(qs, rng),
            Self::EpsilonGreedy(egreedy) => egreedy.action(qs, rng),
        }
    }
}

fn greedy(qs: &Tensor) -> Result<Vec<i64>> {
    Ok(qs
        .argmax(D::Minus1)?
        .to_vec1::<u32>()?
        .into_iter()
        .map(|a| a as i64)
        .collect())
}

/// With probability `explore_rate`, samples an action from the softmax of
/// the action values; takes the greedy action otherwise.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Softmax {
    /// Probability of sampling.
    pub explore_rate: f64,
}

impl Softmax {
    /// Constructs softmax explorer.
    pub fn new(explore_rate: f64) -> Self {
        Self { explore_rate }
    }

    /// Takes an action based on action values.
    pub fn action(&self, qs: &Tensor, rng: &mut impl Rng) -> Result<Vec<i64>> {
        let probs = softmax(qs, D::Minus1)?.to_vec2::<f32>()?;
        let best = greedy(qs)?;
        probs
            .iter()
            .zip(best.into_iter())
            .map(|(p, best)| match rng.gen::<f64>() < self.explore_rate {
                true => Ok(rng.sample(WeightedIndex::new(p)?) as i64),
                false => Ok(best),
            })
            .collect()
    }
}

/// With probability `explore_rate`, takes a uniformly random action; takes
/// the greedy action otherwise.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EpsilonGreedy {
    /// Probability of a random action.
    pub explore_rate: f64,
}

impl EpsilonGreedy {
    /// Constructs epsilon-greedy explorer.
    pub fn new(explore_rate: f64) -> Self {
        Self { explore_rate }
    }

    /// Takes an action based on action values.
    pub fn action(&self, qs: &Tensor, rng: &mut impl Rng) -> Result<Vec<i64>> {
        let n_actions = qs.dims()[1] as i64;
        Ok(greedy(qs)?
            .into_iter()
            .map(|best| match rng.gen::<f64>() < self.explore_rate {
                true => rng.gen_range(0..n_actions),
                false => best,
            })
            .collect())
    }
}
