use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Mlp`](super::Mlp), [`DuelMlp`](super::DuelMlp) and
/// [`GaussianMlp`](super::GaussianMlp).
pub struct MlpConfig {
    pub(super) in_dim: usize,
    pub(super) units: Vec<usize>,
    pub(super) out_dim: usize,
    pub(super) activation_out: bool,
}

impl MlpConfig {
    /// Creates configuration of MLP.
    ///
    /// * `activation_out` - If `true`, ReLU is applied to the output of [`Mlp`](super::Mlp).
    pub fn new(in_dim: usize, units: Vec<usize>, out_dim: usize, activation_out: bool) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
            activation_out,
        }
    }

    /// Output dimension.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of the networks in [`shared`](super::SharedDpgMlp).
pub struct SharedMlpConfig {
    pub(super) state_dim: usize,
    pub(super) action_dim: usize,
    pub(super) mid_dim: usize,
}

impl SharedMlpConfig {
    /// Creates the configuration.
    pub fn new(state_dim: usize, action_dim: usize, mid_dim: usize) -> Self {
        Self {
            state_dim,
            action_dim,
            mid_dim,
        }
    }
}
