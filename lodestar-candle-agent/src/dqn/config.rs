//! Configuration of DQN agents.
use super::explorer::{DqnExplorer, EpsilonGreedy, Softmax};
use crate::{opt::OptimizerConfig, Device};
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Dqn`](super::Dqn) and [`DoubleDqn`](super::DoubleDqn).
///
/// `C` is the configuration of the Q-network.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DqnConfig<C> {
    /// Configuration of the Q-network.
    pub q_config: Option<C>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,

    /// Dimension of observations.
    pub state_dim: usize,

    /// Number of actions.
    pub action_dim: usize,

    /// Exploration strategy.
    pub explorer: DqnExplorer,

    /// If `true`, a separate target network is maintained.
    pub use_target: bool,

    /// If `true`, the critic loss is weighted by importance weights and TD
    /// errors are reported to the replay buffer.
    pub use_per: bool,

    /// Device of the networks. The best available one if `None`.
    pub device: Option<Device>,

    /// Seed of exploration.
    pub seed: u64,
}

impl<C> Default for DqnConfig<C> {
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::default(),
            state_dim: 0,
            action_dim: 0,
            explorer: DqnExplorer::EpsilonGreedy(EpsilonGreedy::new(0.25)),
            use_target: true,
            use_per: false,
            device: None,
            seed: 42,
        }
    }
}

impl<C> DqnConfig<C> {
    /// Default configuration of [`DoubleDqn`](super::DoubleDqn), exploring by
    /// sampling from the softmax of action values.
    pub fn for_double_dqn() -> Self {
        Self {
            explorer: DqnExplorer::Softmax(Softmax::new(0.25)),
            ..Self::default()
        }
    }
}

impl<C> DqnConfig<C>
where
    C: DeserializeOwned + Serialize,
{
    /// Sets the configuration of the Q-network.
    pub fn q_config(mut self, v: C) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets the configuration of the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the learning rate.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.opt_config = self.opt_config.learning_rate(v);
        self
    }

    /// Sets the dimension of observations.
    pub fn state_dim(mut self, v: usize) -> Self {
        self.state_dim = v;
        self
    }

    /// Sets the number of actions.
    pub fn action_dim(mut self, v: usize) -> Self {
        self.action_dim = v;
        self
    }

    /// Sets the exploration strategy.
    pub fn explorer(mut self, v: DqnExplorer) -> Self {
        self.explorer = v;
        self
    }

    /// Sets if a separate target network is maintained.
    pub fn use_target(mut self, v: bool) -> Self {
        self.use_target = v;
        self
    }

    /// Sets if prioritized experience replay is used.
    pub fn use_per(mut self, v: bool) -> Self {
        self.use_per = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Sets the seed of exploration.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Saves [`DqnConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(&path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of DQN agent into {:?}", path.as_ref());
        Ok(())
    }

    /// Constructs [`DqnConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of DQN agent from {:?}", path.as_ref());
        Ok(b)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mlp::MlpConfig;
    use tempdir::TempDir;

    #[test]
    fn test_serde_dqn_config() -> Result<()> {
        let config = DqnConfig::default()
            .q_config(MlpConfig::new(4, vec![64, 64], 2, false))
            .state_dim(4)
            .action_dim(2)
            .use_per(true)
            .learning_rate(1e-3);

        let dir = TempDir::new("dqn_config")?;
        let path = dir.path().join("dqn_config.yaml");
        config.save(&path)?;
        let config_ = DqnConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
