//! Configuration of PPO agent.
use crate::{opt::OptimizerConfig, Device};
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Ppo`](super::Ppo) and [`DiscretePpo`](super::DiscretePpo).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PpoConfig<A, C> {
    /// Configuration of the policy.
    pub actor_config: Option<A>,

    /// Configuration of the state-value function.
    pub critic_config: Option<C>,

    /// Configuration of the optimizer of the policy.
    pub actor_opt_config: OptimizerConfig,

    /// Configuration of the optimizer of the state-value function.
    pub critic_opt_config: OptimizerConfig,

    /// Dimension of observations.
    pub state_dim: usize,

    /// The probability ratio is clipped into `[1 - ratio_clip, 1 + ratio_clip]`.
    pub ratio_clip: f64,

    /// Weight of the entropy bonus in the objective of the policy.
    pub lambda_entropy: f64,

    /// Decay of generalized advantage estimation.
    pub lambda_gae: f32,

    /// If `true`, advantages are estimated with GAE, otherwise as the
    /// discounted reward sum minus the state value.
    pub use_gae: bool,

    /// If `true`, a separate target of the state-value function estimates
    /// the values of collected states.
    pub use_critic_target: bool,

    /// Device of the networks. The best available one if `None`.
    pub device: Option<Device>,

    /// Seed of the random number generator of discrete policies.
    pub seed: u64,
}

impl<A, C> Default for PpoConfig<A, C> {
    fn default() -> Self {
        Self {
            actor_config: None,
            critic_config: None,
            actor_opt_config: OptimizerConfig::default(),
            critic_opt_config: OptimizerConfig::default(),
            state_dim: 0,
            ratio_clip: 0.2,
            lambda_entropy: 0.02,
            lambda_gae: 0.98,
            use_gae: false,
            use_critic_target: false,
            device: None,
            seed: 42,
        }
    }
}

impl<A, C> PpoConfig<A, C>
where
    A: DeserializeOwned + Serialize,
    C: DeserializeOwned + Serialize,
{
    /// Sets the configuration of the policy.
    pub fn actor_config(mut self, v: A) -> Self {
        self.actor_config = Some(v);
        self
    }

    /// Sets the configuration of the state-value function.
    pub fn critic_config(mut self, v: C) -> Self {
        self.critic_config = Some(v);
        self
    }

    /// Sets the learning rate of both optimizers.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.actor_opt_config = self.actor_opt_config.learning_rate(v);
        self.critic_opt_config = self.critic_opt_config.learning_rate(v);
        self
    }

    /// Sets the dimension of observations.
    pub fn state_dim(mut self, v: usize) -> Self {
        self.state_dim = v;
        self
    }

    /// Sets the clipping range of the probability ratio.
    pub fn ratio_clip(mut self, v: f64) -> Self {
        self.ratio_clip = v;
        self
    }

    /// Sets the weight of the entropy bonus.
    pub fn lambda_entropy(mut self, v: f64) -> Self {
        self.lambda_entropy = v;
        self
    }

    /// Sets if GAE is used, with the given decay.
    pub fn gae(mut self, use_gae: bool, lambda_gae: f32) -> Self {
        self.use_gae = use_gae;
        self.lambda_gae = lambda_gae;
        self
    }

    /// Sets if a target of the state-value function is maintained.
    pub fn use_critic_target(mut self, v: bool) -> Self {
        self.use_critic_target = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Saves [`PpoConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(&path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of PPO agent into {:?}", path.as_ref());
        Ok(())
    }

    /// Constructs [`PpoConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of PPO agent from {:?}", path.as_ref());
        Ok(b)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mlp::MlpConfig;
    use tempdir::TempDir;

    #[test]
    fn test_serde_ppo_config() -> Result<()> {
        let config = PpoConfig::default()
            .actor_config(MlpConfig::new(3, vec![32], 2, false))
            .critic_config(MlpConfig::new(3, vec![32], 1, false))
            .gae(true, 0.95)
            .use_critic_target(true);

        let dir = TempDir::new("ppo_config")?;
        let path = dir.path().join("ppo_config.yaml");
        config.save(&path)?;
        let config_ = PpoConfig::load(&path)?;
        assert_eq!(config, config_);
        assert_eq!(config_.ratio_clip, 0.2);
        assert_eq!(config_.lambda_entropy, 0.02);
        Ok(())
    }
}
