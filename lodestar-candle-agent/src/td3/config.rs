//! Configuration of TD3 agent.
use crate::{opt::OptimizerConfig, Device};
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Td3`](super::Td3).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Td3Config<A, C> {
    /// Configuration of the actor, which outputs actions before `tanh`.
    pub actor_config: Option<A>,

    /// Configuration of each of the twin critics.
    pub critic_config: Option<C>,

    /// Configuration of the optimizer of the actor.
    pub actor_opt_config: OptimizerConfig,

    /// Configuration of the optimizer of the critics.
    pub critic_opt_config: OptimizerConfig,

    /// Dimension of observations.
    pub state_dim: usize,

    /// Dimension of actions.
    pub action_dim: usize,

    /// Standard deviation of the exploration noise.
    pub explore_noise: f64,

    /// Standard deviation of the noise added to target actions.
    pub policy_noise: f64,

    /// Bound of the absolute value of both noises.
    pub noise_clip: f64,

    /// The actor and the targets are updated once per this number of critic updates.
    pub update_freq: usize,

    /// If `true`, a separate target actor is maintained.
    pub use_actor_target: bool,

    /// If `true`, separate target critics are maintained.
    pub use_critic_target: bool,

    /// If `true`, the critic loss is weighted by importance weights and TD
    /// errors are reported to the replay buffer.
    pub use_per: bool,

    /// Device of the networks. The best available one if `None`.
    pub device: Option<Device>,
}

impl<A, C> Default for Td3Config<A, C> {
    fn default() -> Self {
        Self {
            actor_config: None,
            critic_config: None,
            actor_opt_config: OptimizerConfig::default(),
            critic_opt_config: OptimizerConfig::default(),
            state_dim: 0,
            action_dim: 0,
            explore_noise: 0.1,
            policy_noise: 0.2,
            noise_clip: 0.5,
            update_freq: 2,
            use_actor_target: true,
            use_critic_target: true,
            use_per: false,
            device: None,
        }
    }
}

impl<A, C> Td3Config<A, C>
where
    A: DeserializeOwned + Serialize,
    C: DeserializeOwned + Serialize,
{
    /// Sets the configuration of the actor.
    pub fn actor_config(mut self, v: A) -> Self {
        self.actor_config = Some(v);
        self
    }

    /// Sets the configuration of each of the twin critics.
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

    /// Sets the dimension of actions.
    pub fn action_dim(mut self, v: usize) -> Self {
        self.action_dim = v;
        self
    }

    /// Sets the standard deviation of the exploration noise.
    pub fn explore_noise(mut self, v: f64) -> Self {
        self.explore_noise = v;
        self
    }

    /// Sets the standard deviation of the target policy noise.
    pub fn policy_noise(mut self, v: f64) -> Self {
        self.policy_noise = v;
        self
    }

    /// Sets the interval of delayed updates.
    pub fn update_freq(mut self, v: usize) -> Self {
        self.update_freq = v;
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

    /// Saves [`Td3Config`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(&path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of TD3 agent into {:?}", path.as_ref());
        Ok(())
    }

    /// Constructs [`Td3Config`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of TD3 agent from {:?}", path.as_ref());
        Ok(b)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mlp::MlpConfig;
    use tempdir::TempDir;

    #[test]
    fn test_serde_td3_config() -> Result<()> {
        let config = Td3Config::default()
            .actor_config(MlpConfig::new(3, vec![32], 1, false))
            .critic_config(MlpConfig::new(4, vec![32], 1, false))
            .update_freq(3);

        let dir = TempDir::new("td3_config")?;
        let path = dir.path().join("td3_config.yaml");
        config.save(&path)?;
        let config_ = Td3Config::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
