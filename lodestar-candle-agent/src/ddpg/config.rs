//! Configuration of DDPG agent.
use crate::{opt::OptimizerConfig, Device};
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Ddpg`](super::Ddpg).
///
/// `A` and `C` are the configurations of the actor and the critic.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DdpgConfig<A, C> {
    /// Configuration of the actor, which outputs actions before `tanh`.
    pub actor_config: Option<A>,

    /// Configuration of the critic.
    pub critic_config: Option<C>,

    /// Configuration of the optimizer of the actor.
    pub actor_opt_config: OptimizerConfig,

    /// Configuration of the optimizer of the critic.
    pub critic_opt_config: OptimizerConfig,

    /// Dimension of observations.
    pub state_dim: usize,

    /// Dimension of actions.
    pub action_dim: usize,

    /// Mean reversion rate of the exploration noise.
    pub ou_theta: f64,

    /// Scale of the exploration noise.
    pub ou_sigma: f64,

    /// Time step of the exploration noise.
    pub ou_dt: f64,

    /// If `true`, a separate target actor is maintained.
    pub use_actor_target: bool,

    /// If `true`, a separate target critic is maintained.
    pub use_critic_target: bool,

    /// If `true`, the critic loss is weighted by importance weights and TD
    /// errors are reported to the replay buffer.
    pub use_per: bool,

    /// Device of the networks. The best available one if `None`.
    pub device: Option<Device>,

    /// Seed of exploration.
    pub seed: u64,
}

impl<A, C> Default for DdpgConfig<A, C> {
    fn default() -> Self {
        Self {
            actor_config: None,
            critic_config: None,
            actor_opt_config: OptimizerConfig::default(),
            critic_opt_config: OptimizerConfig::default(),
            state_dim: 0,
            action_dim: 0,
            ou_theta: 0.15,
            ou_sigma: 0.3,
            ou_dt: 1e-2,
            use_actor_target: true,
            use_critic_target: true,
            use_per: false,
            device: None,
            seed: 42,
        }
    }
}

impl<A, C> DdpgConfig<A, C>
where
    A: DeserializeOwned + Serialize,
    C: DeserializeOwned + Serialize,
{
    /// Sets the configuration of the actor.
    pub fn actor_config(mut self, v: A) -> Self {
        self.actor_config = Some(v);
        self
    }

    /// Sets the configuration of the critic.
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

    /// Sets the scale of the exploration noise.
    pub fn ou_sigma(mut self, v: f64) -> Self {
        self.ou_sigma = v;
        self
    }

    /// Sets if a separate target actor is maintained.
    pub fn use_actor_target(mut self, v: bool) -> Self {
        self.use_actor_target = v;
        self
    }

    /// Sets if a separate target critic is maintained.
    pub fn use_critic_target(mut self, v: bool) -> Self {
        self.use_critic_target = v;
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

    /// Saves [`DdpgConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(&path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of DDPG agent into {:?}", path.as_ref());
        Ok(())
    }

    /// Constructs [`DdpgConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of DDPG agent from {:?}", path.as_ref());
        Ok(b)
    }
}
