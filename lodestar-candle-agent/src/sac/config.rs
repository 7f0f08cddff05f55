//! Configuration of SAC agents.
use crate::{opt::OptimizerConfig, Device};
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Sac`](super::Sac) and [`ModSac`](super::ModSac).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SacConfig<A, C> {
    /// Configuration of the actor, which outputs the mean and the log
    /// standard deviation of the Gaussian before `tanh`.
    pub actor_config: Option<A>,

    /// Configuration of each of the twin critics.
    pub critic_config: Option<C>,

    /// Configuration of the optimizer of the actor.
    pub actor_opt_config: OptimizerConfig,

    /// Configuration of the optimizer of the critics.
    pub critic_opt_config: OptimizerConfig,

    /// Configuration of the optimizer of the entropy coefficient.
    pub alpha_opt_config: OptimizerConfig,

    /// Dimension of observations.
    pub state_dim: usize,

    /// Dimension of actions.
    pub action_dim: usize,

    /// Initial `alpha_log`, `-ln(action_dim) * e` if `None`.
    pub alpha_log_init: Option<f64>,

    /// Target entropy, `ln(action_dim)` if `None`.
    pub target_entropy: Option<f64>,

    /// Range `alpha_log` is clamped into.
    pub alpha_log_range: (f64, f64),

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

/// Configuration of [`ModSac`](super::ModSac), see [`SacConfig::for_mod_sac`].
pub type ModSacConfig<A, C> = SacConfig<A, C>;

impl<A, C> Default for SacConfig<A, C> {
    fn default() -> Self {
        Self {
            actor_config: None,
            critic_config: None,
            actor_opt_config: OptimizerConfig::default(),
            critic_opt_config: OptimizerConfig::default(),
            alpha_opt_config: OptimizerConfig::default(),
            state_dim: 0,
            action_dim: 0,
            alpha_log_init: None,
            target_entropy: None,
            alpha_log_range: (-20.0, 2.0),
            use_actor_target: false,
            use_critic_target: true,
            use_per: false,
            device: None,
        }
    }
}

impl<A, C> SacConfig<A, C> {
    /// Default configuration of [`ModSac`](super::ModSac), with a target
    /// actor and `alpha_log` clamped into `[-16, 2]`.
    pub fn for_mod_sac() -> Self {
        Self {
            alpha_log_range: (-16.0, 2.0),
            use_actor_target: true,
            ..Self::default()
        }
    }

    /// Initial `alpha_log`.
    pub fn alpha_log_init_or_default(&self) -> f64 {
        self.alpha_log_init
            .unwrap_or(-(self.action_dim.max(1) as f64).ln() * std::f64::consts::E)
    }

    /// Target entropy.
    pub fn target_entropy_or_default(&self) -> f64 {
        self.target_entropy
            .unwrap_or((self.action_dim.max(1) as f64).ln())
    }
}

impl<A, C> SacConfig<A, C>
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

    /// Sets the learning rate of all optimizers.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.actor_opt_config = self.actor_opt_config.learning_rate(v);
        self.critic_opt_config = self.critic_opt_config.learning_rate(v);
        self.alpha_opt_config = self.alpha_opt_config.learning_rate(v);
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

    /// Sets the initial `alpha_log`.
    pub fn alpha_log_init(mut self, v: f64) -> Self {
        self.alpha_log_init = Some(v);
        self
    }

    /// Sets the target entropy.
    pub fn target_entropy(mut self, v: f64) -> Self {
        self.target_entropy = Some(v);
        self
    }

    /// Sets if a separate target actor is maintained.
    pub fn use_actor_target(mut self, v: bool) -> Self {
        self.use_actor_target = v;
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

    /// Saves [`SacConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(&path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of SAC agent into {:?}", path.as_ref());
        Ok(())
    }

    /// Constructs [`SacConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of SAC agent from {:?}", path.as_ref());
        Ok(b)
    }
}
