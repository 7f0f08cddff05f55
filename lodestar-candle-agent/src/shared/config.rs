//! Configurations of agents with shared networks.
use crate::{opt::OptimizerConfig, Device};
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

fn save_yaml<T: Serialize>(config: &T, name: &str, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(serde_yaml::to_string(config)?.as_bytes())?;
    info!("Save config of {} agent into {:?}", name, path);
    Ok(())
}

fn load_yaml<T: DeserializeOwned>(name: &str, path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let rdr = BufReader::new(file);
    let b = serde_yaml::from_reader(rdr)?;
    info!("Load config of {} agent from {:?}", name, path);
    Ok(b)
}

/// Configuration of [`SharedAc`](super::SharedAc).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SharedAcConfig<M> {
    /// Configuration of the shared network.
    pub model_config: Option<M>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,

    /// Dimension of observations.
    pub state_dim: usize,

    /// Dimension of actions.
    pub action_dim: usize,

    /// Standard deviation of the exploration noise.
    pub explore_noise: f64,

    /// Standard deviation of the noise added to target actions.
    pub policy_noise: f64,

    /// Bound of the absolute value of the target policy noise.
    pub noise_clip: f64,

    /// The target is overwritten once per this number of updates if the
    /// critic is reliable.
    pub update_freq: usize,

    /// If `true`, the critic loss is weighted by importance weights and TD
    /// errors are reported to the replay buffer.
    pub use_per: bool,

    /// Device of the network. The best available one if `None`.
    pub device: Option<Device>,

    /// Seed of the random number generator of exploration.
    pub seed: u64,
}

impl<M> Default for SharedAcConfig<M> {
    fn default() -> Self {
        Self {
            model_config: None,
            opt_config: OptimizerConfig::default(),
            state_dim: 0,
            action_dim: 0,
            explore_noise: 0.2,
            policy_noise: 0.4,
            noise_clip: 0.5,
            update_freq: 128,
            use_per: false,
            device: None,
            seed: 42,
        }
    }
}

impl<M: DeserializeOwned + Serialize> SharedAcConfig<M> {
    /// Sets the configuration of the shared network.
    pub fn model_config(mut self, v: M) -> Self {
        self.model_config = Some(v);
        self
    }

    /// Sets the learning rate.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.opt_config = self.opt_config.learning_rate(v);
        self
    }

    /// Sets the dimensions of observations and actions.
    pub fn dims(mut self, state_dim: usize, action_dim: usize) -> Self {
        self.state_dim = state_dim;
        self.action_dim = action_dim;
        self
    }

    /// Sets the standard deviation of the exploration noise.
    pub fn explore_noise(mut self, v: f64) -> Self {
        self.explore_noise = v;
        self
    }

    /// Sets the interval of hard target updates.
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

    /// Saves [`SharedAcConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_yaml(self, "SharedAC", path.as_ref())
    }

    /// Constructs [`SharedAcConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_yaml("SharedAC", path.as_ref())
    }
}

/// Configuration of [`SharedSac`](super::SharedSac).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SharedSacConfig<M> {
    /// Configuration of the shared network.
    pub model_config: Option<M>,

    /// Configuration of the optimizer, which also trains `alpha_log`.
    pub opt_config: OptimizerConfig,

    /// Dimension of observations.
    pub state_dim: usize,

    /// Dimension of actions.
    pub action_dim: usize,

    /// Initial `alpha_log`. `-ln(action_dim) * e` if `None`.
    pub alpha_log_init: Option<f64>,

    /// Target entropy. `ln(action_dim)` if `None`.
    pub target_entropy: Option<f64>,

    /// `alpha_log` is clamped into this range after every update.
    pub alpha_log_range: (f64, f64),

    /// If `true`, the critic loss is weighted by importance weights and TD
    /// errors are reported to the replay buffer.
    pub use_per: bool,

    /// Device of the network. The best available one if `None`.
    pub device: Option<Device>,
}

impl<M> Default for SharedSacConfig<M> {
    fn default() -> Self {
        Self {
            model_config: None,
            opt_config: OptimizerConfig::default(),
            state_dim: 0,
            action_dim: 0,
            alpha_log_init: None,
            target_entropy: None,
            alpha_log_range: (-20.0, 2.0),
            use_per: false,
            device: None,
        }
    }
}

impl<M> SharedSacConfig<M> {
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

impl<M: DeserializeOwned + Serialize> SharedSacConfig<M> {
    /// Sets the configuration of the shared network.
    pub fn model_config(mut self, v: M) -> Self {
        self.model_config = Some(v);
        self
    }

    /// Sets the learning rate.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.opt_config = self.opt_config.learning_rate(v);
        self
    }

    /// Sets the dimensions of observations and actions.
    pub fn dims(mut self, state_dim: usize, action_dim: usize) -> Self {
        self.state_dim = state_dim;
        self.action_dim = action_dim;
        self
    }

    /// Sets the initial `alpha_log`.
    pub fn alpha_log_init(mut self, v: f64) -> Self {
        self.alpha_log_init = Some(v);
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

    /// Saves [`SharedSacConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_yaml(self, "SharedSAC", path.as_ref())
    }

    /// Constructs [`SharedSacConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_yaml("SharedSAC", path.as_ref())
    }
}

/// Configuration of [`SharedPpo`](super::SharedPpo).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SharedPpoConfig<M> {
    /// Configuration of the shared network.
    pub model_config: Option<M>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,

    /// Dimension of observations.
    pub state_dim: usize,

    /// Dimension of actions.
    pub action_dim: usize,

    /// The probability ratio is clipped into `[1 - ratio_clip, 1 + ratio_clip]`.
    pub ratio_clip: f64,

    /// Weight of the entropy bonus.
    pub lambda_entropy: f64,

    /// Decay of generalized advantage estimation.
    pub lambda_gae: f32,

    /// If `true`, advantages are estimated with GAE.
    pub use_gae: bool,

    /// Device of the network. The best available one if `None`.
    pub device: Option<Device>,
}

impl<M> Default for SharedPpoConfig<M> {
    fn default() -> Self {
        Self {
            model_config: None,
            opt_config: OptimizerConfig::default(),
            state_dim: 0,
            action_dim: 0,
            ratio_clip: 0.25,
            lambda_entropy: 0.01,
            lambda_gae: 0.98,
            use_gae: false,
            device: None,
        }
    }
}

impl<M: DeserializeOwned + Serialize> SharedPpoConfig<M> {
    /// Sets the configuration of the shared network.
    pub fn model_config(mut self, v: M) -> Self {
        self.model_config = Some(v);
        self
    }

    /// Sets the learning rate.
    pub fn learning_rate(mut self, v: f64) -> Self {
        self.opt_config = self.opt_config.learning_rate(v);
        self
    }

    /// Sets the dimensions of observations and actions.
    pub fn dims(mut self, state_dim: usize, action_dim: usize) -> Self {
        self.state_dim = state_dim;
        self.action_dim = action_dim;
        self
    }

    /// Sets if GAE is used, with the given decay.
    pub fn gae(mut self, use_gae: bool, lambda_gae: f32) -> Self {
        self.use_gae = use_gae;
        self.lambda_gae = lambda_gae;
        self
    }

    /// Sets the device.
    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Saves [`SharedPpoConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_yaml(self, "SharedPPO", path.as_ref())
    }

    /// Constructs [`SharedPpoConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_yaml("SharedPPO", path.as_ref())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mlp::SharedMlpConfig;
    use tempdir::TempDir;

    #[test]
    fn test_defaults() {
        let ac = SharedAcConfig::<SharedMlpConfig>::default();
        assert_eq!((ac.explore_noise, ac.policy_noise, ac.update_freq), (0.2, 0.4, 128));
        let ppo = SharedPpoConfig::<SharedMlpConfig>::default();
        assert_eq!((ppo.ratio_clip, ppo.lambda_entropy), (0.25, 0.01));
        let sac = SharedSacConfig::<SharedMlpConfig>::default().dims(3, 1);
        assert_eq!(sac.target_entropy_or_default(), 0.0);
        assert_eq!(sac.alpha_log_init_or_default(), 0.0);
    }

    #[test]
    fn test_serde_shared_sac_config() -> Result<()> {
        let config = SharedSacConfig::default()
            .model_config(SharedMlpConfig::new(3, 2, 32))
            .dims(3, 2)
            .alpha_log_init(-1.0);

        let dir = TempDir::new("shared_sac_config")?;
        let path = dir.path().join("shared_sac_config.yaml");
        config.save(&path)?;
        assert_eq!(SharedSacConfig::load(&path)?, config);
        Ok(())
    }
}
