//! PPO on one network.
use super::SharedPpoConfig;
use crate::{
    base::{n_updates, obs_to_tensor},
    model::SharedPpoModel,
    net::{NetPair, CRITIC},
    ppo::{
        clipped_surrogate, gaussian_log_prob_entropy, gaussian_sample, normalize_advantage,
        reward_sum_gae, reward_sum_raw, squashed_decisions,
    },
    util::{column_tensor, gaussian_log_prob, rows_to_tensor, smooth_l1_loss, std},
    Agent, Collector, Decision, Device,
};
use anyhow::Result;
use candle_core::Tensor;
use lodestar_core::{
    error::LodestarError,
    record::{Record, RecordValue},
    trajectory_buffer::TrajectoryBuffer,
    ReplayBufferBase,
};
use log::{debug, info, trace};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::path::Path;

const VALUE_CHUNK_SIZE: usize = 1024;

/// PPO whose Gaussian policy and state-value function are heads of one network.
///
/// Each step minimizes `lambda * obj_actor + obj_critic / (std(r_sum) + 1e-5)`
/// where `lambda = exp(-obj_c^2)` and `obj_c` is a moving average of the
/// critic loss.
pub struct SharedPpo<M> {
    net: NetPair<M>,
    ratio_clip: f64,
    lambda_entropy: f64,
    lambda_gae: f32,
    use_gae: bool,
    obj_c: f64,
    state_dim: usize,
    action_dim: usize,
    collector: Collector,
    device: candle_core::Device,
    rng: SmallRng,
}

impl<M: SharedPpoModel> SharedPpo<M> {
    /// Constructs the agent.
    pub fn build(config: SharedPpoConfig<M::Config>) -> Result<Self> {
        let device = Device::resolve(config.device)?;
        let model_config = config
            .model_config
            .ok_or_else(|| LodestarError::MissingConfig("model_config".to_string()))?;
        let net = NetPair::build(model_config, &config.opt_config, false, &device)?;
        info!("Build SharedPPO agent on {:?}", device);

        Ok(Self {
            net,
            ratio_clip: config.ratio_clip,
            lambda_entropy: config.lambda_entropy,
            lambda_gae: config.lambda_gae,
            use_gae: config.use_gae,
            obj_c: (-(0.5f64).ln()).sqrt(),
            state_dim: config.state_dim,
            action_dim: config.action_dim,
            collector: Collector::new(true),
            device,
            rng: SmallRng::seed_from_u64(42),
        })
    }

    /// An empty buffer of the transitions this agent records.
    pub fn trajectory_buffer(&self, gamma: f32) -> TrajectoryBuffer {
        TrajectoryBuffer::new(self.state_dim, self.action_dim, self.action_dim, gamma)
    }

    /// Reliability of the critic in `(0, 1]`.
    pub fn reliable_lambda(&self) -> f64 {
        (-self.obj_c.powi(2)).exp()
    }

    fn values(&self, obs: &Tensor) -> Result<Vec<f32>> {
        let n = obs.dim(0)?;
        let mut values = Vec::with_capacity(n);
        for start in (0..n).step_by(VALUE_CHUNK_SIZE) {
            let len = VALUE_CHUNK_SIZE.min(n - start);
            let v = self.net.online().value(&obs.narrow(0, start, len)?)?;
            values.extend(v.detach().flatten_all()?.to_vec1::<f32>()?);
        }
        Ok(values)
    }
}

impl<M: SharedPpoModel> Agent for SharedPpo<M> {
    type Act = Vec<f32>;

    fn select_actions(&mut self, obs: &[Vec<f32>]) -> Result<Vec<Decision<Vec<f32>>>> {
        let net = self.net.online();
        let mean = net.action_mean(&obs_to_tensor(obs, &self.device)?)?;
        let (act, noise) = gaussian_sample(&mean, &net.log_std()?)?;
        squashed_decisions(&act, &noise)
    }

    fn collector_mut(&mut self) -> &mut Collector {
        &mut self.collector
    }

    fn update_net<R: ReplayBufferBase>(
        &mut self,
        buffer: &mut R,
        batch_size: usize,
        repeat_times: f64,
        _soft_update_tau: f64,
    ) -> Result<Record> {
        buffer.update_now_len();
        let batch = buffer.sample_all()?;
        let buf_len = batch.len();
        let buf_obs = rows_to_tensor(&batch.obs, buf_len, &self.device)?;
        let buf_act = rows_to_tensor(&batch.act, buf_len, &self.device)?;
        let buf_noise = rows_to_tensor(&batch.aux, buf_len, &self.device)?;

        let value = self.values(&buf_obs)?;
        let log_std = self.net.online().log_std()?.detach();
        let buf_logp = gaussian_log_prob(&buf_noise, &log_std)?;
        let (r_sum, adv) = match self.use_gae {
            true => reward_sum_gae(
                &batch.reward,
                &batch.mask,
                &batch.is_last,
                &value,
                self.lambda_gae,
            ),
            false => reward_sum_raw(&batch.reward, &batch.mask, &batch.is_last, &value),
        };
        let buf_r_sum = column_tensor(&r_sum, &self.device)?;
        let buf_adv = column_tensor(&normalize_advantage(&adv), &self.device)?;

        let n = n_updates(buf_len, batch_size, repeat_times);
        let mut record = Record::empty();
        for i in 0..n {
            let ixs = (0..batch_size)
                .map(|_| self.rng.gen_range(0..buf_len as u32))
                .collect::<Vec<_>>();
            let ixs = Tensor::from_vec(ixs, batch_size, &self.device)?;
            let obs = buf_obs.index_select(&ixs, 0)?;
            let act = buf_act.index_select(&ixs, 0)?;
            let old_logp = buf_logp.index_select(&ixs, 0)?;
            let r_sum = buf_r_sum.index_select(&ixs, 0)?;
            let adv = buf_adv.index_select(&ixs, 0)?;

            let net = self.net.online();
            let (logp, entropy) =
                gaussian_log_prob_entropy(&net.action_mean(&obs)?, &net.log_std()?, &act)?;
            let obj_surrogate = clipped_surrogate(&logp, &old_logp, &adv, self.ratio_clip)?;
            let obj_actor = (obj_surrogate - (entropy * self.lambda_entropy)?)?;

            let obj_critic = smooth_l1_loss(&net.value(&obs)?, &r_sum)?;
            let loss_critic = obj_critic.to_scalar::<f32>()?;
            self.obj_c = 0.995 * self.obj_c + 0.005 * loss_critic as f64;
            let lambda = self.reliable_lambda();

            let united = ((obj_actor.clone() * lambda)?
                + (obj_critic / (std(&r_sum)? as f64 + 1e-5))?)?;
            self.net.backward_step(&united)?;
            trace!("SharedPPO minibatch {}", i);

            let a_std_log = self.net.online().log_std()?.mean_all()?.to_scalar::<f32>()?;
            record = Record::from_slice(&[
                ("obj_critic", RecordValue::Scalar(loss_critic)),
                ("obj_actor", RecordValue::Scalar(obj_actor.to_scalar::<f32>()?)),
                ("a_std_log", RecordValue::Scalar(a_std_log)),
            ]);
        }
        debug!("SharedPPO update over {} transitions, {} minibatches", buf_len, n);

        Ok(record)
    }

    fn save<T: AsRef<Path>>(&self, dir: T) -> Result<()> {
        self.net.save(dir.as_ref(), CRITIC)
    }

    fn load<T: AsRef<Path>>(&mut self, dir: T) -> Result<()> {
        self.net.load(dir.as_ref(), CRITIC)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mlp::{SharedMlpConfig, SharedPpoMlp},
        testing::collect,
    };
    use lodestar_core::dummy::DummyEnv;
    use tempdir::TempDir;

    fn config() -> SharedPpoConfig<SharedMlpConfig> {
        SharedPpoConfig::default()
            .model_config(SharedMlpConfig::new(3, 2, 16))
            .dims(3, 2)
            .learning_rate(1e-3)
            .device(Device::Cpu)
    }

    #[test]
    fn test_update_net() -> Result<()> {
        let mut agent = SharedPpo::<SharedPpoMlp>::build(config().gae(true, 0.98))?;
        let mut env = DummyEnv::<Vec<f32>>::new(3, 10);
        let mut buffer = agent.trajectory_buffer(0.99);
        assert_eq!(collect(&mut agent, &mut env, &mut buffer, 48)?, 40);

        let lambda = agent.reliable_lambda();
        let record = agent.update_net(&mut buffer, 8, 1.0, 0.005)?;
        assert!(record.get_scalar("obj_critic")?.is_finite());
        assert!(record.get_scalar("obj_actor")?.is_finite());
        // Trained from its initial value of -0.5
        assert_ne!(record.get_scalar("a_std_log")?, -0.5);
        assert_ne!(agent.reliable_lambda(), lambda);
        Ok(())
    }

    #[test]
    fn test_actions_are_squashed() -> Result<()> {
        let mut agent = SharedPpo::<SharedPpoMlp>::build(config())?;
        let decisions = agent.select_actions(&[vec![0.1, 0.2, 0.3]])?;
        assert!(decisions[0].act.iter().all(|a| a.abs() <= 1.0));
        assert_eq!(decisions[0].aux.len(), 2);
        Ok(())
    }

    #[test]
    fn test_save_load() -> Result<()> {
        let dir = TempDir::new("shared_ppo")?;
        let agent = SharedPpo::<SharedPpoMlp>::build(config())?;
        agent.save(dir.path())?;
        assert!(dir.path().join("critic.pt").exists());
        assert!(dir.path().join("cri_optim.pt").exists());

        let mut agent2 = SharedPpo::<SharedPpoMlp>::build(config())?;
        agent2.load(dir.path())?;
        Ok(())
    }
}
