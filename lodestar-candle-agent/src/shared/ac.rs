//! Deterministic actor-critic on one network.
use super::SharedAcConfig;
use crate::{
    base::{obs_to_tensor, TensorBatch},
    model::SharedDpgModel,
    net::{NetPair, CRITIC},
    util::{add_clipped_noise, smooth_l1_loss},
    Agent, Collector, CriticObjective, Decision, Device,
};
use anyhow::Result;
use lodestar_core::{
    error::LodestarError,
    record::{Record, RecordValue},
    ReplayBufferBase,
};
use log::{debug, info};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::path::Path;

/// Deterministic actor-critic whose actor and critic are heads of one network.
///
/// The critic loss, a term keeping the actor close to the target actor and
/// the policy gradient are summed into one loss, weighted by the
/// reliability `exp(-avg_loss_c^2)` of the critic. The target is overwritten
/// with the online network once per `update_freq` steps while the critic is
/// reliable.
pub struct SharedAc<M> {
    net: NetPair<M>,
    explore_noise: f64,
    policy_noise: f64,
    noise_clip: f64,
    update_freq: usize,
    avg_loss_c: f64,
    objective: CriticObjective,
    collector: Collector,
    device: candle_core::Device,
    rng: SmallRng,
}

impl<M: SharedDpgModel> SharedAc<M> {
    /// Constructs the agent.
    pub fn build(config: SharedAcConfig<M::Config>) -> Result<Self> {
        let device = Device::resolve(config.device)?;
        let model_config = config
            .model_config
            .ok_or_else(|| LodestarError::MissingConfig("model_config".to_string()))?;
        let net = NetPair::build(model_config, &config.opt_config, true, &device)?;
        info!("Build SharedAC agent on {:?}", device);

        Ok(Self {
            net,
            explore_noise: config.explore_noise,
            policy_noise: config.policy_noise,
            noise_clip: config.noise_clip,
            update_freq: config.update_freq.max(1),
            avg_loss_c: (-(0.5f64).ln()).sqrt(),
            objective: CriticObjective::from_flag(config.use_per),
            collector: Collector::new(false),
            device,
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }

    /// Reliability of the critic in `(0, 1]`.
    pub fn reliable_lambda(&self) -> f64 {
        (-self.avg_loss_c.powi(2)).exp()
    }
}

impl<M: SharedDpgModel> Agent for SharedAc<M> {
    type Act = Vec<f32>;

    /// Adds Gaussian noise to the actions; components leaving `[-1, 1]` are
    /// replaced by uniform samples from that range.
    fn select_actions(&mut self, obs: &[Vec<f32>]) -> Result<Vec<Decision<Vec<f32>>>> {
        let act = self.net.online().act(&obs_to_tensor(obs, &self.device)?)?;
        let noised = (&act + act.randn_like(0.0, self.explore_noise)?)?.to_vec2::<f32>()?;
        let rng = &mut self.rng;
        Ok(noised
            .into_iter()
            .map(|a| {
                let a = a
                    .into_iter()
                    .map(|x| match x.abs() > 1.0 {
                        true => rng.gen_range(-1.0..1.0),
                        false => x,
                    })
                    .collect::<Vec<f32>>();
                Decision::new(a.clone(), a)
            })
            .collect())
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
        let now_len = buffer.now_len();
        let n = crate::n_updates(now_len, batch_size, repeat_times);
        // Batches grow with the fill ratio of the buffer
        let k = 1.0 + now_len as f64 / buffer.max_len().max(1) as f64;
        let batch_size_ = ((batch_size as f64 * k) as usize).min(now_len);

        let mut obj_actor = None;
        let mut obj_critic = 0f32;
        for i in 0..n {
            let batch = TensorBatch::new(buffer.sample_batch(batch_size_)?, &self.device)?;
            let (label, next_act) = {
                let target = self.net.target();
                let next_act = target.act(&batch.next_obs)?;
                let noised = add_clipped_noise(&next_act, self.policy_noise, self.noise_clip)?;
                let next_q = target.critic(&batch.next_obs, &noised)?;
                let label = (&batch.reward + (&batch.mask * next_q)?)?;
                (label.detach(), next_act.detach())
            };

            let q = self.net.online().critic(&batch.obs, &batch.act)?;
            let loss_critic = self.objective.loss(&q, &label, &batch)?;
            self.objective.report_td_error(buffer, &q.detach(), &label)?;
            obj_critic = loss_critic.to_scalar::<f32>()?;
            self.avg_loss_c = 0.995 * self.avg_loss_c + 0.005 * obj_critic as f64 / 2.0;
            let lamb = self.reliable_lambda();

            let actor_term = smooth_l1_loss(&self.net.online().act(&batch.next_obs)?, &next_act)?;
            let mut united = (loss_critic + (actor_term * (1.0 - lamb))?)?;
            if (i as f64) % repeat_times == 0.0 {
                let act_pg = self.net.online().act(&batch.obs)?;
                let loss_actor = (self.net.target().critic(&batch.obs, &act_pg)?.mean_all()? * -1.0)?;
                obj_actor = Some(loss_actor.to_scalar::<f32>()?);
                united = (united + (loss_actor * (lamb * 0.5))?)?;
            }
            self.net.backward_step(&united)?;

            if (i + 1) % self.update_freq == 0 && lamb > 0.1 {
                self.net.hard_update()?;
            }
        }
        debug!("SharedAC update with {} steps", n);

        if n == 0 {
            return Ok(Record::empty());
        }
        let mut record = Record::from_slice(&[
            ("obj_critic", RecordValue::Scalar(obj_critic)),
            ("avg_loss_c", RecordValue::Scalar(self.avg_loss_c as f32)),
        ]);
        if let Some(obj_actor) = obj_actor {
            record.insert("obj_actor", RecordValue::Scalar(obj_actor));
        }
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
        mlp::{SharedDpgMlp, SharedMlpConfig},
        testing::{collect, replay_buffer},
    };
    use lodestar_core::dummy::DummyEnv;
    use tempdir::TempDir;

    fn config() -> SharedAcConfig<SharedMlpConfig> {
        SharedAcConfig::default()
            .model_config(SharedMlpConfig::new(3, 2, 16))
            .dims(3, 2)
            .learning_rate(1e-3)
            .device(Device::Cpu)
    }

    #[test]
    fn test_missing_model_config() {
        let mut config = config();
        config.model_config = None;
        assert!(SharedAc::<SharedDpgMlp>::build(config).is_err());
    }

    #[test]
    fn test_actions_stay_in_range() -> Result<()> {
        let mut agent = SharedAc::<SharedDpgMlp>::build(config().explore_noise(5.0))?;
        let obs = vec![vec![0.5f32, -0.5, 1.0]; 16];
        for d in agent.select_actions(&obs)?.iter() {
            assert!(d.act.iter().all(|a| (-1.0..=1.0).contains(a)));
            assert_eq!(d.act, d.stored_act);
        }
        Ok(())
    }

    #[test]
    fn test_update_net() -> Result<()> {
        let mut agent = SharedAc::<SharedDpgMlp>::build(config().update_freq(2))?;
        let mut env = DummyEnv::<Vec<f32>>::new(3, 10);
        let mut buffer = replay_buffer(3, 2, false);
        collect(&mut agent, &mut env, &mut buffer, 64)?;

        let record = agent.update_net(&mut buffer, 16, 1.0, 0.005)?;
        assert!(record.get_scalar("obj_critic")?.is_finite());
        assert!(record.get_scalar("obj_actor")?.is_finite());
        assert!(agent.reliable_lambda() > 0.0 && agent.reliable_lambda() <= 1.0);
        Ok(())
    }

    #[test]
    fn test_update_with_per() -> Result<()> {
        let mut agent = SharedAc::<SharedDpgMlp>::build(config().use_per(true))?;
        let mut env = DummyEnv::<Vec<f32>>::new(3, 10);
        let mut buffer = replay_buffer(3, 2, true);
        collect(&mut agent, &mut env, &mut buffer, 64)?;
        assert!(!agent.update_net(&mut buffer, 16, 1.0, 0.005)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_uses_critic_roles() -> Result<()> {
        let dir = TempDir::new("shared_ac")?;
        let agent = SharedAc::<SharedDpgMlp>::build(config())?;
        agent.save(dir.path())?;
        assert!(dir.path().join("critic.pt").exists());
        assert!(dir.path().join("cri_target.pt").exists());
        assert!(!dir.path().join("actor.pt").exists());

        let mut agent2 = SharedAc::<SharedDpgMlp>::build(config())?;
        agent2.load(dir.path())?;
        Ok(())
    }
}
