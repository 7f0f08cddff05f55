//! TD3 agent implemented with candle.
use super::Td3Config;
use crate::{
    base::{continuous_decisions, n_updates, obs_to_tensor, TensorBatch},
    model::{SubModel1, SubModel2, Twin},
    net::{NetPair, ACTOR, CRITIC},
    util::add_clipped_noise,
    Agent, Collector, CriticObjective, Decision, Device,
};
use anyhow::Result;
use candle_core::Tensor;
use lodestar_core::{
    error::LodestarError,
    record::{Record, RecordValue},
    ReplayBufferBase,
};
use log::{debug, info};
use std::path::Path;

/// TD3 agent implemented with candle.
///
/// The label bootstraps from the minimum of the twin target critics at a
/// noised target action. The actor ascends the first target critic, and it is
/// updated together with the targets once per `update_freq` critic updates.
pub struct Td3<P, Q> {
    actor: NetPair<P>,
    critic: NetPair<Twin<Q>>,
    explore_noise: f64,
    policy_noise: f64,
    noise_clip: f64,
    update_freq: usize,
    objective: CriticObjective,
    collector: Collector,
    device: candle_core::Device,
}

impl<P, Q> Td3<P, Q>
where
    P: SubModel1<Output = Tensor>,
    Q: SubModel2<Output = Tensor>,
{
    /// Constructs TD3 agent.
    pub fn build(config: Td3Config<P::Config, Q::Config>) -> Result<Self> {
        let device = Device::resolve(config.device)?;
        let actor_config = config
            .actor_config
            .ok_or_else(|| LodestarError::MissingConfig("actor_config".to_string()))?;
        let critic_config = config
            .critic_config
            .ok_or_else(|| LodestarError::MissingConfig("critic_config".to_string()))?;
        let actor = NetPair::build(
            actor_config,
            &config.actor_opt_config,
            config.use_actor_target,
            &device,
        )?;
        let critic = NetPair::build(
            critic_config,
            &config.critic_opt_config,
            config.use_critic_target,
            &device,
        )?;
        info!("Build TD3 agent on {:?}", device);

        Ok(Self {
            actor,
            critic,
            explore_noise: config.explore_noise,
            policy_noise: config.policy_noise,
            noise_clip: config.noise_clip,
            update_freq: config.update_freq.max(1),
            objective: CriticObjective::from_flag(config.use_per),
            collector: Collector::new(false),
            device,
        })
    }

    /// The actor and its target.
    pub fn actor(&self) -> &NetPair<P> {
        &self.actor
    }

    fn update_critic<R: ReplayBufferBase>(
        &mut self,
        buffer: &mut R,
        batch_size: usize,
    ) -> Result<(f32, Tensor)> {
        let batch = TensorBatch::new(buffer.sample_batch(batch_size)?, &self.device)?;
        let label = {
            let next_act = self.actor.target().forward(&batch.next_obs)?.tanh()?;
            let next_act = add_clipped_noise(&next_act, self.policy_noise, self.noise_clip)?;
            let next_q = self.critic.target().min_q(&batch.next_obs, &next_act)?;
            (&batch.reward + (&batch.mask * &next_q)?)?.detach()
        };
        let (q1, q2) = self.critic.online().qs_with_act(&batch.obs, &batch.act)?;

        let loss = (self.objective.loss(&q1, &label, &batch)?
            + self.objective.loss(&q2, &label, &batch)?)?;
        self.critic.backward_step(&loss)?;
        let q_min = q1.broadcast_minimum(&q2)?.detach();
        self.objective.report_td_error(buffer, &q_min, &label)?;

        Ok((loss.to_scalar::<f32>()?, batch.obs))
    }

    fn update_actor(&mut self, obs: &Tensor) -> Result<f32> {
        let act = self.actor.online().forward(obs)?.tanh()?;
        let q = self.critic.target().q1().forward(obs, &act)?;
        let loss = (q.mean_all()? * -1.0)?;
        self.actor.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }
}

impl<P, Q> Agent for Td3<P, Q>
where
    P: SubModel1<Output = Tensor>,
    Q: SubModel2<Output = Tensor>,
{
    type Act = Vec<f32>;

    fn select_actions(&mut self, obs: &[Vec<f32>]) -> Result<Vec<Decision<Vec<f32>>>> {
        let act = self
            .actor
            .online()
            .forward(&obs_to_tensor(obs, &self.device)?)?
            .tanh()?;
        continuous_decisions(&add_clipped_noise(&act, self.explore_noise, self.noise_clip)?)
    }

    fn collector_mut(&mut self) -> &mut Collector {
        &mut self.collector
    }

    fn update_net<R: ReplayBufferBase>(
        &mut self,
        buffer: &mut R,
        batch_size: usize,
        repeat_times: f64,
        soft_update_tau: f64,
    ) -> Result<Record> {
        buffer.update_now_len();
        let n = n_updates(buffer.now_len(), batch_size, repeat_times);
        let mut obj_critic = None;
        let mut obj_actor = None;
        for update_c in 0..n {
            let (loss, obs) = self.update_critic(buffer, batch_size)?;
            obj_critic = Some(loss);
            if update_c % self.update_freq == 0 {
                obj_actor = Some(self.update_actor(&obs)?);
                self.critic.soft_update(soft_update_tau)?;
                self.actor.soft_update(soft_update_tau)?;
            }
        }
        debug!("TD3 update with {} gradient steps", n);

        let mut record = Record::empty();
        if let Some(v) = obj_critic {
            // Sum of the twin critic losses
            record.insert("obj_critic", RecordValue::Scalar(v / 2.0));
        }
        if let Some(v) = obj_actor {
            record.insert("obj_actor", RecordValue::Scalar(v));
        }
        Ok(record)
    }

    fn save<T: AsRef<Path>>(&self, dir: T) -> Result<()> {
        self.actor.save(dir.as_ref(), ACTOR)?;
        self.critic.save(dir.as_ref(), CRITIC)
    }

    fn load<T: AsRef<Path>>(&mut self, dir: T) -> Result<()> {
        self.actor.load(dir.as_ref(), ACTOR)?;
        self.critic.load(dir.as_ref(), CRITIC)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mlp::{Mlp, MlpConfig},
        testing::{collect, replay_buffer},
    };
    use lodestar_core::dummy::DummyEnv;

    fn config() -> Td3Config<MlpConfig, MlpConfig> {
        Td3Config::default()
            .actor_config(MlpConfig::new(3, vec![16], 2, false))
            .critic_config(MlpConfig::new(5, vec![16], 1, false))
            .state_dim(3)
            .action_dim(2)
            .learning_rate(1e-3)
            .device(Device::Cpu)
    }

    fn actor_params(agent: &Td3<Mlp, Mlp>) -> Result<Vec<Vec<f32>>> {
        crate::opt::named_vars(agent.actor().varmap())
            .iter()
            .map(|(_, v)| Ok(v.as_tensor().flatten_all()?.to_vec1::<f32>()?))
            .collect()
    }

    #[test]
    fn test_update_net() -> Result<()> {
        let mut agent = Td3::<Mlp, Mlp>::build(config().use_per(true))?;
        let mut env = DummyEnv::<Vec<f32>>::new(3, 10);
        let mut buffer = replay_buffer(3, 2, true);
        collect(&mut agent, &mut env, &mut buffer, 64)?;

        let record = agent.update_net(&mut buffer, 16, 1.0, 0.005)?;
        assert!(record.get_scalar("obj_critic")?.is_finite());
        assert!(record.get_scalar("obj_actor")?.is_finite());
        Ok(())
    }

    #[test]
    fn test_actor_is_updated_on_first_step() -> Result<()> {
        // With a large update_freq, only the first critic step updates the actor
        let mut agent = Td3::<Mlp, Mlp>::build(config().update_freq(1000))?;
        let mut env = DummyEnv::<Vec<f32>>::new(3, 10);
        let mut buffer = replay_buffer(3, 2, false);
        collect(&mut agent, &mut env, &mut buffer, 32)?;

        let before = actor_params(&agent)?;
        agent.update_net(&mut buffer, 16, 1.0, 0.005)?;
        let after_first = actor_params(&agent)?;
        assert_ne!(before, after_first);

        // A single-step update starts a new count, so the actor moves again
        agent.update_net(&mut buffer, 32, 1.0, 0.005)?;
        assert_ne!(after_first, actor_params(&agent)?);
        Ok(())
    }
}
