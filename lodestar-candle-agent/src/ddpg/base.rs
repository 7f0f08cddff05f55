//! DDPG agent implemented with candle.
use super::DdpgConfig;
use crate::{
    base::{continuous_decisions, n_updates, obs_to_tensor, TensorBatch},
    model::{SubModel1, SubModel2},
    net::{NetPair, ACTOR, CRITIC},
    util::OrnsteinUhlenbeckNoise,
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

/// DDPG agent implemented with candle.
///
/// Exploration adds Ornstein-Uhlenbeck noise to `tanh(actor(s))` and clips
/// the result to `[-1, 1]`. Each row of a batch of observations, that is
/// each instance of a vectorized environment, has its own noise process.
pub struct Ddpg<P, Q> {
    actor: NetPair<P>,
    critic: NetPair<Q>,
    ou_noise: Vec<OrnsteinUhlenbeckNoise>,
    ou_params: OuParams,
    objective: CriticObjective,
    collector: Collector,
    device: candle_core::Device,
}

#[derive(Clone, Copy, Debug)]
struct OuParams {
    size: usize,
    theta: f64,
    sigma: f64,
    dt: f64,
    seed: u64,
}

impl OuParams {
    fn build(&self, ix: usize) -> OrnsteinUhlenbeckNoise {
        let seed = self.seed.wrapping_add(ix as u64);
        OrnsteinUhlenbeckNoise::new(self.size, self.theta, self.sigma, self.dt, seed)
    }
}

impl<P, Q> Ddpg<P, Q>
where
    P: SubModel1<Output = Tensor>,
    Q: SubModel2<Output = Tensor>,
{
    /// Constructs DDPG agent.
    pub fn build(config: DdpgConfig<P::Config, Q::Config>) -> Result<Self> {
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
        let ou_params = OuParams {
            size: config.action_dim,
            theta: config.ou_theta,
            sigma: config.ou_sigma,
            dt: config.ou_dt,
            seed: config.seed,
        };
        info!("Build DDPG agent on {:?}", device);

        Ok(Self {
            actor,
            critic,
            ou_noise: vec![ou_params.build(0)],
            ou_params,
            objective: CriticObjective::from_flag(config.use_per),
            collector: Collector::new(false),
            device,
        })
    }

    /// The actor and its target.
    pub fn actor(&self) -> &NetPair<P> {
        &self.actor
    }

    /// The critic and its target.
    pub fn critic(&self) -> &NetPair<Q> {
        &self.critic
    }

    fn update_critic<R: ReplayBufferBase>(
        &mut self,
        buffer: &mut R,
        batch_size: usize,
    ) -> Result<(f32, Tensor)> {
        let batch = TensorBatch::new(buffer.sample_batch(batch_size)?, &self.device)?;
        let label = {
            let next_act = self.actor.target().forward(&batch.next_obs)?.tanh()?;
            let next_q = self.critic.target().forward(&batch.next_obs, &next_act)?;
            (&batch.reward + (&batch.mask * &next_q)?)?.detach()
        };
        let q = self.critic.online().forward(&batch.obs, &batch.act)?;

        let loss = self.objective.loss(&q, &label, &batch)?;
        self.critic.backward_step(&loss)?;
        self.objective.report_td_error(buffer, &q.detach(), &label)?;

        Ok((loss.to_scalar::<f32>()?, batch.obs))
    }

    fn update_actor(&mut self, obs: &Tensor) -> Result<f32> {
        let act = self.actor.online().forward(obs)?.tanh()?;
        let loss = (self.critic.online().forward(obs, &act)?.mean_all()? * -1.0)?;
        self.actor.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }
}

impl<P, Q> Agent for Ddpg<P, Q>
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
        while self.ou_noise.len() < obs.len() {
            let ix = self.ou_noise.len();
            self.ou_noise.push(self.ou_params.build(ix));
        }
        let noise = self.ou_noise[..obs.len()]
            .iter_mut()
            .flat_map(|ou| ou.sample())
            .collect::<Vec<_>>();
        let noise = Tensor::from_vec(noise, act.dims(), &self.device)?;
        continuous_decisions(&(act + noise)?.clamp(-1f32, 1f32)?)
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
        let mut record = Record::empty();
        for _ in 0..n {
            let (obj_critic, obs) = self.update_critic(buffer, batch_size)?;
            self.critic.soft_update(soft_update_tau)?;
            let obj_actor = self.update_actor(&obs)?;
            self.actor.soft_update(soft_update_tau)?;
            record = Record::from_slice(&[
                ("obj_critic", RecordValue::Scalar(obj_critic)),
                ("obj_actor", RecordValue::Scalar(obj_actor)),
            ]);
        }
        debug!("DDPG update with {} gradient steps", n);
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
