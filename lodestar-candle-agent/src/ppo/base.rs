//! PPO agent implemented with candle.
use super::{
    clipped_surrogate, normalize_advantage, reward_sum_gae, reward_sum_raw, PpoConfig,
    PpoDiscreteActor, PpoPolicy,
};
use crate::{
    base::{n_updates, obs_to_tensor},
    model::SubModel1,
    net::{NetPair, ACTOR, CRITIC},
    util::{column_tensor, rows_to_tensor, smooth_l1_loss, std},
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

/// Number of states evaluated at once when estimating values of a trajectory.
const VALUE_CHUNK_SIZE: usize = 1024;

/// PPO agent implemented with candle.
///
/// Exploration holds back the transitions after the last finished episode of
/// each environment, so that returns are computed over complete episodes.
pub struct Ppo<A, V> {
    actor: NetPair<A>,
    critic: NetPair<V>,
    ratio_clip: f64,
    lambda_entropy: f64,
    lambda_gae: f32,
    use_gae: bool,
    state_dim: usize,
    act_dim: usize,
    aux_dim: usize,
    collector: Collector,
    device: candle_core::Device,
    rng: SmallRng,
}

/// PPO agent with a categorical policy.
pub type DiscretePpo<V> = Ppo<PpoDiscreteActor, V>;

struct Trajectories {
    obs: Tensor,
    act: Tensor,
    old_logp: Tensor,
    r_sum: Tensor,
    adv: Tensor,
    len: usize,
}

impl<A, V> Ppo<A, V>
where
    A: PpoPolicy,
    V: SubModel1<Output = Tensor>,
{
    /// Constructs PPO agent.
    pub fn build(config: PpoConfig<A::Config, V::Config>) -> Result<Self> {
        let device = Device::resolve(config.device)?;
        let actor_config = config
            .actor_config
            .ok_or_else(|| LodestarError::MissingConfig("actor_config".to_string()))?;
        let critic_config = config
            .critic_config
            .ok_or_else(|| LodestarError::MissingConfig("critic_config".to_string()))?;
        let act_dim = A::act_dim(&actor_config);
        let aux_dim = A::aux_dim(&actor_config);
        let actor = NetPair::build(actor_config, &config.actor_opt_config, false, &device)?;
        let critic = NetPair::build(
            critic_config,
            &config.critic_opt_config,
            config.use_critic_target,
            &device,
        )?;
        info!("Build PPO agent on {:?}", device);

        Ok(Self {
            actor,
            critic,
            ratio_clip: config.ratio_clip,
            lambda_entropy: config.lambda_entropy,
            lambda_gae: config.lambda_gae,
            use_gae: config.use_gae,
            state_dim: config.state_dim,
            act_dim,
            aux_dim,
            collector: Collector::new(true),
            device,
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }

    /// An empty buffer of the transitions this agent records.
    pub fn trajectory_buffer(&self, gamma: f32) -> TrajectoryBuffer {
        TrajectoryBuffer::new(self.state_dim, self.act_dim, self.aux_dim, gamma)
    }

    fn values(&self, obs: &Tensor) -> Result<Vec<f32>> {
        let n = obs.dim(0)?;
        let mut values = Vec::with_capacity(n);
        for start in (0..n).step_by(VALUE_CHUNK_SIZE) {
            let len = VALUE_CHUNK_SIZE.min(n - start);
            let v = self.critic.target().forward(&obs.narrow(0, start, len)?)?;
            values.extend(v.detach().flatten_all()?.to_vec1::<f32>()?);
        }
        Ok(values)
    }

    fn prepare<R: ReplayBufferBase>(&self, buffer: &mut R) -> Result<Trajectories> {
        let batch = buffer.sample_all()?;
        let len = batch.len();
        let obs = rows_to_tensor(&batch.obs, len, &self.device)?;
        let act = rows_to_tensor(&batch.act, len, &self.device)?;
        let aux = rows_to_tensor(&batch.aux, len, &self.device)?;

        let value = self.values(&obs)?;
        let old_logp = self.actor.online().old_log_prob(&act, &aux)?.detach();
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
        let adv = normalize_advantage(&adv);

        Ok(Trajectories {
            obs,
            act,
            old_logp,
            r_sum: column_tensor(&r_sum, &self.device)?,
            adv: column_tensor(&adv, &self.device)?,
            len,
        })
    }
}

impl<A, V> Agent for Ppo<A, V>
where
    A: PpoPolicy,
    V: SubModel1<Output = Tensor>,
{
    type Act = A::Act;

    fn select_actions(&mut self, obs: &[Vec<f32>]) -> Result<Vec<Decision<A::Act>>> {
        let obs = obs_to_tensor(obs, &self.device)?;
        self.actor.online().sample(&obs, &mut self.rng)
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
        let tr = self.prepare(buffer)?;
        let n = n_updates(tr.len, batch_size, repeat_times);
        let mut record = Record::empty();

        for i in 0..n {
            let ixs = (0..batch_size)
                .map(|_| self.rng.gen_range(0..tr.len as u32))
                .collect::<Vec<_>>();
            let ixs = Tensor::from_vec(ixs, batch_size, &self.device)?;
            let obs = tr.obs.index_select(&ixs, 0)?;
            let act = tr.act.index_select(&ixs, 0)?;
            let old_logp = tr.old_logp.index_select(&ixs, 0)?;
            let r_sum = tr.r_sum.index_select(&ixs, 0)?;
            let adv = tr.adv.index_select(&ixs, 0)?;

            let (logp, entropy) = self.actor.online().log_prob_entropy(&obs, &act)?;
            let obj_surrogate = clipped_surrogate(&logp, &old_logp, &adv, self.ratio_clip)?;
            let obj_actor = (obj_surrogate - (entropy * self.lambda_entropy)?)?;
            self.actor.backward_step(&obj_actor)?;

            let value = self.critic.online().forward(&obs)?;
            let obj_critic = (smooth_l1_loss(&value, &r_sum)? / (std(&r_sum)? as f64 + 1e-6))?;
            self.critic.backward_step(&obj_critic)?;
            self.critic.soft_update(soft_update_tau)?;
            trace!("PPO minibatch {}", i);

            record = Record::from_slice(&[
                ("obj_critic", RecordValue::Scalar(obj_critic.to_scalar::<f32>()?)),
                ("obj_actor", RecordValue::Scalar(obj_actor.to_scalar::<f32>()?)),
                ("logprob", RecordValue::Scalar(old_logp.mean_all()?.to_scalar::<f32>()?)),
            ]);
        }
        debug!("PPO update over {} transitions, {} minibatches", tr.len, n);

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
