//! SAC agent implemented with candle.
use super::{EntCoef, SacConfig};
use crate::{
    base::{continuous_decisions, n_updates, obs_to_tensor, TensorBatch},
    model::{SubModel1, SubModel2, Twin},
    net::{role_path, NetPair, ACTOR, CRITIC},
    util::{tanh_gaussian_sample, LOG_STD_RANGE},
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

/// SAC agent implemented with candle.
///
/// With log-probabilities `logp` of a tanh-squashed Gaussian policy, the
/// critic label is `r + mask * (min Q_target(s', a') - alpha * logp(a'|s'))`
/// and the actor minimizes `-(min Q_target(s, a) - alpha * logp(a|s))`.
pub struct Sac<P, Q> {
    pub(super) actor: NetPair<P>,
    pub(super) critic: NetPair<Twin<Q>>,
    pub(super) ent_coef: EntCoef,
    pub(super) objective: CriticObjective,
    pub(super) collector: Collector,
    pub(super) device: candle_core::Device,
}

impl<P, Q> Sac<P, Q>
where
    P: SubModel1<Output = (Tensor, Tensor)>,
    Q: SubModel2<Output = Tensor>,
{
    /// Constructs SAC agent.
    pub fn build(config: SacConfig<P::Config, Q::Config>) -> Result<Self> {
        let device = Device::resolve(config.device)?;
        let ent_coef = EntCoef::new(
            config.alpha_log_init_or_default(),
            config.target_entropy_or_default(),
            config.alpha_log_range,
            Some(&config.alpha_opt_config),
            &device,
        )?;
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
        info!("Build SAC agent on {:?}", device);

        Ok(Self {
            actor,
            critic,
            ent_coef,
            objective: CriticObjective::from_flag(config.use_per),
            collector: Collector::new(false),
            device,
        })
    }

    /// The entropy coefficient.
    pub fn ent_coef(&self) -> &EntCoef {
        &self.ent_coef
    }

    /// Samples actions and their log-probabilities from the online actor.
    pub(super) fn policy_sample(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, log_std) = self.actor.online().forward(obs)?;
        tanh_gaussian_sample(&mean, &log_std, LOG_STD_RANGE)
    }

    /// Applies one step on the twin critics and returns the loss and the
    /// sampled observations.
    pub(super) fn update_critic<R: ReplayBufferBase>(
        &mut self,
        buffer: &mut R,
        batch_size: usize,
        alpha: &Tensor,
    ) -> Result<(f32, Tensor)> {
        let batch = TensorBatch::new(buffer.sample_batch(batch_size)?, &self.device)?;
        let label = {
            let (mean, log_std) = self.actor.target().forward(&batch.next_obs)?;
            let (next_act, next_logp) = tanh_gaussian_sample(&mean, &log_std, LOG_STD_RANGE)?;
            let next_q = self.critic.target().min_q(&batch.next_obs, &next_act)?;
            let next_v = (next_q - next_logp.broadcast_mul(alpha)?)?;
            (&batch.reward + (&batch.mask * &next_v)?)?.detach()
        };
        let (q1, q2) = self.critic.online().qs_with_act(&batch.obs, &batch.act)?;

        let loss = (self.objective.loss(&q1, &label, &batch)?
            + self.objective.loss(&q2, &label, &batch)?)?;
        self.critic.backward_step(&loss)?;
        let q_min = q1.broadcast_minimum(&q2)?.detach();
        self.objective.report_td_error(buffer, &q_min, &label)?;

        Ok((loss.to_scalar::<f32>()?, batch.obs))
    }

    /// Applies one step on the actor given actions sampled with gradients.
    ///
    /// The value of actions is taken from the target critics if
    /// `use_target_critic`, from the online critics otherwise.
    pub(super) fn update_actor(
        &mut self,
        obs: &Tensor,
        act: &Tensor,
        logp: &Tensor,
        alpha: &Tensor,
        use_target_critic: bool,
    ) -> Result<f32> {
        let q = match use_target_critic {
            true => self.critic.target().min_q(obs, act)?,
            false => self.critic.online().min_q(obs, act)?,
        };
        let loss = ((q - logp.broadcast_mul(alpha)?)?.mean_all()? * -1.0)?;
        self.actor.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }

    pub(super) fn save_(&self, dir: &Path) -> Result<()> {
        self.actor.save(dir, ACTOR)?;
        self.critic.save(dir, CRITIC)?;
        self.ent_coef.save(role_path(dir, "alpha_log"))
    }

    pub(super) fn load_(&mut self, dir: &Path) -> Result<()> {
        self.actor.load(dir, ACTOR)?;
        self.critic.load(dir, CRITIC)?;
        let ent_coef = &mut self.ent_coef;
        crate::net::load_if_exists(&role_path(dir, "alpha_log"), |path| ent_coef.load(path))
    }

    pub(super) fn select_actions_(&self, obs: &[Vec<f32>]) -> Result<Vec<Decision<Vec<f32>>>> {
        let (act, _) = self.policy_sample(&obs_to_tensor(obs, &self.device)?)?;
        continuous_decisions(&act)
    }
}

impl<P, Q> Agent for Sac<P, Q>
where
    P: SubModel1<Output = (Tensor, Tensor)>,
    Q: SubModel2<Output = Tensor>,
{
    type Act = Vec<f32>;

    fn select_actions(&mut self, obs: &[Vec<f32>]) -> Result<Vec<Decision<Vec<f32>>>> {
        self.select_actions_(obs)
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
            let alpha = self.ent_coef.alpha()?;

            let (obj_critic, obs) = self.update_critic(buffer, batch_size, &alpha)?;
            self.critic.soft_update(soft_update_tau)?;

            let (act, logp) = self.policy_sample(&obs)?;
            let obj_alpha = self.ent_coef.update(&logp)?;

            let obj_actor = self.update_actor(&obs, &act, &logp, &alpha, true)?;
            self.actor.soft_update(soft_update_tau)?;

            record = Record::from_slice(&[
                ("obj_critic", RecordValue::Scalar(obj_critic)),
                ("obj_actor", RecordValue::Scalar(obj_actor)),
                ("obj_alpha", RecordValue::Scalar(obj_alpha)),
            ]);
        }
        debug!("SAC update with {} gradient steps", n);

        if !record.is_empty() {
            let alpha = self.ent_coef.alpha()?.to_vec1::<f32>()?[0];
            record.insert("alpha", RecordValue::Scalar(alpha));
        }
        Ok(record)
    }

    fn save<T: AsRef<Path>>(&self, dir: T) -> Result<()> {
        self.save_(dir.as_ref())
    }

    fn load<T: AsRef<Path>>(&mut self, dir: T) -> Result<()> {
        self.load_(dir.as_ref())
    }
}
