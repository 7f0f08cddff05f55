//! Soft actor-critic on one network.
use super::SharedSacConfig;
use crate::{
    base::{continuous_decisions, n_updates, obs_to_tensor, TensorBatch},
    model::SharedSacModel,
    net::{load_if_exists, role_path, NetPair, CRITIC},
    sac::{actor_turn, EntCoef},
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

/// Soft actor-critic whose policy and twin critics are heads of one network.
///
/// `alpha_log` is trained by the optimizer of the network. At every step the
/// critic loss and the temperature objective, scaled by the reliability of
/// the critic, are summed with the actor loss on the steps the actor takes,
/// following the same ratio test as [`ModSac`](crate::sac::ModSac).
pub struct SharedSac<M> {
    net: NetPair<M>,
    ent_coef: EntCoef,
    obj_c: f64,
    objective: CriticObjective,
    collector: Collector,
    device: candle_core::Device,
}

impl<M: SharedSacModel> SharedSac<M> {
    /// Constructs the agent.
    pub fn build(config: SharedSacConfig<M::Config>) -> Result<Self> {
        let device = Device::resolve(config.device)?;
        let ent_coef = EntCoef::new(
            config.alpha_log_init_or_default(),
            config.target_entropy_or_default(),
            config.alpha_log_range,
            None,
            &device,
        )?;
        let model_config = config
            .model_config
            .ok_or_else(|| LodestarError::MissingConfig("model_config".to_string()))?;
        let net = NetPair::build_with_extra_params(
            model_config,
            &config.opt_config,
            true,
            &device,
            vec![ent_coef.param_group()],
        )?;
        info!("Build SharedSAC agent on {:?}", device);

        Ok(Self {
            net,
            ent_coef,
            obj_c: (-(0.5f64).ln()).sqrt(),
            objective: CriticObjective::from_flag(config.use_per),
            collector: Collector::new(false),
            device,
        })
    }

    /// The entropy coefficient.
    pub fn ent_coef(&self) -> &EntCoef {
        &self.ent_coef
    }

    /// Reliability of the critic in `(0, 1]`.
    pub fn reliable_lambda(&self) -> f64 {
        (-self.obj_c.powi(2)).exp()
    }

    fn obj_critic<R: ReplayBufferBase>(
        &self,
        buffer: &mut R,
        batch_size: usize,
        alpha: &Tensor,
    ) -> Result<(Tensor, Tensor)> {
        let batch = TensorBatch::new(buffer.sample_batch(batch_size)?, &self.device)?;
        let label = {
            let target = self.net.target();
            let (mean, log_std) = target.policy(&batch.next_obs)?;
            let (next_act, next_logp) = tanh_gaussian_sample(&mean, &log_std, LOG_STD_RANGE)?;
            let (q1, q2) = target.q1_q2(&batch.next_obs, &next_act)?;
            let next_v = (q1.broadcast_minimum(&q2)? - next_logp.broadcast_mul(alpha)?)?;
            (&batch.reward + (&batch.mask * next_v)?)?.detach()
        };
        let (q1, q2) = self.net.online().q1_q2(&batch.obs, &batch.act)?;
        let loss = (self.objective.loss(&q1, &label, &batch)?
            + self.objective.loss(&q2, &label, &batch)?)?;
        self.objective
            .report_td_error(buffer, &q1.broadcast_minimum(&q2)?.detach(), &label)?;
        Ok((loss, batch.obs))
    }
}

impl<M: SharedSacModel> Agent for SharedSac<M> {
    type Act = Vec<f32>;

    fn select_actions(&mut self, obs: &[Vec<f32>]) -> Result<Vec<Decision<Vec<f32>>>> {
        let (mean, log_std) = self.net.online().policy(&obs_to_tensor(obs, &self.device)?)?;
        let (act, _) = tanh_gaussian_sample(&mean, &log_std, LOG_STD_RANGE)?;
        continuous_decisions(&act)
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
        let mut update_a = 0;
        let mut obj_critic = 0f32;
        let mut obj_actor = None;

        for update_c in 1..=n {
            let alpha = self.ent_coef.alpha()?;
            let (loss_critic, obs) = self.obj_critic(buffer, batch_size, &alpha)?;
            obj_critic = loss_critic.to_scalar::<f32>()?;
            self.obj_c = 0.995 * self.obj_c + 0.005 * obj_critic as f64 / 2.0;
            let lambda = self.reliable_lambda();

            let (mean, log_std) = self.net.online().policy(&obs)?;
            let (act_pg, logp) = tanh_gaussian_sample(&mean, &log_std, LOG_STD_RANGE)?;
            let loss_alpha = (self.ent_coef.objective(&logp)? * lambda)?;

            let mut united = (loss_critic + loss_alpha)?;
            if actor_turn(update_a, update_c, lambda) {
                update_a += 1;
                let (q1, q2) = self.net.target().q1_q2(&obs, &act_pg)?;
                let loss_actor =
                    ((q1.broadcast_minimum(&q2)? - logp.broadcast_mul(&alpha)?)?.mean_all()?
                        * -1.0)?;
                obj_actor = Some(loss_actor.to_scalar::<f32>()?);
                united = (united + (loss_actor * lambda)?)?;
            }
            self.net.backward_step(&united)?;
            self.ent_coef.clamp()?;
            self.net.soft_update(soft_update_tau)?;
        }
        debug!("SharedSAC update: {} steps, {} actor steps", n, update_a);

        if n == 0 {
            return Ok(Record::empty());
        }
        let alpha = self.ent_coef.alpha()?.to_vec1::<f32>()?[0];
        let mut record = Record::from_slice(&[
            ("obj_critic", RecordValue::Scalar(obj_critic)),
            ("obj_c", RecordValue::Scalar(self.obj_c as f32)),
            ("alpha", RecordValue::Scalar(alpha)),
        ]);
        if let Some(obj_actor) = obj_actor {
            record.insert("obj_actor", RecordValue::Scalar(obj_actor));
        }
        Ok(record)
    }

    fn save<T: AsRef<Path>>(&self, dir: T) -> Result<()> {
        self.net.save(dir.as_ref(), CRITIC)?;
        self.ent_coef.save(role_path(dir.as_ref(), "alpha_log"))
    }

    fn load<T: AsRef<Path>>(&mut self, dir: T) -> Result<()> {
        self.net.load(dir.as_ref(), CRITIC)?;
        let ent_coef = &mut self.ent_coef;
        load_if_exists(&role_path(dir.as_ref(), "alpha_log"), |path| ent_coef.load(path))
    }
}
