//! Double DQN agent.
use super::{DqnConfig, DqnExplorer};
use crate::{
    base::{n_updates, obs_to_tensor, TensorBatch},
    model::{SubModel1, Twin},
    net::{NetPair, CRITIC},
    Agent, Collector, CriticObjective, Decision, Device,
};
use anyhow::Result;
use candle_core::{shape::D, DType, Tensor};
use lodestar_core::{
    error::LodestarError,
    record::{Record, RecordValue},
    ReplayBufferBase,
};
use log::{debug, info};
use rand::{rngs::SmallRng, SeedableRng};
use std::path::Path;

/// Double DQN agent with twin Q-networks.
///
/// The label is `r + mask * max_a min(Q1_target(s', a), Q2_target(s', a))`
/// and both networks regress onto it. Actions are chosen from the first
/// network.
pub struct DoubleDqn<Q> {
    qnet: NetPair<Twin<Q>>,
    explorer: DqnExplorer,
    objective: CriticObjective,
    collector: Collector,
    device: candle_core::Device,
    rng: SmallRng,
}

impl<Q> DoubleDqn<Q>
where
    Q: SubModel1<Output = Tensor>,
{
    /// Constructs Double DQN agent.
    pub fn build(config: DqnConfig<Q::Config>) -> Result<Self> {
        let device = Device::resolve(config.device)?;
        let q_config = config
            .q_config
            .ok_or_else(|| LodestarError::MissingConfig("q_config".to_string()))?;
        let qnet = NetPair::build(q_config, &config.opt_config, config.use_target, &device)?;
        info!("Build Double DQN agent on {:?}", device);

        Ok(Self {
            qnet,
            explorer: config.explorer,
            objective: CriticObjective::from_flag(config.use_per),
            collector: Collector::new(false),
            device,
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }

    /// The twin Q-networks and their target.
    pub fn qnet(&self) -> &NetPair<Twin<Q>> {
        &self.qnet
    }

    fn update_critic<R: ReplayBufferBase>(
        &mut self,
        buffer: &mut R,
        batch_size: usize,
    ) -> Result<(f32, f32)> {
        let batch = TensorBatch::new(buffer.sample_batch(batch_size)?, &self.device)?;
        let label = {
            let (q1, q2) = self.qnet.target().qs(&batch.next_obs)?;
            let next_q = q1.broadcast_minimum(&q2)?.max_keepdim(D::Minus1)?;
            (&batch.reward + (&batch.mask * &next_q)?)?.detach()
        };
        let (q1, q2) = {
            let act = batch.act.to_dtype(DType::U32)?;
            let (q1, q2) = self.qnet.online().qs(&batch.obs)?;
            (q1.gather(&act, D::Minus1)?, q2.gather(&act, D::Minus1)?)
        };

        let loss = (self.objective.loss(&q1, &label, &batch)?
            + self.objective.loss(&q2, &label, &batch)?)?;
        self.qnet.backward_step(&loss)?;
        let q_min = q1.broadcast_minimum(&q2)?.detach();
        self.objective.report_td_error(buffer, &q_min, &label)?;

        Ok((loss.to_scalar::<f32>()?, q1.mean_all()?.to_scalar::<f32>()?))
    }
}

impl<Q> Agent for DoubleDqn<Q>
where
    Q: SubModel1<Output = Tensor>,
{
    type Act = i64;

    fn select_actions(&mut self, obs: &[Vec<f32>]) -> Result<Vec<Decision<i64>>> {
        let qs = self
            .qnet
            .online()
            .q1()
            .forward(&obs_to_tensor(obs, &self.device)?)?;
        let acts = self.explorer.action(&qs, &mut self.rng)?;
        Ok(acts
            .into_iter()
            .map(|a| Decision::new(a, vec![a as f32]))
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
        soft_update_tau: f64,
    ) -> Result<Record> {
        buffer.update_now_len();
        let n = n_updates(buffer.now_len(), batch_size, repeat_times);
        let mut record = Record::empty();
        for _ in 0..n {
            let (obj_critic, q_value) = self.update_critic(buffer, batch_size)?;
            self.qnet.soft_update(soft_update_tau)?;
            record = Record::from_slice(&[
                ("obj_critic", RecordValue::Scalar(obj_critic)),
                ("q_value", RecordValue::Scalar(q_value)),
            ]);
        }
        debug!("Double DQN update with {} gradient steps", n);
        Ok(record)
    }

    fn save<T: AsRef<Path>>(&self, dir: T) -> Result<()> {
        self.qnet.save(dir.as_ref(), CRITIC)
    }

    fn load<T: AsRef<Path>>(&mut self, dir: T) -> Result<()> {
        self.qnet.load(dir.as_ref(), CRITIC)
    }
}
