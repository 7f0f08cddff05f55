//! DQN agent implemented with candle.
use super::{DqnConfig, DqnExplorer};
use crate::{
    base::{n_updates, obs_to_tensor, TensorBatch},
    model::SubModel1,
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

#[allow(clippy::upper_case_acronyms)]
/// DQN agent implemented with candle.
///
/// The label of the action taken at `s` is `r + mask * max_a Q_target(s', a)`.
pub struct Dqn<Q> {
    pub(super) qnet: NetPair<Q>,
    pub(super) explorer: DqnExplorer,
    pub(super) objective: CriticObjective,
    pub(super) collector: Collector,
    pub(super) device: candle_core::Device,
    pub(super) rng: SmallRng,
}

impl<Q> Dqn<Q>
where
    Q: SubModel1<Output = Tensor>,
{
    /// Constructs DQN agent.
    pub fn build(config: DqnConfig<Q::Config>) -> Result<Self> {
        let device = Device::resolve(config.device)?;
        let q_config = config
            .q_config
            .ok_or_else(|| LodestarError::MissingConfig("q_config".to_string()))?;
        let qnet = NetPair::build(q_config, &config.opt_config, config.use_target, &device)?;
        info!("Build DQN agent on {:?}", device);

        Ok(Self {
            qnet,
            explorer: config.explorer,
            objective: CriticObjective::from_flag(config.use_per),
            collector: Collector::new(false),
            device,
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }

    /// The Q-network and its target.
    pub fn qnet(&self) -> &NetPair<Q> {
        &self.qnet
    }

    /// Sets the exploration strategy.
    pub fn set_explorer(&mut self, explorer: DqnExplorer) {
        self.explorer = explorer;
    }

    fn update_critic<R: ReplayBufferBase>(
        &mut self,
        buffer: &mut R,
        batch_size: usize,
    ) -> Result<(f32, f32)> {
        let batch = TensorBatch::new(buffer.sample_batch(batch_size)?, &self.device)?;
        let label = {
            let next_q = self
                .qnet
                .target()
                .forward(&batch.next_obs)?
                .max_keepdim(D::Minus1)?;
            (&batch.reward + (&batch.mask * &next_q)?)?.detach()
        };
        let q = {
            let act = batch.act.to_dtype(DType::U32)?;
            self.qnet.online().forward(&batch.obs)?.gather(&act, D::Minus1)?
        };

        let loss = self.objective.loss(&q, &label, &batch)?;
        self.qnet.backward_step(&loss)?;
        self.objective.report_td_error(buffer, &q.detach(), &label)?;

        Ok((loss.to_scalar::<f32>()?, q.mean_all()?.to_scalar::<f32>()?))
    }
}

impl<Q> Agent for Dqn<Q>
where
    Q: SubModel1<Output = Tensor>,
{
    type Act = i64;

    fn select_actions(&mut self, obs: &[Vec<f32>]) -> Result<Vec<Decision<i64>>> {
        let qs = self.qnet.online().forward(&obs_to_tensor(obs, &self.device)?)?;
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
        debug!("DQN update with {} gradient steps", n);
        Ok(record)
    }

    fn save<T: AsRef<Path>>(&self, dir: T) -> Result<()> {
        self.qnet.save(dir.as_ref(), CRITIC)
    }

    fn load<T: AsRef<Path>>(&mut self, dir: T) -> Result<()> {
        self.qnet.load(dir.as_ref(), CRITIC)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Context;
    use crate::{
        dqn::EpsilonGreedy,
        mlp::{Mlp, MlpConfig},
        testing::{collect, init_logger, replay_buffer, TdErrorLog},
    };
    use lodestar_core::dummy::DummyEnv;
    use tempdir::TempDir;

    fn config() -> DqnConfig<MlpConfig> {
        DqnConfig::default()
            .q_config(MlpConfig::new(3, vec![16], 2, false))
            .state_dim(3)
            .action_dim(2)
            .learning_rate(1e-3)
            .device(Device::Cpu)
    }

    #[test]
    fn test_missing_q_config() {
        let config = DqnConfig::<MlpConfig>::default().device(Device::Cpu);
        assert!(Dqn::<Mlp>::build(config).is_err());
    }

    #[test]
    fn test_zero_explore_rate_takes_argmax() -> Result<()> {
        let mut agent = Dqn::<Mlp>::build(
            config().explorer(DqnExplorer::EpsilonGreedy(EpsilonGreedy::new(0.0))),
        )?;
        let obs = vec![vec![0.0, 1.0, 1.0], vec![0.5, -1.0, 2.0], vec![1.0, 0.3, 0.0]];
        let expected = agent
            .qnet()
            .online()
            .forward(&obs_to_tensor(&obs, &candle_core::Device::Cpu)?)?
            .argmax(D::Minus1)?
            .to_vec1::<u32>()?;
        for _ in 0..10 {
            let acts = agent
                .select_actions(&obs)?
                .into_iter()
                .map(|d| d.act as u32)
                .collect::<Vec<_>>();
            assert_eq!(acts, expected);
        }
        Ok(())
    }

    #[test]
    fn test_update_net() -> Result<()> {
        init_logger();
        let mut agent = Dqn::<Mlp>::build(config())?;
        let mut env = DummyEnv::<i64>::new(3, 10);
        let mut buffer = replay_buffer(3, 1, false);

        assert_eq!(collect(&mut agent, &mut env, &mut buffer, 64)?, 64);
        let record = agent.update_net(&mut buffer, 16, 1.0, 0.005)?;
        assert!(record.get_scalar("obj_critic")?.is_finite());
        assert!(record.get_scalar("q_value")?.is_finite());

        // Fewer transitions than a batch gives no gradient step
        let mut empty = replay_buffer(3, 1, false);
        assert!(agent.update_net(&mut empty, 16, 1.0, 0.005)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_update_net_prioritized() -> Result<()> {
        let mut agent = Dqn::<Mlp>::build(config().use_per(true))?;
        let mut env = DummyEnv::<i64>::new(3, 10);
        let mut buffer = replay_buffer(3, 1, true);
        collect(&mut agent, &mut env, &mut buffer, 64)?;
        let record = agent.update_net(&mut buffer, 16, 2.0, 0.005)?;
        assert!(record.get_scalar("obj_critic")?.is_finite());
        Ok(())
    }

    #[test]
    fn test_prioritized_update_reports_td_errors() -> Result<()> {
        let mut agent = Dqn::<Mlp>::build(config().use_per(true))?;
        let mut env = DummyEnv::<i64>::new(3, 10);
        let mut buffer = TdErrorLog::new(replay_buffer(3, 1, true));
        collect(&mut agent, &mut env, &mut buffer, 64)?;

        // 64 / 16 * 2 gradient steps, each reporting one error per sample
        agent.update_net(&mut buffer, 16, 2.0, 0.005)?;
        assert_eq!(buffer.td_errors.len(), 8);
        assert!(buffer.td_errors.iter().all(|e| e.len() == 16));
        assert!(buffer.td_errors.iter().flatten().all(|e| e.is_finite() && *e >= 0.0));

        // Priorities were equal before the update, so all weights were one
        let weight = buffer.sample_batch(16)?.weight.context("weights of PER")?;
        assert!(weight.iter().any(|&w| w < 1.0));

        // Without prioritized replay the agent reports nothing
        let mut plain = Dqn::<Mlp>::build(config())?;
        let mut uniform = TdErrorLog::new(replay_buffer(3, 1, true));
        collect(&mut plain, &mut env, &mut uniform, 64)?;
        plain.update_net(&mut uniform, 16, 2.0, 0.005)?;
        assert!(uniform.td_errors.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_load() -> Result<()> {
        let dir = TempDir::new("dqn")?;
        let mut agent = Dqn::<Mlp>::build(config())?;
        agent.save_or_load_agent(dir.path(), true)?;
        assert!(dir.path().join("critic.pt").exists());
        assert!(dir.path().join("cri_target.pt").exists());

        let mut agent2 = Dqn::<Mlp>::build(config().seed(3))?;
        agent2.save_or_load_agent(dir.path(), false)?;
        let obs = obs_to_tensor(&[vec![0.1, 0.2, 0.3]], &candle_core::Device::Cpu)?;
        let q1 = agent.qnet().online().forward(&obs)?.to_vec2::<f32>()?;
        let q2 = agent2.qnet().online().forward(&obs)?.to_vec2::<f32>()?;
        assert_eq!(q1, q2);
        Ok(())
    }
}
