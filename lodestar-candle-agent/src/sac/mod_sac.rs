//! SAC with a target actor and critic-gated actor updates.
use super::{Sac, SacConfig};
use crate::{
    base::n_updates,
    model::{SubModel1, SubModel2},
    Agent, Collector, Decision,
};
use anyhow::Result;
use candle_core::Tensor;
use lodestar_core::{
    record::{Record, RecordValue},
    ReplayBufferBase,
};
use log::debug;
use std::path::Path;

/// Returns `true` if the actor takes the `update_c`-th step, given it has
/// taken `update_a` steps so far.
///
/// The actor is updated at most once per critic update, and at a rate
/// approaching one as `reliable_lambda` goes to one and one half as it goes
/// to zero.
pub(crate) fn actor_turn(update_a: usize, update_c: usize, reliable_lambda: f64) -> bool {
    (update_a as f64 / update_c as f64) < 1.0 / (2.0 - reliable_lambda)
}

/// Modified SAC.
///
/// A moving average `obj_c` of the critic loss gives the reliability of the
/// critic, `exp(-obj_c^2)`. The actor is trained against the online critics
/// only when the ratio of actor to critic updates in the current call stays
/// below `1 / (2 - reliability)`, and its target tracks it after every such
/// step.
pub struct ModSac<P, Q> {
    sac: Sac<P, Q>,
    obj_c: f64,
}

impl<P, Q> ModSac<P, Q>
where
    P: SubModel1<Output = (Tensor, Tensor)>,
    Q: SubModel2<Output = Tensor>,
{
    /// Constructs the agent. See [`SacConfig::for_mod_sac`] for the defaults.
    pub fn build(config: SacConfig<P::Config, Q::Config>) -> Result<Self> {
        Ok(Self {
            sac: Sac::build(config)?,
            obj_c: (-(0.5f64).ln()).sqrt(),
        })
    }

    /// Moving average of the critic loss.
    pub fn obj_c(&self) -> f64 {
        self.obj_c
    }

    /// Reliability of the critic in `(0, 1]`.
    pub fn reliable_lambda(&self) -> f64 {
        (-self.obj_c.powi(2)).exp()
    }

    /// The wrapped SAC agent.
    pub fn sac(&self) -> &Sac<P, Q> {
        &self.sac
    }
}

impl<P, Q> Agent for ModSac<P, Q>
where
    P: SubModel1<Output = (Tensor, Tensor)>,
    Q: SubModel2<Output = Tensor>,
{
    type Act = Vec<f32>;

    fn select_actions(&mut self, obs: &[Vec<f32>]) -> Result<Vec<Decision<Vec<f32>>>> {
        self.sac.select_actions_(obs)
    }

    fn collector_mut(&mut self) -> &mut Collector {
        &mut self.sac.collector
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
            let alpha = self.sac.ent_coef.alpha()?;

            let (loss, obs) = self.sac.update_critic(buffer, batch_size, &alpha)?;
            self.sac.critic.soft_update(soft_update_tau)?;
            obj_critic = loss;
            self.obj_c = 0.995 * self.obj_c + 0.0025 * loss as f64;

            let (act, logp) = self.sac.policy_sample(&obs)?;
            self.sac.ent_coef.update(&logp)?;

            if actor_turn(update_a, update_c, self.reliable_lambda()) {
                update_a += 1;
                obj_actor = Some(self.sac.update_actor(&obs, &act, &logp, &alpha, false)?);
                self.sac.actor.soft_update(soft_update_tau)?;
            }
        }
        debug!("ModSAC update: {} critic steps, {} actor steps", n, update_a);

        if n == 0 {
            return Ok(Record::empty());
        }
        let alpha = self.sac.ent_coef.alpha()?.to_vec1::<f32>()?[0];
        let mut record = Record::from_slice(&[
            ("obj_critic", RecordValue::Scalar(obj_critic)),
            ("obj_c", RecordValue::Scalar(self.obj_c as f32)),
            ("alpha", RecordValue::Scalar(alpha)),
            ("n_actor_updates", RecordValue::Scalar(update_a as f32)),
        ]);
        if let Some(obj_actor) = obj_actor {
            record.insert("obj_actor", RecordValue::Scalar(obj_actor));
        }
        Ok(record)
    }

    fn save<T: AsRef<Path>>(&self, dir: T) -> Result<()> {
        self.sac.save_(dir.as_ref())
    }

    fn load<T: AsRef<Path>>(&mut self, dir: T) -> Result<()> {
        self.sac.load_(dir.as_ref())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mlp::{GaussianMlp, Mlp, MlpConfig},
        testing::{collect, replay_buffer},
        Device,
    };
    use lodestar_core::dummy::DummyEnv;
    use tempdir::TempDir;

    type TestModSac = ModSac<GaussianMlp, Mlp>;

    fn config() -> SacConfig<MlpConfig, MlpConfig> {
        SacConfig::for_mod_sac()
            .actor_config(MlpConfig::new(3, vec![16], 2, false))
            .critic_config(MlpConfig::new(5, vec![16], 1, false))
            .state_dim(3)
            .action_dim(2)
            .learning_rate(1e-3)
            .device(Device::Cpu)
    }

    #[test]
    fn test_actor_turn() {
        // The first critic update is always followed by an actor update
        assert!(actor_turn(0, 1, 0.0));
        // Unreliable critic: every other step
        assert!(!actor_turn(1, 2, 0.0));
        assert!(actor_turn(1, 3, 0.0));
        // Fully reliable critic: every step but never more than one per step
        assert!(actor_turn(9, 10, 1.0));
        assert!(!actor_turn(10, 10, 1.0));
    }

    #[test]
    fn test_initial_reliability() -> Result<()> {
        let agent = TestModSac::build(config())?;
        assert!((agent.reliable_lambda() - 0.5).abs() < 1e-9);
        assert!(agent.sac().actor.has_independent_target());
        Ok(())
    }

    #[test]
    fn test_unreliable_critic_halves_actor_updates() -> Result<()> {
        let mut agent = TestModSac::build(config())?;
        agent.obj_c = 100.0;
        let mut env = DummyEnv::<Vec<f32>>::new(3, 10);
        let mut buffer = replay_buffer(3, 2, false);
        collect(&mut agent, &mut env, &mut buffer, 80)?;

        // 80 / 16 = 5 critic updates, actor at 1, 3 and 5
        let record = agent.update_net(&mut buffer, 16, 1.0, 0.005)?;
        assert_eq!(record.get_scalar("n_actor_updates")?, 3.0);
        assert!(record.get_scalar("obj_actor")?.is_finite());
        Ok(())
    }

    #[test]
    fn test_update_with_per() -> Result<()> {
        let mut agent = TestModSac::build(config().use_per(true))?;
        let mut env = DummyEnv::<Vec<f32>>::new(3, 10);
        let mut buffer = replay_buffer(3, 2, true);
        collect(&mut agent, &mut env, &mut buffer, 64)?;

        let obj_c = agent.obj_c();
        let record = agent.update_net(&mut buffer, 16, 1.0, 0.005)?;
        assert!(record.get_scalar("obj_critic")?.is_finite());
        assert_ne!(agent.obj_c(), obj_c);
        let alpha_log = agent.sac().ent_coef().alpha_log_value()?;
        assert!((-16.0..=2.0).contains(&alpha_log));
        Ok(())
    }

    #[test]
    fn test_empty_update() -> Result<()> {
        let mut agent = TestModSac::build(config())?;
        let mut env = DummyEnv::<Vec<f32>>::new(3, 10);
        let mut buffer = replay_buffer(3, 2, false);
        collect(&mut agent, &mut env, &mut buffer, 8)?;
        assert!(agent.update_net(&mut buffer, 16, 1.0, 0.005)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_writes_actor_target() -> Result<()> {
        let dir = TempDir::new("mod_sac")?;
        let agent = TestModSac::build(config())?;
        agent.save(dir.path())?;
        for f in ["actor", "act_target", "act_optim", "critic", "cri_target", "cri_optim", "alpha_log"]
            .iter()
        {
            assert!(dir.path().join(format!("{}.pt", f)).exists());
        }
        Ok(())
    }
}
