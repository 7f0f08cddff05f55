use anyhow::Result;
use lodestar_candle_agent::{
    ddpg::{Ddpg, DdpgConfig},
    dqn::{D3qn, Dqn, DqnConfig},
    mlp::{GaussianMlp, Mlp, MlpConfig, SharedMlpConfig, SharedPpoMlp, SharedSacMlp},
    ppo::{Ppo, PpoConfig, PpoGaussianActor},
    sac::{ModSac, SacConfig},
    shared::{SharedPpo, SharedPpoConfig, SharedSac, SharedSacConfig},
    td3::{Td3, Td3Config},
    Agent, Device,
};
use lodestar_core::{
    dummy::{DummyEnv, DummyVecEnv},
    replay_buffer::{SimpleReplayBuffer, SimpleReplayBufferConfig},
    trajectory_buffer::TrajectoryBuffer,
    Env, ExperienceBufferBase, ReplayBufferBase,
};
use tempdir::TempDir;

const OBS_DIM: usize = 3;
const ACT_DIM: usize = 2;
const N_ACTIONS: usize = 3;

fn vec_env<A>() -> DummyVecEnv<DummyEnv<A>> {
    DummyVecEnv::new(vec![DummyEnv::new(OBS_DIM, 8), DummyEnv::new(OBS_DIM, 8)])
}

fn replay_buffer(act_dim: usize) -> SimpleReplayBuffer {
    let config = SimpleReplayBufferConfig::default()
        .capacity(500)
        .obs_dim(OBS_DIM)
        .act_dim(act_dim)
        .gamma(0.99);
    SimpleReplayBuffer::build(&config)
}

/// Alternates exploration and updates, then saves and reloads the agent.
fn run_off_policy<A>(agent: &mut A, buffer: &mut SimpleReplayBuffer) -> Result<()>
where
    A: Agent,
    DummyEnv<A::Act>: Env<Act = A::Act>,
{
    let _ = env_logger::builder().is_test(true).try_init();
    let mut env = vec_env::<A::Act>();
    for _ in 0..3 {
        for trajectory in agent.explore_vec_env(&mut env, 20)?.iter() {
            buffer.push(trajectory)?;
        }
        let record = agent.update_net(buffer, 16, 1.0, 0.005)?;
        assert!(!record.is_empty());
        for (_, v) in record.iter() {
            if let lodestar_core::record::RecordValue::Scalar(v) = v {
                assert!(v.is_finite());
            }
        }
    }
    assert_eq!(buffer.now_len(), 120);

    let dir = TempDir::new("train_loop")?;
    let path = dir.path().join("agent");
    agent.save_or_load_agent(&path, true)?;
    agent.save_or_load_agent(&path, false)?;
    Ok(())
}

fn run_on_policy<A, F>(agent: &mut A, new_buffer: F) -> Result<()>
where
    A: Agent,
    DummyEnv<A::Act>: Env<Act = A::Act>,
    F: Fn(&A) -> TrajectoryBuffer,
{
    let mut env = vec_env::<A::Act>();
    let mut buffer = new_buffer(agent);
    let mut n_pushed = 0;
    for _ in 0..3 {
        for trajectory in agent.explore_vec_env(&mut env, 20)?.iter() {
            buffer.push(trajectory)?;
            n_pushed += trajectory.len();
        }
        let record = agent.update_net(&mut buffer, 8, 1.0, 0.005)?;
        assert!(record.get_scalar("obj_actor")?.is_finite());
        buffer.clear();
    }
    // Every returned trajectory ends an episode
    assert_eq!(n_pushed % 8, 0);
    Ok(())
}

#[test]
fn test_dqn() -> Result<()> {
    let config = DqnConfig::default()
        .q_config(MlpConfig::new(OBS_DIM, vec![16], N_ACTIONS, false))
        .state_dim(OBS_DIM)
        .action_dim(N_ACTIONS)
        .device(Device::Cpu);
    run_off_policy(&mut Dqn::<Mlp>::build(config)?, &mut replay_buffer(1))
}

#[test]
fn test_d3qn() -> Result<()> {
    let config = DqnConfig::for_double_dqn()
        .q_config(MlpConfig::new(OBS_DIM, vec![16], N_ACTIONS, false))
        .state_dim(OBS_DIM)
        .action_dim(N_ACTIONS)
        .device(Device::Cpu);
    run_off_policy(&mut D3qn::build(config)?, &mut replay_buffer(1))
}

#[test]
fn test_ddpg() -> Result<()> {
    let config = DdpgConfig::default()
        .actor_config(MlpConfig::new(OBS_DIM, vec![16], ACT_DIM, false))
        .critic_config(MlpConfig::new(OBS_DIM + ACT_DIM, vec![16], 1, false))
        .state_dim(OBS_DIM)
        .action_dim(ACT_DIM)
        .device(Device::Cpu);
    run_off_policy(&mut Ddpg::<Mlp, Mlp>::build(config)?, &mut replay_buffer(ACT_DIM))
}

#[test]
fn test_td3() -> Result<()> {
    let config = Td3Config::default()
        .actor_config(MlpConfig::new(OBS_DIM, vec![16], ACT_DIM, false))
        .critic_config(MlpConfig::new(OBS_DIM + ACT_DIM, vec![16], 1, false))
        .state_dim(OBS_DIM)
        .action_dim(ACT_DIM)
        .device(Device::Cpu);
    run_off_policy(&mut Td3::<Mlp, Mlp>::build(config)?, &mut replay_buffer(ACT_DIM))
}

#[test]
fn test_mod_sac() -> Result<()> {
    let config = SacConfig::for_mod_sac()
        .actor_config(MlpConfig::new(OBS_DIM, vec![16], ACT_DIM, false))
        .critic_config(MlpConfig::new(OBS_DIM + ACT_DIM, vec![16], 1, false))
        .state_dim(OBS_DIM)
        .action_dim(ACT_DIM)
        .device(Device::Cpu);
    let mut agent = ModSac::<GaussianMlp, Mlp>::build(config)?;
    run_off_policy(&mut agent, &mut replay_buffer(ACT_DIM))
}

#[test]
fn test_shared_sac() -> Result<()> {
    let config = SharedSacConfig::default()
        .model_config(SharedMlpConfig::new(OBS_DIM, ACT_DIM, 16))
        .dims(OBS_DIM, ACT_DIM)
        .device(Device::Cpu);
    let mut agent = SharedSac::<SharedSacMlp>::build(config)?;
    run_off_policy(&mut agent, &mut replay_buffer(ACT_DIM))
}

#[test]
fn test_ppo() -> Result<()> {
    let config = PpoConfig::default()
        .actor_config(MlpConfig::new(OBS_DIM, vec![16], ACT_DIM, false))
        .critic_config(MlpConfig::new(OBS_DIM, vec![16], 1, false))
        .state_dim(OBS_DIM)
        .gae(true, 0.98)
        .device(Device::Cpu);
    let mut agent = Ppo::<PpoGaussianActor, Mlp>::build(config)?;
    run_on_policy(&mut agent, |agent: &Ppo<PpoGaussianActor, Mlp>| {
        agent.trajectory_buffer(0.99)
    })
}

#[test]
fn test_shared_ppo() -> Result<()> {
    let config = SharedPpoConfig::default()
        .model_config(SharedMlpConfig::new(OBS_DIM, ACT_DIM, 16))
        .dims(OBS_DIM, ACT_DIM)
        .device(Device::Cpu);
    let mut agent = SharedPpo::<SharedPpoMlp>::build(config)?;
    run_on_policy(&mut agent, |agent: &SharedPpo<SharedPpoMlp>| {
        agent.trajectory_buffer(0.99)
    })
}
