//! RL agents implemented with [candle](https://crates.io/crates/candle-core).
//!
//! Agents share a common lifecycle: [`Agent::explore_env`] collects
//! transitions, which the caller pushes into a buffer from
//! [`lodestar_core`], and [`Agent::update_net`] consumes the buffer.
//!
//! * Value-based, discrete actions: [`dqn::Dqn`], [`dqn::DuelDqn`],
//!   [`dqn::DoubleDqn`], [`dqn::D3qn`].
//! * Actor-critic, continuous actions: [`ddpg::Ddpg`], [`td3::Td3`],
//!   [`sac::Sac`], [`sac::ModSac`].
//! * On-policy: [`ppo::Ppo`], [`ppo::DiscretePpo`].
//! * Shared actor-critic networks: [`shared::SharedAc`], [`shared::SharedSac`],
//!   [`shared::SharedPpo`].
//!
//! Function approximators are supplied by the caller through the traits in
//! [`model`]; [`mlp`] provides reference implementations.
mod base;
pub mod ddpg;
pub mod dqn;
pub mod mlp;
pub mod model;
mod net;
pub mod opt;
pub mod ppo;
pub mod sac;
pub mod shared;
pub mod td3;
#[cfg(test)]
mod testing;
pub mod util;
pub use base::{n_updates, Agent, Collector, CriticObjective, Decision};
pub use net::{Net, NetPair, Roles};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The GPU device with the given ordinal.
    Cuda(usize),
}

impl Device {
    /// Resolves an optional device, falling back to the best available one.
    ///
    /// The best available device is the first CUDA device if candle was
    /// compiled with CUDA support and one is present, the CPU otherwise.
    pub fn resolve(device: Option<Device>) -> anyhow::Result<candle_core::Device> {
        match device {
            Some(device) => Ok(candle_core::Device::try_from(device)?),
            None => Ok(candle_core::Device::cuda_if_available(0)?),
        }
    }
}

impl TryFrom<Device> for candle_core::Device {
    type Error = candle_core::Error;

    fn try_from(device: Device) -> Result<Self, Self::Error> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}
