//! DDPG agent.
mod base;
mod config;
pub use base::Ddpg;
pub use config::DdpgConfig;
