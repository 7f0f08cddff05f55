//! TD3 agent.
mod base;
mod config;
pub use base::Td3;
pub use config::Td3Config;
