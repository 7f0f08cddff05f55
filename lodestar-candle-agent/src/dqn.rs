//! DQN agents.
//!
//! [`Dqn`] learns a single Q-network; [`DoubleDqn`] learns twin Q-networks and
//! bootstraps from the minimum of their targets. Their dueling variants are
//! [`DuelDqn`] and [`D3qn`].
mod base;
mod config;
mod double;
mod explorer;
use crate::mlp::DuelMlp;
pub use base::Dqn;
pub use config::DqnConfig;
pub use double::DoubleDqn;
pub use explorer::{DqnExplorer, EpsilonGreedy, Softmax};

/// DQN with a dueling Q-network.
pub type DuelDqn = Dqn<DuelMlp>;

/// Double DQN with dueling Q-networks.
pub type D3qn = DoubleDqn<DuelMlp>;
