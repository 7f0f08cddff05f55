//! PPO agents.
//!
//! Both agents consume every transition of a [`TrajectoryBuffer`] in one
//! call of [`Agent::update_net`](crate::Agent::update_net). The caller clears
//! the buffer afterward.
//!
//! [`TrajectoryBuffer`]: lodestar_core::trajectory_buffer::TrajectoryBuffer
mod actor;
mod advantage;
mod base;
mod config;
pub use actor::{PpoDiscreteActor, PpoGaussianActor, PpoPolicy, A_STD_LOG_INIT};
pub(crate) use actor::{gaussian_log_prob_entropy, gaussian_sample, squashed_decisions};
pub use advantage::{clipped_surrogate, normalize_advantage, reward_sum_gae, reward_sum_raw};
pub use base::{DiscretePpo, Ppo};
pub use config::PpoConfig;
