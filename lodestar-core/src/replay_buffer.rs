//! A replay buffer with uniform or prioritized sampling.
//!
//! [`SimpleReplayBuffer`] stores transitions in flat ring arrays. With a
//! [`PerConfig`], sampling is proportional to priorities held in a
//! [`SumTree`] and every batch carries importance weights whose exponent is
//! annealed by an [`IwScheduler`]. Agents feed TD errors back through
//! [`ReplayBufferBase::td_error_update`](crate::ReplayBufferBase::td_error_update).
mod base;
mod config;
mod iw_scheduler;
mod sum_tree;
pub use base::SimpleReplayBuffer;
pub use config::{PerConfig, SimpleReplayBufferConfig};
pub use iw_scheduler::IwScheduler;
pub use sum_tree::SumTree;
