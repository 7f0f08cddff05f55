#![warn(missing_docs)]
//! Core components of lodestar.
//!
//! This crate holds everything an agent interacts with that does not depend on
//! a tensor backend:
//!
//! * [`Env`] and [`VecEnv`], the single and vectorized environment interfaces.
//! * [`Transition`], the record an agent produces for every environment step,
//!   and the batch types handed back by buffers ([`TransitionBatch`],
//!   [`TrajectoryBatch`]).
//! * [`ReplayBufferBase`] and [`ExperienceBufferBase`], the sampling and
//!   insertion contracts of buffers, implemented by
//!   [`replay_buffer::SimpleReplayBuffer`] (uniform or prioritized replay) and
//!   [`trajectory_buffer::TrajectoryBuffer`] (on-policy container).
//! * [`record::Record`], a map of named values returned by agent updates.
//!
//! The agents themselves live in backend-specific crates.
pub mod dummy;
pub mod error;
pub mod record;
pub mod replay_buffer;
pub mod trajectory_buffer;

mod base;
pub use base::{
    ExperienceBufferBase, Env, ReplayBufferBase, Step, Trajectory, TrajectoryBatch, Transition,
    TransitionBatch, VecEnv,
};
