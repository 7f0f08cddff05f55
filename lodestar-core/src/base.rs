//! Core traits and data types.
mod batch;
mod env;
mod replay_buffer;
mod step;
pub use batch::{TrajectoryBatch, TransitionBatch};
pub use env::{Env, VecEnv};
pub use replay_buffer::{ExperienceBufferBase, ReplayBufferBase};
pub use step::{Step, Trajectory, Transition};
