//! Replay buffer.
use super::{TrajectoryBatch, Transition, TransitionBatch};
use crate::error::LodestarError;
use anyhow::Result;

/// Interface of buffers into which transitions are pushed.
pub trait ExperienceBufferBase {
    /// Pushes the transitions of one trajectory into the buffer.
    ///
    /// Rewards are scaled and continuation masks are formed on insertion.
    fn push(&mut self, trajectory: &[Transition]) -> Result<()>;

    /// The number of transitions in the buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer has no transitions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface of buffers from which agents take batches.
///
/// The number of transitions visible to sampling is cached and only refreshed
/// by [`ReplayBufferBase::update_now_len`], so that a batch of pushes becomes
/// visible at once.
pub trait ReplayBufferBase {
    /// Refreshes the number of transitions visible to sampling.
    fn update_now_len(&mut self);

    /// The number of transitions visible to sampling.
    fn now_len(&self) -> usize;

    /// The number of transitions the buffer can hold.
    fn max_len(&self) -> usize;

    /// Samples a batch of `batch_size` transitions with replacement.
    ///
    /// Fails with [`LodestarError::BufferUnderflow`] if fewer than `batch_size`
    /// transitions are visible.
    fn sample_batch(&mut self, batch_size: usize) -> Result<TransitionBatch>;

    /// Takes all transitions in insertion order.
    fn sample_all(&mut self) -> Result<TrajectoryBatch> {
        Err(LodestarError::UnsupportedSampling("sample_all".to_string()).into())
    }

    /// Refreshes the priorities of the transitions in the last sampled batch.
    ///
    /// `td_err[i]` corresponds to the `i`-th transition of that batch.
    /// Buffers without prioritized sampling ignore the call.
    fn td_error_update(&mut self, td_err: &[f32]) -> Result<()> {
        let _ = td_err;
        Ok(())
    }
}
