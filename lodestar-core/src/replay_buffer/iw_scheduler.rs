//! Scheduling the exponent of importance weight for PER.
use serde::{Deserialize, Serialize};

/// Linear schedule of the importance weight exponent $\beta$.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct IwScheduler {
    /// Initial value of $\beta$.
    pub beta_0: f32,

    /// Final value of $\beta$.
    pub beta_final: f32,

    /// Optimization steps when beta reaches its final value.
    pub n_opts_final: usize,

    /// Current optimization steps.
    pub n_opts: usize,
}

impl IwScheduler {
    /// Creates a scheduler.
    pub fn new(beta_0: f32, beta_final: f32, n_opts_final: usize) -> Self {
        Self {
            beta_0,
            beta_final,
            n_opts_final,
            n_opts: 0,
        }
    }

    /// Gets the current exponent of importance weights.
    pub fn beta(&self) -> f32 {
        if self.n_opts >= self.n_opts_final {
            self.beta_final
        } else {
            let progress = self.n_opts as f32 / self.n_opts_final as f32;
            self.beta_0 + (self.beta_final - self.beta_0) * progress
        }
    }

    /// Counts one optimization step.
    pub fn add_n_opts(&mut self) {
        self.n_opts += 1;
    }
}

#[cfg(test)]
mod test {
    use super::IwScheduler;

    #[test]
    fn test_beta_is_annealed_linearly() {
        let mut s = IwScheduler::new(0.4, 1.0, 4);
        assert!((s.beta() - 0.4).abs() < 1e-6);
        s.add_n_opts();
        s.add_n_opts();
        assert!((s.beta() - 0.7).abs() < 1e-6);
        (0..10).for_each(|_| s.add_n_opts());
        assert_eq!(s.beta(), 1.0);
    }
}
