use rand::{rngs::SmallRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Ornstein-Uhlenbeck process generating temporally correlated noise.
///
/// Each draw advances the internal state
/// `x <- x - theta * x * dt - sigma * sqrt(dt) * N(0, 1)` and returns it.
pub struct OrnsteinUhlenbeckNoise {
    theta: f64,
    sigma: f64,
    dt: f64,
    state: Vec<f64>,
    rng: SmallRng,
}

impl OrnsteinUhlenbeckNoise {
    /// Creates the process with a zero initial state.
    pub fn new(size: usize, theta: f64, sigma: f64, dt: f64, seed: u64) -> Self {
        Self {
            theta,
            sigma,
            dt,
            state: vec![0.0; size],
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Advances the process by one step and returns the new state.
    pub fn sample(&mut self) -> Vec<f32> {
        let scale = self.sigma * self.dt.sqrt();
        for x in self.state.iter_mut() {
            let z: f64 = self.rng.sample(StandardNormal);
            *x -= self.theta * *x * self.dt + scale * z;
        }
        self.state.iter().map(|&x| x as f32).collect()
    }

    /// Resets the state to zero.
    pub fn reset(&mut self) {
        self.state.iter_mut().for_each(|x| *x = 0.0);
    }

    /// Current state.
    pub fn state(&self) -> &[f64] {
        &self.state
    }
}
