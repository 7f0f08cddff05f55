//! Sum tree for prioritized sampling.
use rand::Rng;
use segment_tree::{ops::MaxIgnoreNaN, SegmentPoint};

/// Binary tree of priorities whose inner nodes hold the sum of their children.
///
/// Leaves store `(priority + eps)^alpha`. A segment tree tracks the maximum
/// stored value, which is given to newly added transitions.
#[derive(Debug)]
pub struct SumTree {
    eps: f32,
    alpha: f32,
    capacity: usize,
    n_leaves: usize,
    n_samples: usize,
    tree: Vec<f32>,
    max_tree: SegmentPoint<f32, MaxIgnoreNaN>,
}

impl SumTree {
    /// Creates a sum tree for `capacity` transitions.
    pub fn new(capacity: usize, alpha: f32) -> Self {
        let capacity = capacity.max(1);
        let n_leaves = capacity.next_power_of_two();
        Self {
            eps: 1e-8,
            alpha,
            capacity,
            n_leaves,
            n_samples: 0,
            tree: vec![0f32; 2 * n_leaves - 1],
            max_tree: SegmentPoint::build(vec![0f32; capacity], MaxIgnoreNaN),
        }
    }

    fn set(&mut self, ix: usize, p: f32) {
        self.max_tree.modify(ix, p);
        let mut node = ix + self.n_leaves - 1;
        let change = p - self.tree[node];
        self.tree[node] = p;
        while node != 0 {
            node = (node - 1) / 2;
            self.tree[node] += change;
        }
    }

    /// Sum of all priorities.
    pub fn total(&self) -> f32 {
        self.tree[0]
    }

    /// The number of filled leaves.
    pub fn len(&self) -> usize {
        self.n_samples
    }

    /// Returns `true` if no leaf has been filled.
    pub fn is_empty(&self) -> bool {
        self.n_samples == 0
    }

    /// Maximum stored priority, `1` for an empty tree.
    pub fn max_priority(&self) -> f32 {
        if self.n_samples == 0 {
            1.0
        } else {
            self.max_tree.query(0, self.n_samples)
        }
    }

    /// Fills the `ix`-th leaf with the maximum stored priority.
    pub fn add(&mut self, ix: usize) {
        debug_assert!(ix < self.capacity);
        let p = self.max_priority();
        self.set(ix, p);
        if self.n_samples < self.capacity {
            self.n_samples += 1;
        }
    }

    /// Updates the priority of the `ix`-th leaf with a TD error.
    pub fn update(&mut self, ix: usize, td_err: f32) {
        debug_assert!(ix < self.capacity);
        let p = (td_err.abs() + self.eps).powf(self.alpha);
        self.set(ix, p);
    }

    /// Gets the leaf at which the cumulative sum of priorities reaches `s`.
    pub fn get(&self, s: f32) -> usize {
        let mut node = 0;
        let mut s = s;
        while 2 * node + 1 < self.tree.len() {
            let left = 2 * node + 1;
            let right = left + 1;
            if s <= self.tree[left] || self.tree[right] == 0f32 {
                node = left;
            } else {
                s -= self.tree[left];
                node = right;
            }
        }
        (node + 1 - self.n_leaves).min(self.n_samples.saturating_sub(1))
    }

    /// Sum of the priorities of the first `n` leaves.
    pub fn prefix_total(&self, n: usize) -> f32 {
        if n >= self.n_leaves {
            return self.total();
        }
        let mut node = n + self.n_leaves - 1;
        let mut sum = 0f32;
        while node != 0 {
            // Right children have even indices
            if node % 2 == 0 {
                sum += self.tree[node - 1];
            }
            node = (node - 1) / 2;
        }
        sum
    }

    /// Samples indices among the first `n` leaves and returns normalized weights.
    ///
    /// The weight is $w_i=\left(N P(i)\right)^{-\beta}$ with $N = n$,
    /// normalized by $\max_i w_i$ within the batch.
    pub fn sample<R: Rng>(
        &self,
        batch_size: usize,
        n: usize,
        beta: f32,
        rng: &mut R,
    ) -> (Vec<usize>, Vec<f32>) {
        let n = n.min(self.n_samples).max(1);
        let p_sum = self.prefix_total(n);
        let ixs = (0..batch_size)
            .map(|_| self.get(p_sum * rng.gen::<f32>()).min(n - 1))
            .collect::<Vec<_>>();

        let scale = n as f32 / p_sum;
        let ws = ixs
            .iter()
            .map(|ix| (scale * self.tree[ix + self.n_leaves - 1]).powf(-beta))
            .collect::<Vec<_>>();
        let w_max = ws.iter().fold(f32::MIN, |m, &w| m.max(w));
        let ws = ws.iter().map(|w| w / w_max).collect();

        (ixs, ws)
    }
}

#[cfg(test)]
mod tests {
    use super::SumTree;
    use rand::{rngs::StdRng, SeedableRng};

    fn sum_tree(data: &[f32]) -> SumTree {
        let mut sum_tree = SumTree::new(8, 1.0);
        for (ix, &p) in data.iter().enumerate() {
            sum_tree.add(ix);
            sum_tree.update(ix, p);
        }
        sum_tree
    }

    #[test]
    fn test_sum_tree_odd() {
        let data = vec![0.5f32, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        let sum_tree = sum_tree(&data);

        assert_eq!(sum_tree.get(0.0), 0);
        assert_eq!(sum_tree.get(0.4), 0);
        assert_eq!(sum_tree.get(0.5), 0);
        assert_eq!(sum_tree.get(0.6), 1);
        assert_eq!(sum_tree.get(1.2), 2);
        assert_eq!(sum_tree.get(1.6), 3);
        assert_eq!(sum_tree.get(2.0), 4);
        assert_eq!(sum_tree.get(2.8), 4);
        assert!((sum_tree.total() - 9.3).abs() < 1e-4);
    }

    #[test]
    fn test_sampling_is_proportional() {
        let data = vec![0.5f32, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        let sum_tree = sum_tree(&data);
        let mut rng = StdRng::seed_from_u64(42);

        let n_samples = 100_000;
        let (ixs, ws) = sum_tree.sample(n_samples, data.len(), 1.0, &mut rng);
        assert!(ixs.iter().all(|&ix| ix < data.len()));
        assert!(ws.iter().all(|&w| w > 0.0 && w <= 1.0));
        for (ix, p) in data.iter().enumerate() {
            let expected = p / sum_tree.total();
            let freq = ixs.iter().filter(|&&e| e == ix).count() as f32 / n_samples as f32;
            assert!(
                (freq - expected).abs() < 0.01,
                "ix={}: {} vs {}",
                ix,
                freq,
                expected
            );
        }
    }

    #[test]
    fn test_sampling_within_prefix() {
        let data = vec![0.5f32, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        let sum_tree = sum_tree(&data);
        assert!((sum_tree.prefix_total(3) - 1.5).abs() < 1e-5);
        assert!((sum_tree.prefix_total(0)).abs() < 1e-6);
        assert!((sum_tree.prefix_total(8) - sum_tree.total()).abs() < 1e-5);

        let mut rng = StdRng::seed_from_u64(42);
        let (ixs, _) = sum_tree.sample(10_000, 3, 1.0, &mut rng);
        assert!(ixs.iter().all(|&ix| ix < 3));
        let freq = ixs.iter().filter(|&&ix| ix == 2).count() as f32 / 10_000.0;
        assert!((freq - 0.8 / 1.5).abs() < 0.02);
    }

    #[test]
    fn test_new_leaves_get_max_priority() {
        let mut sum_tree = SumTree::new(4, 1.0);
        assert_eq!(sum_tree.max_priority(), 1.0);
        sum_tree.add(0);
        sum_tree.update(0, 3.0);
        sum_tree.add(1);
        assert!((sum_tree.total() - 6.0).abs() < 1e-5);
    }
}
