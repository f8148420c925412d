//! Weighted random load balancing strategy.

use rand::Rng;

use crate::load_balancer::{backend::Host, SelectionStrategy};

/// Weighted random selector.
///
/// Draws uniformly in `[1, total_weight]` and walks the hosts that are not
/// excluded, accumulating weight; the first host whose cumulative weight
/// reaches the draw is picked. Each host is chosen with probability
/// `weight / total_weight`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedRandom;

impl WeightedRandom {
    pub fn new() -> Self {
        Self
    }

    /// Select using the supplied random source.
    pub fn select_with<R: Rng>(
        &self,
        rng: &mut R,
        hosts: &[Host],
        excluded: &[bool],
        total_weight: u64,
    ) -> Option<usize> {
        let mut candidates = hosts
            .iter()
            .enumerate()
            .filter(|(i, _)| !excluded.get(*i).copied().unwrap_or(false));

        if total_weight == 0 {
            return candidates.next().map(|(i, _)| i);
        }

        let draw = rng.gen_range(1..=total_weight);
        let mut cumulative = 0u64;
        let mut last = None;
        for (i, host) in candidates {
            cumulative += u64::from(host.weight);
            if cumulative >= draw {
                return Some(i);
            }
            last = Some(i);
        }
        // total_weight overstated the remaining hosts
        last
    }
}

impl SelectionStrategy for WeightedRandom {
    fn name(&self) -> &'static str {
        "weighted_random"
    }

    fn select(&self, hosts: &[Host], excluded: &[bool], total_weight: u64) -> Option<usize> {
        self.select_with(&mut rand::thread_rng(), hosts, excluded, total_weight)
    }
}
