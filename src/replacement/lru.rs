//! LRU (Least Recently Used) replacement over a fixed set of slots.
//!
//! # Algorithm
//!
//! - On hit or load: move the slot to the youngest end
//! - On eviction: take the slot at the oldest end
//!
//! # Complexity
//!
//! - Lookup order and eviction: O(1) to start, O(n) to walk
//! - Use: O(n) shift, n being the number of slots

/// Slot indices ordered from least to most recently used.
///
/// Always a permutation of `0..N`.
#[derive(Debug, Clone)]
pub(crate) struct AgeIndex<const N: usize> {
    order: [usize; N],
}

impl<const N: usize> AgeIndex<N> {
    pub(crate) fn new() -> Self {
        Self {
            order: std::array::from_fn(|index| index),
        }
    }

    /// The least recently used slot.
    pub(crate) fn oldest(&self) -> Option<usize> {
        self.order.first().copied()
    }

    /// Slot indices from most to least recently used.
    pub(crate) fn youngest_first(&self) -> impl Iterator<Item = usize> + '_ {
        self.order.iter().rev().copied()
    }

    /// Marks `slot` as the most recently used.
    pub(crate) fn record_use(&mut self, slot: usize) {
        let Some(age) = self.order.iter().position(|&s| s == slot) else {
            return;
        };
        self.order[age..].rotate_left(1);
        debug_assert_eq!(self.order[N - 1], slot);
    }

    #[cfg(test)]
    pub(crate) fn as_slice(&self) -> &[usize] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn is_permutation<const N: usize>(ages: &AgeIndex<N>) -> bool {
        let mut seen = [false; N];
        for &slot in ages.as_slice() {
            if slot >= N || seen[slot] {
                return false;
            }
            seen[slot] = true;
        }
        true
    }

    #[test]
    fn starts_in_slot_order() {
        let ages = AgeIndex::<4>::new();
        assert_eq!(ages.as_slice(), &[0, 1, 2, 3]);
        assert_eq!(ages.oldest(), Some(0));
        assert_eq!(ages.youngest_first().collect::<Vec<_>>(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn use_moves_slot_to_youngest_end() {
        let mut ages = AgeIndex::<4>::new();
        ages.record_use(1);
        assert_eq!(ages.as_slice(), &[0, 2, 3, 1]);
        ages.record_use(0);
        assert_eq!(ages.as_slice(), &[2, 3, 1, 0]);
        assert_eq!(ages.oldest(), Some(2));

        //  using the youngest slot again is a no-op
        ages.record_use(0);
        assert_eq!(ages.as_slice(), &[2, 3, 1, 0]);
        assert!(is_permutation(&ages));
    }

    #[test]
    fn stays_a_permutation_under_random_use() {
        let mut ages = AgeIndex::<8>::new();
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..1000 {
            ages.record_use(rng.gen_range(0..8));
            assert!(is_permutation(&ages));
        }
    }
}
