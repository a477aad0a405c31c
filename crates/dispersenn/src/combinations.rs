//! Seeded sampling of the individual combinations the extractor compares.
//!
//! `pairs` distinct subsets of size `combination_size` are drawn once per
//! model build from `{0, …, n−1}` and stay fixed for training and
//! prediction. Each subset is stored ascending; the collection keeps the
//! order in which subsets were drawn, which is also the row order of the
//! feature block.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use std::collections::HashSet;
use tracing::debug;

use crate::error::ConfigError;

/// Above this many candidate subsets, sample by rejection instead of ranking.
const MAX_RANKED: u128 = 1 << 24;

/// Fixed, ordered set of distinct index combinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairCombinations {
    n: usize,
    size: usize,
    combos: Vec<Vec<usize>>,
}

impl PairCombinations {
    /// Draw `pairs` distinct `size`-subsets of `0..n` using `seed`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] when `size` is zero or exceeds `n`, and
    /// [`ConfigError::InsufficientCombinations`] when `pairs > C(n, size)`.
    pub fn sample(n: usize, size: usize, pairs: usize, seed: u64) -> Result<Self, ConfigError> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::sample_with(n, size, pairs, &mut rng)
    }

    /// As [`PairCombinations::sample`], drawing from a caller-supplied RNG.
    pub fn sample_with(
        n: usize,
        size: usize,
        pairs: usize,
        rng: &mut StdRng,
    ) -> Result<Self, ConfigError> {
        if size == 0 || size > n {
            return Err(ConfigError::invalid_value(
                "combination_size",
                format!("must be in [1, n={n}], got {size}"),
            ));
        }
        let available = binomial(n, size);
        if pairs as u128 > available {
            return Err(ConfigError::InsufficientCombinations {
                requested: pairs,
                n,
                size,
                available,
            });
        }

        let combos = if available <= MAX_RANKED {
            index::sample(rng, available as usize, pairs)
                .into_iter()
                .map(|rank| unrank(n, size, rank as u128))
                .collect()
        } else {
            let mut seen = HashSet::with_capacity(pairs);
            let mut combos = Vec::with_capacity(pairs);
            while combos.len() < pairs {
                let mut combo = index::sample(rng, n, size).into_vec();
                combo.sort_unstable();
                if seen.insert(combo.clone()) {
                    combos.push(combo);
                }
            }
            combos
        };

        debug!(n, size, pairs, "sampled individual combinations");
        Ok(PairCombinations { n, size, combos })
    }

    /// Number of combinations.
    pub fn len(&self) -> usize {
        self.combos.len()
    }

    /// `true` when no combinations were requested.
    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }

    /// Individuals each combination is drawn from.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Individuals per combination.
    pub fn combination_size(&self) -> usize {
        self.size
    }

    /// Combinations in sampling order.
    pub fn as_slice(&self) -> &[Vec<usize>] {
        &self.combos
    }

    /// Iterate combinations in sampling order.
    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.combos.iter().map(Vec::as_slice)
    }

    /// All indices flattened in sampling order, `pairs · size` long.
    pub fn flat_indices(&self) -> Vec<usize> {
        self.combos.iter().flatten().copied().collect()
    }
}

/// `C(n, k)`, saturating at `u128::MAX`.
pub fn binomial(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        // acc * (n - i) is divisible by (i + 1) at every step.
        acc = match acc.checked_mul((n - i) as u128) {
            Some(v) => v / (i as u128 + 1),
            None => return u128::MAX,
        };
    }
    acc
}

/// The `rank`-th `k`-subset of `0..n` in lexicographic order.
fn unrank(n: usize, k: usize, mut rank: u128) -> Vec<usize> {
    let mut out = Vec::with_capacity(k);
    let mut next = 0;
    for slot in 0..k {
        let remaining = k - slot - 1;
        let mut c = next;
        loop {
            let block = binomial(n - c - 1, remaining);
            if rank < block {
                break;
            }
            rank -= block;
            c += 1;
        }
        out.push(c);
        next = c + 1;
    }
    out
}
