//! Integration tests for [`dispersenn::combinations`].

use dispersenn::combinations::{binomial, PairCombinations};
use dispersenn::error::ConfigError;
use std::collections::HashSet;

#[test]
fn binomial_known_values() {
    assert_eq!(binomial(10, 2), 45);
    assert_eq!(binomial(100, 2), 4950);
    assert_eq!(binomial(5, 0), 1);
    assert_eq!(binomial(5, 5), 1);
    assert_eq!(binomial(3, 4), 0);
    assert_eq!(binomial(52, 5), 2_598_960);
}

#[test]
fn same_seed_same_combinations() {
    let a = PairCombinations::sample(100, 2, 200, 7).unwrap();
    let b = PairCombinations::sample(100, 2, 200, 7).unwrap();
    assert_eq!(a, b);
}

#[test]
fn different_seed_different_combinations() {
    let a = PairCombinations::sample(100, 2, 200, 7).unwrap();
    let b = PairCombinations::sample(100, 2, 200, 8).unwrap();
    assert_ne!(a.as_slice(), b.as_slice());
}

#[test]
fn combinations_are_distinct_sorted_and_in_range() {
    let combos = PairCombinations::sample(20, 3, 300, 1).unwrap();
    assert_eq!(combos.len(), 300);
    assert_eq!(combos.combination_size(), 3);

    let mut seen = HashSet::new();
    for c in combos.iter() {
        assert_eq!(c.len(), 3);
        assert!(c.windows(2).all(|w| w[0] < w[1]), "{c:?} not ascending");
        assert!(c.iter().all(|&i| i < 20));
        assert!(seen.insert(c.to_vec()), "{c:?} drawn twice");
    }
    assert_eq!(combos.flat_indices().len(), 900);
}

/// Requesting every subset returns each exactly once.
#[test]
fn exhaustive_draw_covers_all_subsets() {
    let combos = PairCombinations::sample(6, 2, 15, 3).unwrap();
    let seen: HashSet<Vec<usize>> = combos.as_slice().iter().cloned().collect();
    assert_eq!(seen.len(), 15);
}

/// Candidate spaces too large to rank fall back to rejection sampling.
#[test]
fn huge_candidate_space_is_sampled() {
    let combos = PairCombinations::sample(500, 6, 50, 11).unwrap();
    assert_eq!(combos.len(), 50);
    let seen: HashSet<&[usize]> = combos.iter().collect();
    assert_eq!(seen.len(), 50);
}

#[test]
fn too_many_pairs_is_rejected() {
    let err = PairCombinations::sample(5, 2, 11, 0).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InsufficientCombinations { requested: 11, n: 5, size: 2, available: 10 }
    ));
}

#[test]
fn oversized_combination_is_rejected() {
    assert!(matches!(
        PairCombinations::sample(3, 4, 1, 0),
        Err(ConfigError::InvalidValue { .. })
    ));
    assert!(matches!(
        PairCombinations::sample(3, 0, 1, 0),
        Err(ConfigError::InvalidValue { .. })
    ));
}
