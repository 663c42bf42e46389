use rand::seq::SliceRandom as _;
use tracing::info;

use crate::target::Target;

/// Caps a target list at `n` by random sampling without replacement.
///
/// When `n` is at least the list length the input is returned untouched.
/// Sampling does not preserve order — the dispatcher makes no ordering
/// guarantee anyway.
#[must_use]
pub fn sample_targets(mut targets: Vec<Target>, n: usize) -> Vec<Target> {
    if n >= targets.len() {
        return targets;
    }
    info!(total = targets.len(), sample = n, "sampling targets");
    let mut rng = rand::rng();
    targets.shuffle(&mut rng);
    targets.truncate(n);
    targets
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::target::SourceKind;

    fn targets(n: usize) -> Vec<Target> {
        (0..n)
            .map(|i| Target::new(SourceKind::GitRepo, format!("repo-{i}")))
            .collect()
    }

    #[test]
    fn sampling_yields_exactly_n_distinct_targets() {
        let sampled = sample_targets(targets(200), 5);

        assert_eq!(sampled.len(), 5);
        let distinct: HashSet<&str> = sampled.iter().map(|t| &*t.locator).collect();
        assert_eq!(distinct.len(), 5, "sampling must not repeat targets");
    }

    #[test]
    fn sample_larger_than_population_is_identity() {
        let original = targets(3);
        let sampled = sample_targets(original.clone(), 10);
        assert_eq!(sampled, original);
    }

    #[test]
    fn sampled_targets_come_from_the_population() {
        let population: HashSet<String> = targets(50).iter().map(|t| t.locator.to_string()).collect();
        for target in sample_targets(targets(50), 7) {
            assert!(population.contains(&*target.locator));
        }
    }
}
