//! Weighted sampling without replacement
//!
//! Efraimidis–Spirakis reservoir keys: each candidate draws `u ~ U(0,1)`
//! and is keyed by `u^(1/w)`; the k candidates with the top keys win. One
//! pass, no replacement, selection probability proportional to weight.

use rand::Rng;

/// Select up to `k` indices from `weights`, biased by weight.
///
/// Zero or negative weights are clamped to a small epsilon so every
/// candidate keeps a nonzero chance.
pub fn weighted_indices<R: Rng + ?Sized>(weights: &[f64], k: usize, rng: &mut R) -> Vec<usize> {
    let mut keyed: Vec<(usize, f64)> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let w = w.max(1e-9);
            let u: f64 = rng.gen_range(f64::EPSILON..1.0);
            (i, u.powf(1.0 / w))
        })
        .collect();
    keyed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    keyed.truncate(k);
    keyed.into_iter().map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn returns_at_most_k_distinct_indices() {
        let mut rng = StdRng::seed_from_u64(1);
        let weights = vec![1.0, 2.0, 3.0, 4.0];
        let picked = weighted_indices(&weights, 2, &mut rng);
        assert_eq!(picked.len(), 2);
        assert_ne!(picked[0], picked[1]);

        let all = weighted_indices(&weights, 10, &mut rng);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn selection_frequency_tracks_weight() {
        let mut rng = StdRng::seed_from_u64(99);
        let weights = vec![1.0, 2.0, 4.0];
        let mut counts = [0u32; 3];
        let rounds = 30_000;
        for _ in 0..rounds {
            for i in weighted_indices(&weights, 1, &mut rng) {
                counts[i] += 1;
            }
        }
        let total: f64 = weights.iter().sum();
        for (i, w) in weights.iter().enumerate() {
            let expected = w / total;
            let observed = counts[i] as f64 / rounds as f64;
            assert!(
                (observed - expected).abs() < 0.05,
                "index {i}: observed {observed:.3}, expected {expected:.3}"
            );
        }
    }

    #[test]
    fn zero_weights_do_not_panic() {
        let mut rng = StdRng::seed_from_u64(5);
        let picked = weighted_indices(&[0.0, 0.0], 1, &mut rng);
        assert_eq!(picked.len(), 1);
    }
}
