use std::collections::HashMap;

use itertools::Itertools;
use special::Gamma;

/// Prevent the inner value from being verbosely / pretty printed during a debug.
pub(crate) struct NoPrettyPrint<T: std::fmt::Debug>(pub T);

impl<T: std::fmt::Debug> NoPrettyPrint<T> {
    pub const fn new(t: T) -> Self {
        Self(t)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for NoPrettyPrint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Prevent "{:#?}" from being used.
        write!(f, "{:?}", self.0)
    }
}

/// Natural log of the gamma function.
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    x.ln_gamma().0
}

/// Trapezoid rule integration of `y` sampled at `x`.
#[must_use]
pub fn trapz(y: &[f64], x: &[f64]) -> f64 {
    x.iter()
        .zip(x.iter().skip(1))
        .zip(y.iter().zip(y.iter().skip(1)))
        .map(|((x0, x1), (y0, y1))| (y1 + y0) * (x1 - x0) / 2.0)
        .sum()
}

/// `n` evenly spaced points from `a` to `b` inclusive.
#[must_use]
pub fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![a],
        #[allow(clippy::cast_precision_loss)]
        _ => {
            let step = (b - a) / (n - 1) as f64;
            (0..n).map(|i| a + step * i as f64).collect()
        }
    }
}

// Brute-force checks for samplers on small populations: enumerate every
// partition with `set_partitions` or `labelings`, score each one exactly,
// and compare the normalized scores against a histogram of `canonical`
// sampler states with `kl_divergence`. Enumeration grows with the Bell
// numbers, so keep `n` to a handful of entities.

/// Relabel an assignment so labels appear in order of first occurrence.
///
/// Two assignments describe the same partition exactly when their
/// canonical forms are equal.
#[must_use]
pub fn canonical(labels: &[usize]) -> Vec<usize> {
    let mut relabel: HashMap<usize, usize> = HashMap::new();
    labels
        .iter()
        .map(|label| {
            let next = relabel.len();
            *relabel.entry(*label).or_insert(next)
        })
        .collect()
}

/// Every assignment of `n` entities to `k` labels, in lexicographic order.
pub fn labelings(n: usize, k: usize) -> impl Iterator<Item = Vec<usize>> {
    let products: Box<dyn Iterator<Item = Vec<usize>>> = if n == 0 {
        Box::new(std::iter::once(Vec::new()))
    } else {
        Box::new((0..n).map(|_| 0..k).multi_cartesian_product())
    };
    products
}

/// Every set partition of `n` entities, each in canonical form.
///
/// Meant for exact posteriors over a few entities; there are Bell(`n`)
/// of them.
pub fn set_partitions(n: usize) -> impl Iterator<Item = Vec<usize>> {
    labelings(n, n).filter(|labels| canonical(labels) == *labels)
}

/// Split `labels` into clusters of `rows`, cluster `j` holding the rows
/// labelled `j`. Labels must lie in `0..k`.
#[must_use]
pub fn cluster<T: Clone>(rows: &[T], labels: &[usize], k: usize) -> Vec<Vec<T>> {
    let mut clusters = vec![Vec::new(); k];
    for (row, &label) in rows.iter().zip(labels) {
        clusters[label].push(row.clone());
    }
    clusters
}

/// Kullback-Leibler divergence `KL(p || q)` of two discrete distributions.
///
/// Terms where `p` is zero contribute nothing.
#[must_use]
pub fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    p.iter()
        .zip(q)
        .filter(|(p, _)| **p > 0.0)
        .map(|(p, q)| p * (p / q).ln())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_relabels_by_first_occurrence() {
        assert_eq!(canonical(&[2, 2, 0, 1, 0]), vec![0, 0, 1, 2, 1]);
        assert_eq!(canonical(&[0, 1, 1]), vec![0, 1, 1]);
        assert!(canonical(&[]).is_empty());
    }

    #[test]
    fn bell_numbers() {
        let counts: Vec<usize> = (1..=5).map(|n| set_partitions(n).count()).collect();
        assert_eq!(counts, vec![1, 2, 5, 15, 52]);
        assert_eq!(set_partitions(0).count(), 1);
    }

    #[test]
    fn labelings_count() {
        assert_eq!(labelings(4, 2).count(), 16);
        assert_eq!(labelings(3, 3).next(), Some(vec![0, 0, 0]));
    }

    #[test]
    fn enumerated_crp_partitions_sum_to_one() {
        use crate::models::{ChineseRestaurant, ClusterPrior};

        let crp = ChineseRestaurant::new(0.8).unwrap();
        let rows: Vec<usize> = (0..5).collect();
        let total: f64 = set_partitions(5)
            .map(|labels| {
                let k = labels.iter().max().map_or(0, |m| m + 1);
                let counts: Vec<usize> = cluster(&rows, &labels, k).iter().map(Vec::len).collect();
                crp.ln_partition(&counts, 5).exp()
            })
            .sum();
        assert::close(total, 1.0, 1e-10);
    }

    #[test]
    fn trapz_of_line() {
        let x = linspace(0.0, 2.0, 101);
        let y: Vec<f64> = x.iter().map(|x| 3.0 * x).collect();
        assert::close(trapz(&y, &x), 6.0, 1e-10);
    }

    #[test]
    fn kl_of_identical_is_zero() {
        let p = [0.25, 0.5, 0.25];
        assert::close(kl_divergence(&p, &p), 0.0, 1e-12);
        assert!(kl_divergence(&p, &[0.5, 0.25, 0.25]) > 0.0);
    }

    #[test]
    fn ln_gamma_matches_factorial() {
        assert::close(ln_gamma(5.0), 24.0_f64.ln(), 1e-10);
        assert::close(ln_gamma(1.0), 0.0, 1e-12);
    }
}
