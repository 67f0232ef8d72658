use std::fmt::Debug;

use rand::Rng;
use rv::data::Partition;
use rv::dist::Crp;
use rv::misc::ln_pflip;
use rv::traits::Sampleable;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::params::{Params, params, scalar};
use crate::utils::ln_gamma;

/// Prior over how entities are spread across the groups of a mixture.
pub trait ClusterPrior: Clone + Debug + Send + Sync {
    /// The concentration (or Dirichlet total mass).
    fn alpha(&self) -> f64;

    fn set_alpha(&mut self, alpha: f64) -> Result<()>;

    /// Number of groups a fresh model starts with.
    fn initial_groups(&self) -> usize;

    /// Largest number of groups the prior supports, `None` when unbounded.
    fn capacity(&self) -> Option<usize>;

    /// Whether groups are created and deleted as entities move.
    fn grows(&self) -> bool {
        self.capacity().is_none()
    }

    /// Log prior weight for an entity joining a group holding `count`
    /// entities, given `ngroups` live groups, of which `empties` are empty,
    /// over a population of `n`.
    fn ln_join(&self, count: usize, ngroups: usize, n: usize, empties: usize) -> f64;

    /// Log prior probability of the group sizes `counts` over `n` entities.
    fn ln_partition(&self, counts: &[usize], n: usize) -> f64;

    /// Draw the sizes of the clusters `n` fresh entities fall into.
    fn draw_cluster_sizes<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<usize>;

    fn dump(&self) -> Params {
        params([("alpha", self.alpha())])
    }

    fn load(&mut self, raw: &Params) -> Result<()> {
        self.set_alpha(scalar(raw, "alpha")?)
    }
}

/// Priors under which groups may be created and deleted after construction.
pub trait OpenPrior: ClusterPrior {}

fn validate_alpha(alpha: f64) -> Result<f64> {
    if alpha.is_finite() && alpha > 0.0 {
        Ok(alpha)
    } else {
        Err(Error::InvalidConcentration(format!(
            "alpha must be positive and finite, got {alpha}"
        )))
    }
}

/// Symmetric Dirichlet prior with total mass `alpha` over a fixed number of
/// groups `k`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedDirichlet {
    alpha: f64,
    k: usize,
}

impl FixedDirichlet {
    pub fn new(alpha: f64, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::InvalidConcentration(
                "a fixed mixture needs at least one group".into(),
            ));
        }
        Ok(Self {
            alpha: validate_alpha(alpha)?,
            k,
        })
    }

    #[must_use]
    pub const fn k(&self) -> usize {
        self.k
    }

    #[allow(clippy::cast_precision_loss)]
    fn alpha_over_k(&self) -> f64 {
        self.alpha / self.k as f64
    }
}

impl ClusterPrior for FixedDirichlet {
    fn alpha(&self) -> f64 {
        self.alpha
    }

    fn set_alpha(&mut self, alpha: f64) -> Result<()> {
        self.alpha = validate_alpha(alpha)?;
        Ok(())
    }

    fn initial_groups(&self) -> usize {
        self.k
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.k)
    }

    #[allow(clippy::cast_precision_loss)]
    fn ln_join(&self, count: usize, _ngroups: usize, n: usize, _empties: usize) -> f64 {
        ((count as f64 + self.alpha_over_k()) / (n as f64 - 1.0 + self.alpha)).ln()
    }

    #[allow(clippy::cast_precision_loss)]
    fn ln_partition(&self, counts: &[usize], n: usize) -> f64 {
        let a = self.alpha_over_k();
        let per_group: f64 = counts.iter().map(|&c| ln_gamma(c as f64 + a)).sum();
        ln_gamma(self.alpha) - ln_gamma(n as f64 + self.alpha) + per_group
            - self.k as f64 * ln_gamma(a)
    }

    /// Polya urn: each entity joins a group with weight `count + alpha / k`,
    /// the Dirichlet-categorical marginal without drawing the weights.
    #[allow(clippy::cast_precision_loss)]
    fn draw_cluster_sizes<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<usize> {
        let a = self.alpha_over_k();
        let mut sizes = vec![0_usize; self.k];
        for _ in 0..n {
            let ln_weights: Vec<f64> = sizes.iter().map(|&c| (c as f64 + a).ln()).collect();
            sizes[ln_pflip(&ln_weights, false, rng)] += 1;
        }
        sizes
    }
}

/// Chinese restaurant process prior with concentration `alpha`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChineseRestaurant {
    alpha: f64,
}

impl ChineseRestaurant {
    pub fn new(alpha: f64) -> Result<Self> {
        Ok(Self {
            alpha: validate_alpha(alpha)?,
        })
    }
}

impl ClusterPrior for ChineseRestaurant {
    fn alpha(&self) -> f64 {
        self.alpha
    }

    fn set_alpha(&mut self, alpha: f64) -> Result<()> {
        self.alpha = validate_alpha(alpha)?;
        Ok(())
    }

    fn initial_groups(&self) -> usize {
        0
    }

    fn capacity(&self) -> Option<usize> {
        None
    }

    /// Empty groups share the new-cluster mass `alpha` evenly.
    #[allow(clippy::cast_precision_loss)]
    fn ln_join(&self, count: usize, _ngroups: usize, n: usize, empties: usize) -> f64 {
        let norm = n as f64 - 1.0 + self.alpha;
        if count == 0 {
            (self.alpha / empties.max(1) as f64 / norm).ln()
        } else {
            (count as f64 / norm).ln()
        }
    }

    /// Empty groups carry no prior mass.
    #[allow(clippy::cast_precision_loss)]
    fn ln_partition(&self, counts: &[usize], n: usize) -> f64 {
        let occupied: Vec<f64> = counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| c as f64)
            .collect();
        let per_group: f64 = occupied.iter().map(|&c| ln_gamma(c)).sum();
        ln_gamma(self.alpha) - ln_gamma(n as f64 + self.alpha)
            + occupied.len() as f64 * self.alpha.ln()
            + per_group
    }

    fn draw_cluster_sizes<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<usize> {
        if n == 0 {
            return Vec::new();
        }
        let partition: Partition = Crp::new_unchecked(self.alpha, n).draw(rng);
        partition.counts().clone()
    }
}

impl OpenPrior for ChineseRestaurant {}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use rv::traits::HasDensity;

    use super::*;

    #[test]
    fn crp_partition_matches_rv() {
        let crp = ChineseRestaurant::new(1.7).unwrap();
        let z = vec![0, 0, 1, 2, 1, 0];
        let counts = vec![3, 2, 1];
        let expected = Crp::new(1.7, 6)
            .unwrap()
            .ln_f(&Partition::new_unchecked(z, counts.clone()));

        assert::close(crp.ln_partition(&counts, 6), expected, 1e-10);
        // Trailing empty groups do not change the score.
        assert::close(crp.ln_partition(&[3, 0, 2, 1], 6), expected, 1e-10);
    }

    #[test]
    fn fixed_partition_sums_to_one() {
        // Summing over every labelling of 3 entities into 2 groups.
        let prior = FixedDirichlet::new(1.3, 2).unwrap();
        let total: f64 = crate::utils::labelings(3, 2)
            .map(|labels| {
                let mut counts = [0, 0];
                labels.iter().for_each(|&l| counts[l] += 1);
                prior.ln_partition(&counts, 3).exp()
            })
            .sum();
        assert::close(total, 1.0, 1e-10);
    }

    #[test]
    fn join_weights_normalize() {
        let n = 7;
        let fixed = FixedDirichlet::new(2.0, 3).unwrap();
        // One entity out, six placed as 4 + 2 + 0.
        let total: f64 = [4, 2, 0]
            .iter()
            .map(|&c| fixed.ln_join(c, 3, n, 1).exp())
            .sum();
        assert::close(total, 1.0, 1e-12);

        let crp = ChineseRestaurant::new(2.0).unwrap();
        let total: f64 = [4, 2, 0, 0]
            .iter()
            .map(|&c| crp.ln_join(c, 4, n, 2).exp())
            .sum();
        assert::close(total, 1.0, 1e-12);
    }

    #[test]
    fn alpha_is_validated() {
        assert!(ChineseRestaurant::new(0.0).is_err());
        assert!(FixedDirichlet::new(1.0, 0).is_err());

        let mut crp = ChineseRestaurant::new(1.0).unwrap();
        assert!(crp.load(&params([("alpha", f64::NAN)])).is_err());
        assert_eq!(crp.alpha(), 1.0);
        crp.load(&params([("alpha", 3.5)])).unwrap();
        assert_eq!(crp.dump(), params([("alpha", 3.5)]));
    }

    #[test]
    fn cluster_sizes_cover_every_entity() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let fixed = FixedDirichlet::new(1.0, 4).unwrap();
        let sizes = fixed.draw_cluster_sizes(25, &mut rng);
        assert_eq!(sizes.len(), 4);
        assert_eq!(sizes.iter().sum::<usize>(), 25);

        let crp = ChineseRestaurant::new(1.0).unwrap();
        let sizes = crp.draw_cluster_sizes(25, &mut rng);
        assert!(sizes.iter().all(|&s| s > 0));
        assert_eq!(sizes.iter().sum::<usize>(), 25);
        assert!(crp.draw_cluster_sizes(0, &mut rng).is_empty());
    }

    #[test]
    fn tiny_concentration_still_places_every_entity() {
        let fixed = FixedDirichlet::new(1e-3, 2).unwrap();
        for seed in 0..200 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let sizes = fixed.draw_cluster_sizes(50, &mut rng);
            assert_eq!(sizes.len(), 2);
            assert_eq!(sizes.iter().sum::<usize>(), 50);
        }
    }

    #[test]
    fn urn_matches_dirichlet_categorical_marginal() {
        // Two entities, alpha / k = 0.5 each: P(both in one group) = 0.75.
        let mut rng = SmallRng::seed_from_u64(0xABCD);
        let fixed = FixedDirichlet::new(1.0, 2).unwrap();
        let n = 20_000;
        let together = (0..n)
            .filter(|_| fixed.draw_cluster_sizes(2, &mut rng).contains(&2))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let freq = together as f64 / f64::from(n);
        assert::close(freq, 0.75, 0.02);
    }
}
