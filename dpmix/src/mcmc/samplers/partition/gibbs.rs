//! Gibbs sweeps over entity-to-group assignments.
//!
//! The three kernels share one step: remove the entity, score it against
//! every live group, draw a group, add it back. They differ only in how empty
//! groups are managed, and are kept as separate functions so each one's
//! invariant stays easy to read.
use std::num::NonZeroUsize;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::{Dataset, EntityId, GroupId};
use crate::error::{Error, Result};
use crate::mcmc::Kernel;
use crate::models::feature::Value;
use crate::models::mixture::{ClusterPrior, MixtureModel, OpenPrior};

/// One sweep that never creates or deletes groups.
pub fn gibbs_assign_fixed<'a, P, I, R>(m: &mut MixtureModel<P>, it: I, rng: &mut R) -> Result<()>
where
    P: ClusterPrior,
    I: IntoIterator<Item = (EntityId, &'a [Value])>,
    R: Rng,
{
    for (eid, y) in it {
        m.remove_entity_from_group(eid, y)?;
        let gid = m.draw_group(y, rng)?;
        m.add_entity_to_group(gid, eid, y)?;
    }
    log::debug!("fixed gibbs sweep over {} groups", m.ngroups());
    Ok(())
}

/// Collapse the empty groups of `m` to exactly one and return it.
fn single_empty_group<P: OpenPrior, R: Rng>(m: &mut MixtureModel<P>, rng: &mut R) -> Result<GroupId> {
    let empty = match m.empty_groups().split_first() {
        None => m.create_group(rng),
        Some((&first, surplus)) => {
            for &gid in surplus {
                m.delete_group(gid)?;
            }
            first
        }
    };

    let found = m.empty_groups().len();
    if found == 1 {
        Ok(empty)
    } else {
        Err(Error::EmptyGroups { expected: 1, found })
    }
}

/// One sweep of the Dirichlet process kernel.
///
/// Exactly one group is empty on entry to every step and on return. A model
/// that enters with no empty group, or several, is brought to one first.
pub fn gibbs_assign<'a, P, I, R>(m: &mut MixtureModel<P>, it: I, rng: &mut R) -> Result<()>
where
    P: OpenPrior,
    I: IntoIterator<Item = (EntityId, &'a [Value])>,
    R: Rng,
{
    let mut empty = single_empty_group(m, rng)?;
    for (eid, y) in it {
        let from = m.remove_entity_from_group(eid, y)?;
        if m.is_group_empty(from)? {
            // The tracked empty group already exists.
            m.delete_group(from)?;
        }

        let gid = m.draw_group(y, rng)?;
        m.add_entity_to_group(gid, eid, y)?;
        if gid == empty {
            empty = m.create_group(rng);
        }
    }
    log::debug!("dp gibbs sweep: {} groups", m.ngroups());
    Ok(())
}

/// One sweep of the finite approximation for non-conjugate features.
///
/// No group is empty between steps. Each step scores the entity against the
/// live groups plus `nonempty` freshly drawn auxiliary groups, then deletes
/// the auxiliary groups that were not chosen. Empty groups present on entry
/// are deleted.
pub fn gibbs_assign_nonconj<'a, P, I, R>(
    m: &mut MixtureModel<P>,
    it: I,
    nonempty: NonZeroUsize,
    rng: &mut R,
) -> Result<()>
where
    P: OpenPrior,
    I: IntoIterator<Item = (EntityId, &'a [Value])>,
    R: Rng,
{
    for gid in m.empty_groups() {
        m.delete_group(gid)?;
    }

    for (eid, y) in it {
        let found = m.empty_groups().len();
        if found != 0 {
            return Err(Error::EmptyGroups { expected: 0, found });
        }

        let from = m.remove_entity_from_group(eid, y)?;
        if m.is_group_empty(from)? {
            m.delete_group(from)?;
        }

        let auxiliary: Vec<GroupId> = (0..nonempty.get()).map(|_| m.create_group(rng)).collect();
        let gid = m.draw_group(y, rng)?;
        m.add_entity_to_group(gid, eid, y)?;

        for aux in auxiliary {
            if aux != gid {
                m.delete_group(aux)?;
            }
        }
    }
    log::debug!("non-conjugate gibbs sweep: {} groups", m.ngroups());
    Ok(())
}

/// Gibbs sampling of assignments over a fixed set of groups.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedGibbs {
    /// Visit entities in a random order each sweep.
    pub shuffle: bool,
}

impl FixedGibbs {
    #[must_use]
    pub const fn new(shuffle: bool) -> Self {
        Self { shuffle }
    }
}

impl<P: ClusterPrior> Kernel<MixtureModel<P>, Dataset> for FixedGibbs {
    fn step<R: Rng>(&mut self, model: &mut MixtureModel<P>, data: &Dataset, rng: &mut R) -> Result<()> {
        let entities = data.data(self.shuffle, rng);
        gibbs_assign_fixed(model, entities, rng)
    }
}

/// Gibbs sampling of assignments under a Dirichlet process prior.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpGibbs {
    /// Visit entities in a random order each sweep.
    pub shuffle: bool,
}

impl DpGibbs {
    #[must_use]
    pub const fn new(shuffle: bool) -> Self {
        Self { shuffle }
    }
}

impl<P: OpenPrior> Kernel<MixtureModel<P>, Dataset> for DpGibbs {
    fn step<R: Rng>(&mut self, model: &mut MixtureModel<P>, data: &Dataset, rng: &mut R) -> Result<()> {
        let entities = data.data(self.shuffle, rng);
        gibbs_assign(model, entities, rng)
    }
}

/// Gibbs sampling of assignments with auxiliary groups, for features whose
/// parameters are not integrated out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonConjugateGibbs {
    /// Auxiliary empty groups offered to each entity.
    pub nonempty: NonZeroUsize,
    /// Visit entities in a random order each sweep.
    pub shuffle: bool,
}

impl NonConjugateGibbs {
    #[must_use]
    pub const fn new(nonempty: NonZeroUsize, shuffle: bool) -> Self {
        Self { nonempty, shuffle }
    }
}

impl<P: OpenPrior> Kernel<MixtureModel<P>, Dataset> for NonConjugateGibbs {
    fn step<R: Rng>(&mut self, model: &mut MixtureModel<P>, data: &Dataset, rng: &mut R) -> Result<()> {
        let entities = data.data(self.shuffle, rng);
        gibbs_assign_nonconj(model, entities, self.nonempty, rng)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use rv::dist::Beta;
    use rv::misc::LogSumExp;

    use super::*;
    use crate::error::GroupError;
    use crate::models::feature::{Feature, Row, feature};
    use crate::models::features::{BetaBernoulli, UncollapsedBetaBernoulli};
    use crate::models::mixture::{DirichletFixed, Dpmm};
    use crate::utils::{canonical, cluster, kl_divergence, labelings, set_partitions};

    const N: usize = 4;
    const D: usize = 5;
    const BURN_IN: usize = 2_000;
    const SAMPLES: usize = 10_000;
    const THIN: usize = 5;
    const SMOOTHING: f64 = 1e-5;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn bb_features(d: usize) -> Vec<Box<dyn Feature>> {
        (0..d)
            .map(|_| feature::<BetaBernoulli>(Beta::uniform()))
            .collect()
    }

    fn normalized(ln_scores: &[f64]) -> Vec<f64> {
        let norm = ln_scores.iter().copied().logsumexp();
        ln_scores.iter().map(|s| (s - norm).exp()).collect()
    }

    fn labels_of<P: ClusterPrior>(m: &MixtureModel<P>) -> Vec<usize> {
        m.assignments()
            .iter()
            .map(|a| a.expect("every entity is assigned between sweeps"))
            .collect()
    }

    /// Exact posterior over `states` by filling a scratch model with each.
    fn exact_posterior<P: ClusterPrior>(
        scratch: &mut MixtureModel<P>,
        rows: &[Row],
        states: &[Vec<usize>],
        rng: &mut SmallRng,
    ) -> Vec<f64> {
        let ln_scores: Vec<f64> = states
            .iter()
            .map(|labels| {
                let k = labels.iter().max().map_or(0, |l| l + 1);
                scratch.reset(rng);
                scratch.fill(&cluster(rows, labels, k), rng).unwrap();
                scratch.score_joint()
            })
            .collect();
        normalized(&ln_scores)
    }

    /// Histogram of the states visited by `kernel`, keyed through `key`.
    fn empirical<P, K>(
        m: &mut MixtureModel<P>,
        kernel: &mut K,
        data: &Dataset,
        states: &[Vec<usize>],
        key: fn(&[usize]) -> Vec<usize>,
        rng: &mut SmallRng,
    ) -> Vec<f64>
    where
        P: ClusterPrior,
        K: Kernel<MixtureModel<P>, Dataset>,
    {
        let index: HashMap<&[usize], usize> = states
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_slice(), i))
            .collect();

        kernel.multi_step(m, data, BURN_IN, rng).unwrap();
        let mut counts = vec![SMOOTHING; states.len()];
        for _ in 0..SAMPLES {
            kernel.multi_step(m, data, THIN, rng).unwrap();
            counts[index[key(&labels_of(m)).as_slice()]] += 1.0;
        }
        let total: f64 = counts.iter().sum();
        counts.into_iter().map(|c| c / total).collect()
    }

    fn dp_posterior_kl<K>(mut kernel: K, seed: u64) -> f64
    where
        K: Kernel<Dpmm, Dataset>,
    {
        init_logger();
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut m = Dpmm::new(N, 2.0, bb_features(D), &mut rng).unwrap();
        let clusters = m.sample(N, &mut rng);
        let data = Dataset::from_clusters(&clusters);

        let states: Vec<Vec<usize>> = set_partitions(N).collect();
        let mut scratch = Dpmm::new(N, 2.0, bb_features(D), &mut rng).unwrap();
        let exact = exact_posterior(&mut scratch, data.rows(), &states, &mut rng);

        m.bootstrap(data.iter(), &mut rng).unwrap();
        let estimate = empirical(&mut m, &mut kernel, &data, &states, canonical, &mut rng);

        kl_divergence(&exact, &estimate)
    }

    #[test]
    fn dp_kernel_matches_brute_force_posterior() {
        let kl = dp_posterior_kl(DpGibbs::new(false), 0x1234);
        assert!(kl <= 0.1, "kl = {kl}");
    }

    #[test]
    fn nonconj_kernel_matches_brute_force_posterior() {
        let nonempty = NonZeroUsize::new(3).unwrap();
        let kl = dp_posterior_kl(NonConjugateGibbs::new(nonempty, true), 0xabcd);
        assert!(kl <= 0.1, "kl = {kl}");
    }

    #[test]
    fn fixed_kernel_matches_brute_force_posterior() {
        init_logger();
        let k = 2;
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let mut m = DirichletFixed::new(N, k, 1.5, bb_features(D), &mut rng).unwrap();
        let data = Dataset::from_clusters(&m.sample(N, &mut rng));

        let states: Vec<Vec<usize>> = labelings(N, k).collect();
        let mut scratch = DirichletFixed::new(N, k, 1.5, bb_features(D), &mut rng).unwrap();
        let exact = exact_posterior(&mut scratch, data.rows(), &states, &mut rng);

        m.bootstrap(data.iter(), &mut rng).unwrap();
        let estimate = empirical(
            &mut m,
            &mut FixedGibbs::new(true),
            &data,
            &states,
            <[usize]>::to_vec,
            &mut rng,
        );

        let kl = kl_divergence(&exact, &estimate);
        assert!(kl <= 0.1, "kl = {kl}");
    }

    #[test]
    fn fixed_kernel_keeps_groups() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let mut m = DirichletFixed::new(12, 4, 1.0, bb_features(2), &mut rng).unwrap();
        let data = Dataset::from_clusters(&m.sample(12, &mut rng));
        m.bootstrap(data.iter(), &mut rng).unwrap();

        FixedGibbs::new(true).multi_step(&mut m, &data, 20, &mut rng).unwrap();
        assert_eq!(m.groups(), vec![0, 1, 2, 3]);
        assert!(m.all_entities_assigned());
    }

    #[test]
    fn fixed_kernel_requires_assigned_entities() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let mut m = DirichletFixed::new(2, 2, 1.0, bb_features(1), &mut rng).unwrap();
        let data = Dataset::new(vec![vec![Value::Bool(true)], vec![Value::Bool(false)]]);

        assert_eq!(
            gibbs_assign_fixed(&mut m, data.iter(), &mut rng),
            Err(Error::Group(GroupError::NotAssigned { eid: 0 }))
        );
    }

    #[test]
    fn dp_kernel_repairs_filled_models() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let mut m = Dpmm::new(6, 1.0, bb_features(2), &mut rng).unwrap();
        let clusters = m.sample(6, &mut rng);
        let data = Dataset::from_clusters(&clusters);

        m.fill(&clusters, &mut rng).unwrap();
        assert!(m.empty_groups().is_empty());
        gibbs_assign(&mut m, data.iter(), &mut rng).unwrap();
        assert_eq!(m.empty_groups().len(), 1);

        m.create_group(&mut rng);
        m.create_group(&mut rng);
        assert_eq!(m.empty_groups().len(), 3);
        gibbs_assign(&mut m, data.iter(), &mut rng).unwrap();
        assert_eq!(m.empty_groups().len(), 1);
    }

    #[test]
    fn nonconj_kernel_with_uncollapsed_features() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let features = (0..3)
            .map(|_| feature::<UncollapsedBetaBernoulli>(Beta::new(2.0, 2.0).unwrap()))
            .collect();
        let mut m = Dpmm::new(20, 1.0, features, &mut rng).unwrap();
        let data = Dataset::from_clusters(&m.sample(20, &mut rng));
        m.bootstrap(data.iter(), &mut rng).unwrap();

        let mut kernel = NonConjugateGibbs::new(NonZeroUsize::new(2).unwrap(), true);
        for ngroups in kernel
            .iter_sample(&mut m, &data, &mut rng, |m| m.empty_groups().len())
            .take(10)
        {
            assert_eq!(ngroups, Ok(0));
        }
        assert!(m.all_entities_assigned());
    }

    fn conserved<P: ClusterPrior>(m: &MixtureModel<P>) -> bool {
        let in_groups: usize = m
            .groups()
            .iter()
            .map(|&gid| m.nentities_in_group(gid).unwrap())
            .sum();
        in_groups == m.nentities() && m.all_entities_assigned()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn sweeps_preserve_invariants(seed in any::<u64>(), n in 1..16_usize, alpha in 0.1..5.0_f64) {
            let mut rng = SmallRng::seed_from_u64(seed);

            let mut dp = Dpmm::new(n, alpha, bb_features(2), &mut rng).unwrap();
            let data = Dataset::from_clusters(&dp.sample(n, &mut rng));
            dp.bootstrap(data.iter(), &mut rng).unwrap();
            for _ in 0..3 {
                DpGibbs::new(true).step(&mut dp, &data, &mut rng).unwrap();
                prop_assert_eq!(dp.empty_groups().len(), 1);
                prop_assert!(conserved(&dp));
            }

            let nonempty = NonZeroUsize::new(1 + (seed % 4) as usize).unwrap();
            for _ in 0..3 {
                NonConjugateGibbs::new(nonempty, true).step(&mut dp, &data, &mut rng).unwrap();
                prop_assert!(dp.empty_groups().is_empty());
                prop_assert!(conserved(&dp));
            }

            let mut fixed = DirichletFixed::new(n, 3, alpha, bb_features(2), &mut rng).unwrap();
            fixed.bootstrap(data.iter(), &mut rng).unwrap();
            for _ in 0..3 {
                FixedGibbs::new(false).step(&mut fixed, &data, &mut rng).unwrap();
                prop_assert_eq!(fixed.groups(), vec![0, 1, 2]);
                prop_assert!(conserved(&fixed));
            }
        }
    }
}
