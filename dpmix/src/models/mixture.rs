//! Mixture models binding group bookkeeping to feature and cluster priors.
mod prior;

pub use prior::{ChineseRestaurant, ClusterPrior, FixedDirichlet, OpenPrior};

use rand::Rng;
use rv::misc::ln_pflip;

use crate::data::{EntityId, GroupId, GroupManager};
use crate::error::{Error, ModelError, Result};
use crate::models::feature::{Feature, FeatureGroup, Row, Value};
use crate::models::params::Params;
use crate::utils::NoPrettyPrint;

/// Mixture over a fixed number of groups with a symmetric Dirichlet prior.
pub type DirichletFixed = MixtureModel<FixedDirichlet>;
/// Dirichlet process mixture with a Chinese restaurant process prior.
pub type Dpmm = MixtureModel<ChineseRestaurant>;

type GroupData = Vec<Box<dyn FeatureGroup>>;

/// A partition of `n` entities into groups, where each group carries one
/// set of sufficient statistics per feature.
///
/// Observations are not stored: every operation that adds or removes an
/// entity takes the entity's [`Row`].
pub struct MixtureModel<P> {
    prior: P,
    features: Vec<Box<dyn Feature>>,
    groups: GroupManager<GroupData>,
}

impl<P: ClusterPrior> std::fmt::Debug for MixtureModel<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let assignments: Vec<_> = self
            .groups
            .assignments()
            .iter()
            .map(|a| a.map_or_else(|| String::from("-"), |gid| gid.to_string()))
            .map(NoPrettyPrint::new)
            .collect();
        let counts: Vec<_> = self
            .groups
            .groupiter()
            .map(|(gid, count, _)| (gid, count))
            .collect();

        f.debug_struct("MixtureModel")
            .field("prior", &self.prior)
            .field("features", &self.features)
            .field("assignments", &NoPrettyPrint::new(assignments))
            .field("counts", &NoPrettyPrint::new(counts))
            .finish_non_exhaustive()
    }
}

impl MixtureModel<FixedDirichlet> {
    /// A model of `n` entities over `k` groups, all created up front.
    pub fn new<R: Rng>(
        n: usize,
        k: usize,
        alpha: f64,
        features: Vec<Box<dyn Feature>>,
        rng: &mut R,
    ) -> Result<Self> {
        Self::with_prior(n, FixedDirichlet::new(alpha, k)?, features, rng)
    }
}

impl MixtureModel<ChineseRestaurant> {
    /// A model of `n` entities that starts without groups.
    pub fn new<R: Rng>(
        n: usize,
        alpha: f64,
        features: Vec<Box<dyn Feature>>,
        rng: &mut R,
    ) -> Result<Self> {
        Self::with_prior(n, ChineseRestaurant::new(alpha)?, features, rng)
    }
}

impl<P: ClusterPrior> MixtureModel<P> {
    pub fn with_prior<R: Rng>(
        n: usize,
        prior: P,
        features: Vec<Box<dyn Feature>>,
        rng: &mut R,
    ) -> Result<Self> {
        let mut model = Self {
            prior,
            features,
            groups: GroupManager::new(n),
        };
        model.create_initial_groups(rng);
        Ok(model)
    }

    fn create_initial_groups<R: Rng>(&mut self, rng: &mut R) {
        for _ in 0..self.prior.initial_groups() {
            self.new_group(rng);
        }
    }

    fn new_group<R: Rng>(&mut self, rng: &mut R) -> GroupId {
        let data: GroupData = self
            .features
            .iter()
            .map(|feature| feature.create_group(rng))
            .collect();
        self.groups.create_group(data)
    }

    /// Drop every assignment and statistic and rebuild the initial groups.
    /// Cluster and feature hyperparameters are kept.
    pub fn reset<R: Rng>(&mut self, rng: &mut R) {
        self.groups = GroupManager::new(self.groups.nentities());
        self.create_initial_groups(rng);
    }

    pub const fn prior(&self) -> &P {
        &self.prior
    }

    pub fn nfeatures(&self) -> usize {
        self.features.len()
    }

    pub fn nentities(&self) -> usize {
        self.groups.nentities()
    }

    pub const fn ngroups(&self) -> usize {
        self.groups.ngroups()
    }

    /// Ids of every live group, ascending.
    pub fn groups(&self) -> Vec<GroupId> {
        self.groups.group_ids()
    }

    pub fn empty_groups(&self) -> Vec<GroupId> {
        self.groups.empty_groups()
    }

    pub fn is_group_empty(&self, gid: GroupId) -> Result<bool> {
        Ok(self.groups.nentities_in_group(gid)? == 0)
    }

    pub fn nentities_in_group(&self, gid: GroupId) -> Result<usize> {
        Ok(self.groups.nentities_in_group(gid)?)
    }

    pub fn assignments(&self) -> &[Option<GroupId>] {
        self.groups.assignments()
    }

    pub fn all_entities_assigned(&self) -> bool {
        self.groups.all_entities_assigned()
    }

    pub const fn no_entities_assigned(&self) -> bool {
        self.groups.no_entities_assigned()
    }

    fn feature(&self, fi: usize) -> Result<&dyn Feature> {
        self.features
            .get(fi)
            .map(AsRef::as_ref)
            .ok_or_else(|| self.unknown_feature(fi))
    }

    fn unknown_feature(&self, fi: usize) -> Error {
        ModelError::UnknownFeature {
            fi,
            nfeatures: self.features.len(),
        }
        .into()
    }

    /// Validate a row before anything is mutated with it.
    fn check_row(&self, y: &[Value]) -> Result<()> {
        if y.len() != self.features.len() {
            return Err(Error::RowLength {
                expected: self.features.len(),
                found: y.len(),
            });
        }
        for (feature, value) in self.features.iter().zip(y) {
            feature.check(value)?;
        }
        Ok(())
    }

    pub fn add_entity_to_group(&mut self, gid: GroupId, eid: EntityId, y: &[Value]) -> Result<()> {
        self.check_row(y)?;
        let data = self.groups.add_entity_to_group(gid, eid)?;
        for (group, value) in data.iter_mut().zip(y) {
            group.add_value(value)?;
        }
        log::trace!("entity {eid} -> group {gid}");
        Ok(())
    }

    /// Unassign `eid`, returning the group it left.
    pub fn remove_entity_from_group(&mut self, eid: EntityId, y: &[Value]) -> Result<GroupId> {
        self.check_row(y)?;
        let (gid, data) = self.groups.remove_entity_from_group(eid)?;
        for (group, value) in data.iter_mut().zip(y) {
            group.remove_value(value)?;
        }
        log::trace!("entity {eid} <- group {gid}");
        Ok(gid)
    }

    /// Unnormalized log probabilities of `y` joining each live group.
    ///
    /// `scores[i]` belongs to the group `idmap[i]`; groups come in ascending
    /// id order. The prior terms are divided by `n - 1 + alpha` and the new
    /// group mass `alpha` is split evenly over the empty groups, so the scores
    /// differ from `ln(count)` and `ln(alpha)` by one constant per call.
    pub fn score_value(&self, y: &[Value]) -> Result<(Vec<GroupId>, Vec<f64>)> {
        self.check_row(y)?;
        let n = self.groups.nentities();
        let ngroups = self.groups.ngroups();
        let empties = self
            .groups
            .groupiter()
            .filter(|(_, count, _)| *count == 0)
            .count();

        let mut idmap = Vec::with_capacity(ngroups);
        let mut scores = Vec::with_capacity(ngroups);
        for (gid, count, data) in self.groups.groupiter() {
            let mut score = self.prior.ln_join(count, ngroups, n, empties);
            for (group, value) in data.iter().zip(y) {
                score += group.score_value(value)?;
            }
            idmap.push(gid);
            scores.push(score);
        }
        Ok((idmap, scores))
    }

    /// Draw a group for `y` from [`MixtureModel::score_value`].
    pub fn draw_group<R: Rng>(&self, y: &[Value], rng: &mut R) -> Result<GroupId> {
        let (idmap, scores) = self.score_value(y)?;
        if idmap.is_empty() {
            return Err(Error::EmptyGroups {
                expected: 1,
                found: 0,
            });
        }
        Ok(idmap[ln_pflip(&scores, false, rng)])
    }

    /// Log marginal likelihood of the assigned data along feature `fi`, or
    /// along every feature when `fi` is `None`.
    pub fn score_data(&self, fi: Option<usize>) -> Result<f64> {
        match fi {
            Some(fi) => {
                self.feature(fi)?;
                Ok(self
                    .groups
                    .groupiter()
                    .map(|(_, _, data)| data[fi].score_data())
                    .sum())
            }
            None => Ok(self.score_all_data()),
        }
    }

    fn score_all_data(&self) -> f64 {
        self.groups
            .groupiter()
            .flat_map(|(_, _, data)| data.iter().map(|group| group.score_data()))
            .sum()
    }

    /// Log prior probability of the current assignment.
    pub fn score_assignment(&self) -> f64 {
        let counts: Vec<usize> = self
            .groups
            .groupiter()
            .map(|(_, count, _)| count)
            .collect();
        self.prior.ln_partition(&counts, self.groups.nassigned())
    }

    /// Log joint probability of the assignment and the assigned data.
    pub fn score_joint(&self) -> f64 {
        self.score_assignment() + self.score_all_data()
    }

    pub fn alpha(&self) -> f64 {
        self.prior.alpha()
    }

    pub fn set_alpha(&mut self, alpha: f64) -> Result<()> {
        self.prior.set_alpha(alpha)
    }

    pub fn cluster_hp(&self) -> Params {
        self.prior.dump()
    }

    pub fn set_cluster_hp(&mut self, raw: &Params) -> Result<()> {
        self.prior.load(raw)
    }

    pub fn feature_hp(&self, fi: usize) -> Result<Params> {
        Ok(self.feature(fi)?.dump())
    }

    /// Replace the hyperparameters of feature `fi`. On error they are left
    /// unchanged.
    pub fn set_feature_hp(&mut self, fi: usize, raw: &Params) -> Result<()> {
        Ok(self.feature(fi)?.load(raw)?)
    }

    pub fn feature_dimension(&self, fi: usize) -> Result<usize> {
        Ok(self.feature(fi)?.dimension())
    }

    /// Sufficient statistics of feature `fi` for every live group.
    pub fn suff_stats(&self, fi: usize) -> Result<Vec<(GroupId, Params)>> {
        self.feature(fi)?;
        Ok(self
            .groups
            .groupiter()
            .map(|(gid, _, data)| (gid, data[fi].dump()))
            .collect())
    }

    pub fn group_suff_stats(&self, gid: GroupId, fi: usize) -> Result<Params> {
        self.feature(fi)?;
        Ok(self.groups.group_data(gid)?[fi].dump())
    }

    /// Replace the sufficient statistics of feature `fi` in group `gid`.
    pub fn set_group_suff_stats(&mut self, gid: GroupId, fi: usize, raw: &Params) -> Result<()> {
        self.feature(fi)?;
        Ok(self.groups.group_data_mut(gid)?[fi].load(raw)?)
    }

    /// Log marginal likelihood of the data of feature `fi` in group `gid`.
    pub fn score_group_data(&self, gid: GroupId, fi: usize) -> Result<f64> {
        self.feature(fi)?;
        Ok(self.groups.group_data(gid)?[fi].score_data())
    }

    /// Produce an initial assignment from a stream covering every entity
    /// exactly once.
    ///
    /// Under a growing prior the model must start without groups: the first
    /// entity opens a group, one empty group is kept available, and a new one
    /// is created whenever it is taken. Otherwise every entity is drawn into
    /// the existing groups.
    pub fn bootstrap<'a, I, R>(&mut self, it: I, rng: &mut R) -> Result<()>
    where
        I: IntoIterator<Item = (EntityId, &'a [Value])>,
        R: Rng,
    {
        if !self.groups.no_entities_assigned() {
            return Err(Error::AlreadyAssigned);
        }

        let mut it = it.into_iter();
        if self.prior.grows() {
            if self.groups.ngroups() != 0 {
                return Err(Error::GroupsPresent {
                    ngroups: self.groups.ngroups(),
                });
            }
            let (eid, y) = it.next().ok_or(Error::EmptyData)?;
            self.check_row(y)?;
            let first = self.new_group(rng);
            self.add_entity_to_group(first, eid, y)?;

            let mut empty = self.new_group(rng);
            for (eid, y) in it {
                let gid = self.draw_group(y, rng)?;
                self.add_entity_to_group(gid, eid, y)?;
                if gid == empty {
                    empty = self.new_group(rng);
                }
            }
        } else {
            for (eid, y) in it {
                let gid = self.draw_group(y, rng)?;
                self.add_entity_to_group(gid, eid, y)?;
            }
        }

        self.ensure_complete()?;
        log::debug!(
            "bootstrapped {} entities into {} groups",
            self.nentities(),
            self.ngroups()
        );
        Ok(())
    }

    /// Assign pre-clustered rows, numbering entities in concatenation order.
    ///
    /// Cluster `i` goes to the `i`-th group by ascending id. A bounded prior
    /// rejects more clusters than it has groups; a growing prior creates the
    /// groups it is missing.
    pub fn fill<R: Rng>(&mut self, clusters: &[Vec<Row>], rng: &mut R) -> Result<()> {
        if !self.groups.no_entities_assigned() {
            return Err(Error::AlreadyAssigned);
        }
        match self.prior.capacity() {
            Some(capacity) if clusters.len() > capacity => {
                return Err(Error::TooManyClusters {
                    given: clusters.len(),
                    capacity,
                });
            }
            Some(_) => {}
            None => {
                while self.groups.ngroups() < clusters.len() {
                    self.new_group(rng);
                }
            }
        }

        let gids = self.groups.group_ids();
        let rows = clusters
            .iter()
            .zip(gids)
            .flat_map(|(cluster, gid)| cluster.iter().map(move |row| (gid, row)));
        for (eid, (gid, row)) in rows.enumerate() {
            self.add_entity_to_group(gid, eid, row)?;
        }

        self.ensure_complete()
    }

    fn ensure_complete(&self) -> Result<()> {
        if self.groups.all_entities_assigned() {
            Ok(())
        } else {
            Err(Error::IncompleteAssignment {
                assigned: self.groups.nassigned(),
                n: self.groups.nentities(),
            })
        }
    }

    /// Draw `n` observations from the generative process of the current
    /// hyperparameters, grouped by the cluster that produced them.
    ///
    /// The current assignment is ignored and left untouched.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<Vec<Row>> {
        self.prior
            .draw_cluster_sizes(n, rng)
            .into_iter()
            .map(|size| {
                let samplers: Vec<_> = self
                    .features
                    .iter()
                    .map(|feature| feature.create_sampler(rng))
                    .collect();
                (0..size)
                    .map(|_| samplers.iter().map(|s| s.eval(rng)).collect::<Row>())
                    .collect::<Vec<Row>>()
            })
            .collect()
    }
}

impl<P: OpenPrior> MixtureModel<P> {
    /// Create an empty group.
    pub fn create_group<R: Rng>(&mut self, rng: &mut R) -> GroupId {
        self.new_group(rng)
    }

    /// Delete an empty group.
    pub fn delete_group(&mut self, gid: GroupId) -> Result<()> {
        self.groups.delete_group(gid)?;
        Ok(())
    }
}
