use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::Lens;
use crate::data::GroupId;
use crate::error::{Error, Result};
use crate::mcmc::Kernel;
use crate::mcmc::samplers::continuous::slice::{SliceOptions, slice_sample};
use crate::models::mixture::{ClusterPrior, MixtureModel};
use crate::models::{Locator, ParamLens, Params};

/// One slice-sampled scalar of a feature's hyperparameters: the whole value
/// under a key, or one component of a vector.
pub struct SliceParam {
    pub locator: Locator,
    pub ln_prior: Box<dyn Fn(f64) -> f64 + Send + Sync>,
    /// Initial bracket width.
    pub width: f64,
}

impl SliceParam {
    pub fn new<F>(locator: Locator, ln_prior: F, width: f64) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            locator,
            ln_prior: Box::new(ln_prior),
            width,
        }
    }

    pub fn scalar<F>(ln_prior: F, width: f64) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::new(Locator::Scalar, ln_prior, width)
    }

    pub fn index<F>(index: usize, ln_prior: F, width: f64) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::new(Locator::Index(index), ln_prior, width)
    }
}

impl fmt::Debug for SliceParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceParam")
            .field("locator", &self.locator)
            .field("width", &self.width)
            .finish_non_exhaustive()
    }
}

/// Slice-sampled hyperparameters of one feature, by key.
pub type SliceHpSpec = BTreeMap<String, Vec<SliceParam>>;

/// Slice widths of the per-group statistics of one feature, by key.
pub type ThetaSpec = BTreeMap<String, f64>;

/// Log posterior of feature `fi` with the scalar under `lens` set to `x`.
///
/// Leaves the candidate loaded. Candidates outside the prior's support, or
/// refused by the feature, score `-inf`.
fn ln_hp_posterior<P: ClusterPrior>(
    m: &mut MixtureModel<P>,
    fi: usize,
    hp: &mut Params,
    lens: &ParamLens,
    ln_prior: &dyn Fn(f64) -> f64,
    x: f64,
) -> f64 {
    let prior = ln_prior(x);
    if prior == f64::NEG_INFINITY {
        return prior;
    }

    let score = lens
        .set(hp, x)
        .map_err(Error::from)
        .and_then(|()| m.set_feature_hp(fi, hp))
        .and_then(|()| m.score_data(Some(fi)));
    score.map_or(f64::NEG_INFINITY, |score| prior + score)
}

/// Log score of group `gid` under feature `fi` with its statistic under
/// `lens` set to `x`. Leaves the candidate loaded.
fn ln_theta_posterior<P: ClusterPrior>(
    m: &mut MixtureModel<P>,
    gid: GroupId,
    fi: usize,
    theta: &mut Params,
    lens: &ParamLens,
    x: f64,
) -> f64 {
    lens.set(theta, x)
        .map_err(Error::from)
        .and_then(|()| m.set_group_suff_stats(gid, fi, theta))
        .and_then(|()| m.score_group_data(gid, fi))
        .unwrap_or(f64::NEG_INFINITY)
}

/// Slice-sample every hyperparameter of feature `fi` named in `spec`, one
/// scalar at a time, visiting keys in a random order.
pub fn slice_hp_feature<P, R>(
    m: &mut MixtureModel<P>,
    fi: usize,
    spec: &SliceHpSpec,
    options: &SliceOptions,
    rng: &mut R,
) -> Result<()>
where
    P: ClusterPrior,
    R: Rng,
{
    let mut hp = m.feature_hp(fi)?;
    let mut keys: Vec<(&String, &Vec<SliceParam>)> = spec.iter().collect();
    keys.shuffle(rng);

    for (key, components) in keys {
        for param in components {
            let lens = ParamLens {
                key: key.clone(),
                locator: param.locator,
            };
            let x0 = *lens.get(&hp)?;
            let draw = slice_sample(
                |x| ln_hp_posterior(m, fi, &mut hp, &lens, &*param.ln_prior, x),
                x0,
                param.width,
                options,
                rng,
            );

            lens.set(&mut hp, draw.x)?;
            if let Err(err) = m.set_feature_hp(fi, &hp) {
                log::warn!("feature {fi}: `{key}` = {} rejected ({err}), keeping {x0}", draw.x);
                lens.set(&mut hp, x0)?;
                m.set_feature_hp(fi, &hp)?;
            }
        }
    }
    Ok(())
}

/// [`slice_hp_feature`] for every feature in `specs`, in ascending order.
pub fn slice_hp<P, R>(
    m: &mut MixtureModel<P>,
    specs: &BTreeMap<usize, SliceHpSpec>,
    options: &SliceOptions,
    rng: &mut R,
) -> Result<()>
where
    P: ClusterPrior,
    R: Rng,
{
    for (&fi, spec) in specs {
        slice_hp_feature(m, fi, spec, options, rng)?;
    }
    Ok(())
}

/// Slice-sample the per-group statistics of feature `fi` named in `spec`,
/// for every live group, visiting keys in a fresh random order per group.
///
/// Each group is scored alone under the feature's current hyperparameters.
pub fn slice_theta_feature<P, R>(
    m: &mut MixtureModel<P>,
    fi: usize,
    spec: &ThetaSpec,
    options: &SliceOptions,
    rng: &mut R,
) -> Result<()>
where
    P: ClusterPrior,
    R: Rng,
{
    for gid in m.groups() {
        let mut keys: Vec<(&String, &f64)> = spec.iter().collect();
        keys.shuffle(rng);

        for (key, &width) in keys {
            let mut theta = m.group_suff_stats(gid, fi)?;
            let lens = ParamLens::scalar(key.as_str());
            let x0 = *lens.get(&theta)?;
            let draw = slice_sample(
                |x| ln_theta_posterior(m, gid, fi, &mut theta, &lens, x),
                x0,
                width,
                options,
                rng,
            );

            lens.set(&mut theta, draw.x)?;
            if let Err(err) = m.set_group_suff_stats(gid, fi, &theta) {
                log::warn!("feature {fi}, group {gid}: `{key}` = {} rejected ({err}), keeping {x0}", draw.x);
                lens.set(&mut theta, x0)?;
                m.set_group_suff_stats(gid, fi, &theta)?;
            }
        }
    }
    Ok(())
}

/// [`slice_theta_feature`] for every feature in `specs`, in ascending order.
pub fn slice_theta<P, R>(
    m: &mut MixtureModel<P>,
    specs: &BTreeMap<usize, ThetaSpec>,
    options: &SliceOptions,
    rng: &mut R,
) -> Result<()>
where
    P: ClusterPrior,
    R: Rng,
{
    for (&fi, spec) in specs {
        slice_theta_feature(m, fi, spec, options, rng)?;
    }
    Ok(())
}

/// Kernel form of [`slice_hp`].
#[derive(Debug, Default)]
pub struct SliceHp {
    pub specs: BTreeMap<usize, SliceHpSpec>,
    pub options: SliceOptions,
}

impl SliceHp {
    #[must_use]
    pub fn new(specs: BTreeMap<usize, SliceHpSpec>) -> Self {
        Self {
            specs,
            options: SliceOptions::default(),
        }
    }
}

impl<P: ClusterPrior, D: ?Sized> Kernel<MixtureModel<P>, D> for SliceHp {
    fn step<R: Rng>(&mut self, model: &mut MixtureModel<P>, _data: &D, rng: &mut R) -> Result<()> {
        slice_hp(model, &self.specs, &self.options, rng)
    }
}

/// Kernel form of [`slice_theta`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SliceTheta {
    pub specs: BTreeMap<usize, ThetaSpec>,
    pub options: SliceOptions,
}

impl SliceTheta {
    #[must_use]
    pub fn new(specs: BTreeMap<usize, ThetaSpec>) -> Self {
        Self {
            specs,
            options: SliceOptions::default(),
        }
    }
}

impl<P: ClusterPrior, D: ?Sized> Kernel<MixtureModel<P>, D> for SliceTheta {
    fn step<R: Rng>(&mut self, model: &mut MixtureModel<P>, _data: &D, rng: &mut R) -> Result<()> {
        slice_theta(model, &self.specs, &self.options, rng)
    }
}
