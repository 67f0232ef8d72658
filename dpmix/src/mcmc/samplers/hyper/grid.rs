use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use rv::misc::ln_pflip;

use crate::error::{ModelError, Result};
use crate::mcmc::Kernel;
use crate::models::Params;
use crate::models::mixture::{ClusterPrior, MixtureModel};

/// Candidate hyperparameters of one feature and their prior log density.
pub struct GridSpec {
    pub grid: Vec<Params>,
    pub ln_prior: Box<dyn Fn(&Params) -> f64 + Send + Sync>,
}

impl GridSpec {
    pub fn new<F>(grid: Vec<Params>, ln_prior: F) -> Self
    where
        F: Fn(&Params) -> f64 + Send + Sync + 'static,
    {
        Self {
            grid,
            ln_prior: Box::new(ln_prior),
        }
    }

    /// Every grid point equally likely a priori.
    #[must_use]
    pub fn uniform(grid: Vec<Params>) -> Self {
        Self::new(grid, |_| 0.0)
    }
}

impl fmt::Debug for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridSpec")
            .field("grid", &self.grid)
            .finish_non_exhaustive()
    }
}

/// Resample the hyperparameters of feature `fi` from its grid posterior.
///
/// Each grid point is loaded in turn and scored as prior plus the feature's
/// data score; the drawn point is loaded last. Returns its index.
pub fn gibbs_hp_feature<P, R>(
    m: &mut MixtureModel<P>,
    fi: usize,
    spec: &GridSpec,
    rng: &mut R,
) -> Result<usize>
where
    P: ClusterPrior,
    R: Rng,
{
    if spec.grid.is_empty() {
        return Err(ModelError::InvalidParams(format!("empty hyperparameter grid for feature {fi}")).into());
    }

    let scores = spec
        .grid
        .iter()
        .map(|hp| {
            m.set_feature_hp(fi, hp)?;
            Ok((spec.ln_prior)(hp) + m.score_data(Some(fi))?)
        })
        .collect::<Result<Vec<f64>>>()?;

    let choice = ln_pflip(&scores, false, rng);
    m.set_feature_hp(fi, &spec.grid[choice])?;
    log::trace!("feature {fi}: grid point {choice} of {}", spec.grid.len());
    Ok(choice)
}

/// Grid Gibbs over every feature in `specs`, in ascending feature order.
pub fn gibbs_hp<P, R>(m: &mut MixtureModel<P>, specs: &BTreeMap<usize, GridSpec>, rng: &mut R) -> Result<()>
where
    P: ClusterPrior,
    R: Rng,
{
    for (&fi, spec) in specs {
        gibbs_hp_feature(m, fi, spec, rng)?;
    }
    Ok(())
}

/// Kernel form of [`gibbs_hp`]. Ignores the data: the groups already hold
/// the statistics it needs.
#[derive(Debug, Default)]
pub struct GridGibbs {
    pub specs: BTreeMap<usize, GridSpec>,
}

impl GridGibbs {
    #[must_use]
    pub const fn new(specs: BTreeMap<usize, GridSpec>) -> Self {
        Self { specs }
    }
}

impl<P: ClusterPrior, D: ?Sized> Kernel<MixtureModel<P>, D> for GridGibbs {
    fn step<R: Rng>(&mut self, model: &mut MixtureModel<P>, _data: &D, rng: &mut R) -> Result<()> {
        gibbs_hp(model, &self.specs, rng)
    }
}
