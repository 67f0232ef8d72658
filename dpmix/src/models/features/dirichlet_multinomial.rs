use rand::distr::OpenClosed01;
use rand::{Rng, RngCore};
use rv::dist::Gamma;
use rv::misc::ln_pflip;
use rv::traits::Sampleable;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::models::feature::{FeatureModel, Group, Shared, ValueSampler};
use crate::models::params::{Params, as_count, params, vector};
use crate::utils::ln_gamma;

/// Collapsed Dirichlet-categorical model of category observations.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirichletMultinomial;

impl FeatureModel for DirichletMultinomial {
    type Value = usize;
    type Shared = DirichletShared;
    type Group = DirichletMultinomialGroup;
    type Sampler = DirichletMultinomialSampler;

    fn check(shared: &DirichletShared, x: &usize) -> Result<(), ModelError> {
        if *x < shared.alphas.len() {
            Ok(())
        } else {
            Err(ModelError::Support(format!(
                "category {x} of {}",
                shared.alphas.len()
            )))
        }
    }
}

/// Dirichlet pseudo-counts, one per category.
///
/// The number of categories is fixed once constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirichletShared {
    alphas: Vec<f64>,
}

impl DirichletShared {
    pub fn new(alphas: Vec<f64>) -> Result<Self, ModelError> {
        if alphas.is_empty() {
            return Err(ModelError::InvalidParams(
                "dirichlet needs at least one category".into(),
            ));
        }
        if let Some(bad) = alphas.iter().find(|a| !(a.is_finite() && **a > 0.0)) {
            return Err(ModelError::InvalidParams(format!(
                "dirichlet pseudo-counts must be positive and finite, got {bad}"
            )));
        }
        Ok(Self { alphas })
    }

    pub fn symmetric(alpha: f64, k: usize) -> Result<Self, ModelError> {
        Self::new(vec![alpha; k])
    }

    #[must_use]
    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    fn total(&self) -> f64 {
        self.alphas.iter().sum()
    }
}

impl Shared for DirichletShared {
    fn load(&mut self, raw: &Params) -> Result<(), ModelError> {
        let alphas = vector(raw, "alphas")?;
        if alphas.len() != self.alphas.len() {
            return Err(ModelError::InvalidParams(format!(
                "expected {} pseudo-counts, got {}",
                self.alphas.len(),
                alphas.len()
            )));
        }
        *self = Self::new(alphas.to_vec())?;
        Ok(())
    }

    fn dump(&self) -> Params {
        params([("alphas", self.alphas.clone())])
    }

    fn dimension(&self) -> usize {
        self.alphas.len()
    }
}

#[derive(Clone, Debug)]
pub struct DirichletMultinomialGroup {
    counts: Vec<usize>,
    n: usize,
}

impl Group<DirichletShared, usize> for DirichletMultinomialGroup {
    fn init(shared: &DirichletShared, _rng: &mut dyn RngCore) -> Self {
        Self {
            counts: vec![0; shared.alphas.len()],
            n: 0,
        }
    }

    fn add_value(&mut self, _shared: &DirichletShared, x: &usize) {
        self.counts[*x] += 1;
        self.n += 1;
    }

    fn remove_value(&mut self, _shared: &DirichletShared, x: &usize) {
        self.counts[*x] -= 1;
        self.n -= 1;
    }

    #[allow(clippy::cast_precision_loss)]
    fn score_value(&self, shared: &DirichletShared, x: &usize) -> f64 {
        let numer = self.counts[*x] as f64 + shared.alphas[*x];
        let denom = self.n as f64 + shared.total();
        (numer / denom).ln()
    }

    #[allow(clippy::cast_precision_loss)]
    fn score_data(&self, shared: &DirichletShared) -> f64 {
        let total = shared.total();
        let per_category: f64 = self
            .counts
            .iter()
            .zip(&shared.alphas)
            .map(|(&c, &a)| ln_gamma(c as f64 + a) - ln_gamma(a))
            .sum();
        ln_gamma(total) - ln_gamma(self.n as f64 + total) + per_category
    }

    #[allow(clippy::cast_precision_loss)]
    fn dump(&self) -> Params {
        let counts: Vec<f64> = self.counts.iter().map(|&c| c as f64).collect();
        params([("counts", counts)])
    }

    fn load(&mut self, raw: &Params) -> Result<(), ModelError> {
        let raw_counts = vector(raw, "counts")?;
        if raw_counts.len() != self.counts.len() {
            return Err(ModelError::InvalidParams(format!(
                "expected {} counts, got {}",
                self.counts.len(),
                raw_counts.len()
            )));
        }
        let counts = raw_counts
            .iter()
            .map(|&c| as_count("counts", c))
            .collect::<Result<Vec<usize>, _>>()?;
        self.n = counts.iter().sum();
        self.counts = counts;
        Ok(())
    }
}

/// Draws category weights from the prior once per cluster.
#[derive(Clone, Debug)]
pub struct DirichletMultinomialSampler {
    ln_weights: Vec<f64>,
}

impl ValueSampler<DirichletShared, usize> for DirichletMultinomialSampler {
    /// The gamma variates behind the Dirichlet draw are taken in log space,
    /// `ln G(a + 1) + ln(U) / a`, so small `a` cannot underflow to zero.
    fn init(shared: &DirichletShared, mut rng: &mut dyn RngCore) -> Self {
        let ln_weights = shared
            .alphas
            .iter()
            .map(|&a| {
                let g: f64 = Gamma::new_unchecked(a + 1.0, 1.0).draw(&mut rng);
                let u: f64 = rng.sample(OpenClosed01);
                g.ln() + u.ln() / a
            })
            .collect();
        Self { ln_weights }
    }

    fn eval(&self, _shared: &DirichletShared, mut rng: &mut dyn RngCore) -> usize {
        ln_pflip(&self.ln_weights, false, &mut rng)
    }
}
