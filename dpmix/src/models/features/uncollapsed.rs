use rand::RngCore;
use rv::dist::{Bernoulli, Beta};
use rv::traits::{HasDensity, Sampleable};

use super::BetaBernoulliSampler;
use crate::error::ModelError;
use crate::models::feature::{FeatureModel, Group};
use crate::models::params::{Params, count, params, scalar};

/// Beta-Bernoulli model that keeps an explicit success probability per group
/// instead of integrating it out.
///
/// Each group draws its probability from the prior when created. Use the
/// non-conjugate assignment kernel to resample assignments, and resample the
/// per-group probability `p` with the slice theta kernel.
#[derive(Clone, Copy, Debug, Default)]
pub struct UncollapsedBetaBernoulli;

impl FeatureModel for UncollapsedBetaBernoulli {
    type Value = bool;
    type Shared = Beta;
    type Group = UncollapsedGroup;
    type Sampler = BetaBernoulliSampler;
}

#[derive(Clone, Debug)]
pub struct UncollapsedGroup {
    heads: usize,
    tails: usize,
    p: f64,
}

impl UncollapsedGroup {
    #[must_use]
    pub const fn p(&self) -> f64 {
        self.p
    }
}

impl Group<Beta, bool> for UncollapsedGroup {
    fn init(shared: &Beta, mut rng: &mut dyn RngCore) -> Self {
        let fx: Bernoulli = shared.draw(&mut rng);
        Self {
            heads: 0,
            tails: 0,
            p: fx.p(),
        }
    }

    fn add_value(&mut self, _shared: &Beta, x: &bool) {
        if *x {
            self.heads += 1;
        } else {
            self.tails += 1;
        }
    }

    fn remove_value(&mut self, _shared: &Beta, x: &bool) {
        if *x {
            self.heads -= 1;
        } else {
            self.tails -= 1;
        }
    }

    fn score_value(&self, _shared: &Beta, x: &bool) -> f64 {
        if *x { self.p.ln() } else { (-self.p).ln_1p() }
    }

    #[allow(clippy::cast_precision_loss)]
    fn score_data(&self, shared: &Beta) -> f64 {
        let likelihood = self.heads as f64 * self.p.ln() + self.tails as f64 * (-self.p).ln_1p();
        likelihood + shared.ln_f(&self.p)
    }

    #[allow(clippy::cast_precision_loss)]
    fn dump(&self) -> Params {
        params([
            ("heads", self.heads as f64),
            ("tails", self.tails as f64),
            ("p", self.p),
        ])
    }

    fn load(&mut self, raw: &Params) -> Result<(), ModelError> {
        let heads = count(raw, "heads")?;
        let tails = count(raw, "tails")?;
        let p = scalar(raw, "p")?;
        if !(p > 0.0 && p < 1.0) {
            return Err(ModelError::InvalidParams(format!(
                "success probability must lie in (0, 1), got {p}"
            )));
        }
        *self = Self { heads, tails, p };
        Ok(())
    }
}
