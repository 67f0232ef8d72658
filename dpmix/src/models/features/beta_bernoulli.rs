use rand::RngCore;
use rv::data::{BernoulliSuffStat, DataOrSuffStat};
use rv::dist::{Bernoulli, Beta};
use rv::traits::{ConjugatePrior, Sampleable, SuffStat};

use super::invalid;
use crate::error::ModelError;
use crate::models::feature::{FeatureModel, Group, Shared, ValueSampler};
use crate::models::params::{Params, count, params, scalar};

/// Collapsed Beta-Bernoulli model of boolean observations.
#[derive(Clone, Copy, Debug, Default)]
pub struct BetaBernoulli;

impl FeatureModel for BetaBernoulli {
    type Value = bool;
    type Shared = Beta;
    type Group = BetaBernoulliGroup;
    type Sampler = BetaBernoulliSampler;
}

impl Shared for Beta {
    fn load(&mut self, raw: &Params) -> Result<(), ModelError> {
        let alpha = scalar(raw, "alpha")?;
        let beta = scalar(raw, "beta")?;
        *self = Self::new(alpha, beta).map_err(invalid)?;
        Ok(())
    }

    fn dump(&self) -> Params {
        params([("alpha", self.alpha()), ("beta", self.beta())])
    }
}

#[derive(Clone, Debug)]
pub struct BetaBernoulliGroup {
    stat: BernoulliSuffStat,
}

impl BetaBernoulliGroup {
    fn data(&self) -> DataOrSuffStat<'_, bool, Bernoulli> {
        DataOrSuffStat::SuffStat(&self.stat)
    }
}

impl Group<Beta, bool> for BetaBernoulliGroup {
    fn init(_shared: &Beta, _rng: &mut dyn RngCore) -> Self {
        Self {
            stat: BernoulliSuffStat::new(),
        }
    }

    fn add_value(&mut self, _shared: &Beta, x: &bool) {
        self.stat.observe(x);
    }

    fn remove_value(&mut self, _shared: &Beta, x: &bool) {
        self.stat.forget(x);
    }

    fn score_value(&self, shared: &Beta, x: &bool) -> f64 {
        shared.ln_pp(x, &self.data())
    }

    fn score_data(&self, shared: &Beta) -> f64 {
        shared.ln_m(&self.data())
    }

    #[allow(clippy::cast_precision_loss)]
    fn dump(&self) -> Params {
        let heads = self.stat.k();
        let tails = self.stat.n() - heads;
        params([("heads", heads as f64), ("tails", tails as f64)])
    }

    fn load(&mut self, raw: &Params) -> Result<(), ModelError> {
        let heads = count(raw, "heads")?;
        let tails = count(raw, "tails")?;
        self.stat = BernoulliSuffStat::from_parts_unchecked(heads + tails, heads);
        Ok(())
    }
}

/// Draws a success probability from the prior once per cluster.
#[derive(Clone, Debug)]
pub struct BetaBernoulliSampler {
    fx: Bernoulli,
}

impl ValueSampler<Beta, bool> for BetaBernoulliSampler {
    fn init(shared: &Beta, mut rng: &mut dyn RngCore) -> Self {
        Self {
            fx: shared.draw(&mut rng),
        }
    }

    fn eval(&self, _shared: &Beta, mut rng: &mut dyn RngCore) -> bool {
        self.fx.draw(&mut rng)
    }
}
