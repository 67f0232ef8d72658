use rand::RngCore;
use rv::data::{DataOrSuffStat, GaussianSuffStat};
use rv::dist::{Gaussian, NormalGamma};
use rv::traits::{ConjugatePrior, Sampleable, SuffStat};

use super::invalid;
use crate::error::ModelError;
use crate::models::feature::{FeatureModel, Group, Shared, ValueSampler};
use crate::models::params::{Params, count, params, scalar};

/// Collapsed Normal-Gamma model of real-valued observations.
#[derive(Clone, Copy, Debug, Default)]
pub struct NormalGammaGaussian;

impl FeatureModel for NormalGammaGaussian {
    type Value = f64;
    type Shared = NormalGamma;
    type Group = NormalGammaGroup;
    type Sampler = NormalGammaSampler;
}

impl Shared for NormalGamma {
    fn load(&mut self, raw: &Params) -> Result<(), ModelError> {
        let m = scalar(raw, "m")?;
        let r = scalar(raw, "r")?;
        let s = scalar(raw, "s")?;
        let v = scalar(raw, "v")?;
        *self = Self::new(m, r, s, v).map_err(invalid)?;
        Ok(())
    }

    fn dump(&self) -> Params {
        params([
            ("m", self.m()),
            ("r", self.r()),
            ("s", self.s()),
            ("v", self.v()),
        ])
    }
}

#[derive(Clone, Debug)]
pub struct NormalGammaGroup {
    stat: GaussianSuffStat,
}

impl NormalGammaGroup {
    fn data(&self) -> DataOrSuffStat<'_, f64, Gaussian> {
        DataOrSuffStat::SuffStat(&self.stat)
    }
}

impl Group<NormalGamma, f64> for NormalGammaGroup {
    fn init(_shared: &NormalGamma, _rng: &mut dyn RngCore) -> Self {
        Self {
            stat: GaussianSuffStat::new(),
        }
    }

    fn add_value(&mut self, _shared: &NormalGamma, x: &f64) {
        self.stat.observe(x);
    }

    fn remove_value(&mut self, _shared: &NormalGamma, x: &f64) {
        self.stat.forget(x);
    }

    fn score_value(&self, shared: &NormalGamma, x: &f64) -> f64 {
        shared.ln_pp(x, &self.data())
    }

    fn score_data(&self, shared: &NormalGamma) -> f64 {
        shared.ln_m(&self.data())
    }

    #[allow(clippy::cast_precision_loss)]
    fn dump(&self) -> Params {
        params([
            ("n", self.stat.n() as f64),
            ("mean", self.stat.mean()),
            ("sx", self.stat.sum_sq_diff()),
        ])
    }

    fn load(&mut self, raw: &Params) -> Result<(), ModelError> {
        let n = count(raw, "n")?;
        let mean = scalar(raw, "mean")?;
        let sx = scalar(raw, "sx")?;
        if !(mean.is_finite() && sx.is_finite() && sx >= 0.0) {
            return Err(ModelError::InvalidParams(format!(
                "gaussian statistics must be finite with sx >= 0, got mean={mean}, sx={sx}"
            )));
        }
        self.stat = GaussianSuffStat::from_parts_unchecked(n, mean, sx);
        Ok(())
    }
}

/// Draws a mean and precision from the prior once per cluster.
#[derive(Clone, Debug)]
pub struct NormalGammaSampler {
    fx: Gaussian,
}

impl ValueSampler<NormalGamma, f64> for NormalGammaSampler {
    fn init(shared: &NormalGamma, mut rng: &mut dyn RngCore) -> Self {
        Self {
            fx: shared.draw(&mut rng),
        }
    }

    fn eval(&self, _shared: &NormalGamma, mut rng: &mut dyn RngCore) -> f64 {
        self.fx.draw(&mut rng)
    }
}
