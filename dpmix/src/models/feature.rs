//! The per-feature observation model capability.
//!
//! A feature model is written against three typed roles, [`Shared`],
//! [`Group`] and [`ValueSampler`], tied together by a [`FeatureModel`].
//! [`feature`] erases a typed model into a [`Feature`] so a mixture can hold
//! features of different observation types side by side.
//!
//! The erased feature owns its hyperparameters behind a shared handle; every
//! group and sampler it creates holds the same handle, so loading new
//! hyperparameters is observed by all live groups at once.
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::params::Params;
use crate::error::ModelError;

/// One observed value of one feature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Real(f64),
    Category(usize),
}

impl Value {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => <bool as Observation>::KIND,
            Self::Real(_) => <f64 as Observation>::KIND,
            Self::Category(_) => <usize as Observation>::KIND,
        }
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Self {
        Self::Bool(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Real(x)
    }
}

impl From<usize> for Value {
    fn from(x: usize) -> Self {
        Self::Category(x)
    }
}

/// An entity's observation: one value per feature.
pub type Row = Vec<Value>;

/// Typed view of a [`Value`].
pub trait Observation: Clone + Debug + Send + Sync + 'static {
    const KIND: &'static str;

    fn from_value(value: &Value) -> Option<&Self>;

    fn into_value(self) -> Value;
}

impl Observation for bool {
    const KIND: &'static str = "bool";

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Bool(x) => Some(x),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl Observation for f64 {
    const KIND: &'static str = "real";

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Real(x) => Some(x),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Real(self)
    }
}

impl Observation for usize {
    const KIND: &'static str = "category";

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Category(x) => Some(x),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Category(self)
    }
}

/// Hyperparameters shared by every group of one feature.
pub trait Shared: Clone + Debug + Send + Sync + 'static {
    /// Replace the hyperparameters with those in `raw`.
    ///
    /// On error `self` must be left unchanged.
    fn load(&mut self, raw: &Params) -> Result<(), ModelError>;

    fn dump(&self) -> Params;

    /// Length of a vector-valued observation.
    fn dimension(&self) -> usize {
        1
    }
}

/// Sufficient statistics of the values of one feature held by one group.
pub trait Group<S, X>: Clone + Debug + Send + Sync + 'static {
    /// A group holding no values.
    fn init(shared: &S, rng: &mut dyn RngCore) -> Self;

    fn add_value(&mut self, shared: &S, x: &X);

    fn remove_value(&mut self, shared: &S, x: &X);

    /// Log predictive density of `x` joining this group.
    fn score_value(&self, shared: &S, x: &X) -> f64;

    /// Log marginal likelihood of every value in this group.
    fn score_data(&self, shared: &S) -> f64;

    fn dump(&self) -> Params;

    /// Replace the statistics with those in `raw`.
    ///
    /// On error `self` must be left unchanged.
    fn load(&mut self, raw: &Params) -> Result<(), ModelError>;
}

/// Generative draws for one cluster of one feature.
pub trait ValueSampler<S, X>: Debug + Send + Sync + 'static {
    /// Draw the cluster's parameters from the prior.
    fn init(shared: &S, rng: &mut dyn RngCore) -> Self;

    fn eval(&self, shared: &S, rng: &mut dyn RngCore) -> X;
}

/// Binds the three roles of an observation model to a value type.
pub trait FeatureModel: 'static {
    type Value: Observation;
    type Shared: Shared;
    type Group: Group<Self::Shared, Self::Value>;
    type Sampler: ValueSampler<Self::Shared, Self::Value>;

    /// Reject values of the right kind that fall outside the model's support.
    fn check(_shared: &Self::Shared, _x: &Self::Value) -> Result<(), ModelError> {
        Ok(())
    }
}

/// A feature's hyperparameters, and a factory for its groups and samplers.
pub trait Feature: Debug + Send + Sync {
    /// The kind of [`Value`] this feature observes.
    fn kind(&self) -> &'static str;

    fn check(&self, value: &Value) -> Result<(), ModelError>;

    fn dump(&self) -> Params;

    /// Replace the hyperparameters. On error they are left unchanged.
    fn load(&self, raw: &Params) -> Result<(), ModelError>;

    fn dimension(&self) -> usize;

    fn create_group(&self, rng: &mut dyn RngCore) -> Box<dyn FeatureGroup>;

    fn create_sampler(&self, rng: &mut dyn RngCore) -> Box<dyn FeatureSampler>;
}

/// Sufficient statistics for one feature of one group, bound to the
/// feature's hyperparameters.
pub trait FeatureGroup: Debug + Send + Sync {
    fn add_value(&mut self, value: &Value) -> Result<(), ModelError>;

    fn remove_value(&mut self, value: &Value) -> Result<(), ModelError>;

    fn score_value(&self, value: &Value) -> Result<f64, ModelError>;

    fn score_data(&self) -> f64;

    fn dump(&self) -> Params;

    fn load(&mut self, raw: &Params) -> Result<(), ModelError>;
}

/// One cluster's generative sampler for one feature.
pub trait FeatureSampler: Debug + Send + Sync {
    fn eval(&self, rng: &mut dyn RngCore) -> Value;
}

/// Erase a typed feature model with hyperparameters `shared`.
pub fn feature<F: FeatureModel>(shared: F::Shared) -> Box<dyn Feature> {
    Box::new(SharedFeature::<F> {
        shared: Arc::new(RwLock::new(shared)),
        _model: PhantomData,
    })
}

type Handle<S> = Arc<RwLock<S>>;

fn read<S>(handle: &RwLock<S>) -> RwLockReadGuard<'_, S> {
    handle.read().unwrap_or_else(PoisonError::into_inner)
}

fn observation<X: Observation>(value: &Value) -> Result<&X, ModelError> {
    X::from_value(value).ok_or(ModelError::ValueKind {
        expected: X::KIND,
        found: value.kind(),
    })
}

fn checked<'a, F: FeatureModel>(
    shared: &F::Shared,
    value: &'a Value,
) -> Result<&'a F::Value, ModelError> {
    let x = observation::<F::Value>(value)?;
    F::check(shared, x)?;
    Ok(x)
}

struct SharedFeature<F: FeatureModel> {
    shared: Handle<F::Shared>,
    _model: PhantomData<fn() -> F>,
}

impl<F: FeatureModel> Debug for SharedFeature<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Feature").field(&*read(&self.shared)).finish()
    }
}

impl<F: FeatureModel> Feature for SharedFeature<F> {
    fn kind(&self) -> &'static str {
        <F::Value as Observation>::KIND
    }

    fn check(&self, value: &Value) -> Result<(), ModelError> {
        checked::<F>(&read(&self.shared), value).map(|_| ())
    }

    fn dump(&self) -> Params {
        read(&self.shared).dump()
    }

    fn load(&self, raw: &Params) -> Result<(), ModelError> {
        let mut next = read(&self.shared).clone();
        next.load(raw)?;
        *self.shared.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }

    fn dimension(&self) -> usize {
        read(&self.shared).dimension()
    }

    fn create_group(&self, rng: &mut dyn RngCore) -> Box<dyn FeatureGroup> {
        let group = F::Group::init(&read(&self.shared), rng);
        Box::new(BoundGroup::<F> {
            shared: Arc::clone(&self.shared),
            group,
            _model: PhantomData,
        })
    }

    fn create_sampler(&self, rng: &mut dyn RngCore) -> Box<dyn FeatureSampler> {
        let sampler = F::Sampler::init(&read(&self.shared), rng);
        Box::new(BoundSampler::<F> {
            shared: Arc::clone(&self.shared),
            sampler,
            _model: PhantomData,
        })
    }
}

struct BoundGroup<F: FeatureModel> {
    shared: Handle<F::Shared>,
    group: F::Group,
    _model: PhantomData<fn() -> F>,
}

impl<F: FeatureModel> Debug for BoundGroup<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.group.fmt(f)
    }
}

impl<F: FeatureModel> FeatureGroup for BoundGroup<F> {
    fn add_value(&mut self, value: &Value) -> Result<(), ModelError> {
        let shared = read(&self.shared);
        let x = checked::<F>(&shared, value)?;
        self.group.add_value(&shared, x);
        Ok(())
    }

    fn remove_value(&mut self, value: &Value) -> Result<(), ModelError> {
        let shared = read(&self.shared);
        let x = checked::<F>(&shared, value)?;
        self.group.remove_value(&shared, x);
        Ok(())
    }

    fn score_value(&self, value: &Value) -> Result<f64, ModelError> {
        let shared = read(&self.shared);
        let x = checked::<F>(&shared, value)?;
        Ok(self.group.score_value(&shared, x))
    }

    fn score_data(&self) -> f64 {
        self.group.score_data(&read(&self.shared))
    }

    fn dump(&self) -> Params {
        self.group.dump()
    }

    fn load(&mut self, raw: &Params) -> Result<(), ModelError> {
        self.group.load(raw)
    }
}

struct BoundSampler<F: FeatureModel> {
    shared: Handle<F::Shared>,
    sampler: F::Sampler,
    _model: PhantomData<fn() -> F>,
}

impl<F: FeatureModel> Debug for BoundSampler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.sampler.fmt(f)
    }
}

impl<F: FeatureModel> FeatureSampler for BoundSampler<F> {
    fn eval(&self, rng: &mut dyn RngCore) -> Value {
        self.sampler.eval(&read(&self.shared), rng).into_value()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use rv::dist::Beta;

    use super::*;
    use crate::models::features::BetaBernoulli;
    use crate::models::params::params;

    #[test]
    fn wrong_kind_is_rejected_before_mutation() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let bb = feature::<BetaBernoulli>(Beta::uniform());
        let mut group = bb.create_group(&mut rng);

        assert_eq!(bb.kind(), "bool");
        assert_eq!(
            bb.check(&Value::Real(1.0)),
            Err(ModelError::ValueKind {
                expected: "bool",
                found: "real"
            })
        );
        assert!(group.add_value(&Value::Category(0)).is_err());
        assert_eq!(group.dump(), params([("heads", 0.0), ("tails", 0.0)]));
    }

    #[test]
    fn loaded_hyperparameters_reach_live_groups() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let bb = feature::<BetaBernoulli>(Beta::uniform());
        let mut group = bb.create_group(&mut rng);
        group.add_value(&Value::Bool(true)).unwrap();

        // Beta(1, 1) predictive after one head: 2/3
        assert::close(group.score_value(&Value::Bool(true)).unwrap(), (2.0_f64 / 3.0).ln(), 1e-12);

        bb.load(&params([("alpha", 3.0), ("beta", 1.0)])).unwrap();
        // Beta(3, 1) predictive after one head: 4/5
        assert::close(group.score_value(&Value::Bool(true)).unwrap(), 0.8_f64.ln(), 1e-12);
    }

    #[test]
    fn failed_load_keeps_hyperparameters() {
        let bb = feature::<BetaBernoulli>(Beta::uniform());
        let before = bb.dump();

        assert!(bb.load(&params([("alpha", -1.0), ("beta", 1.0)])).is_err());
        assert!(bb.load(&params([("alpha", 2.0)])).is_err());
        assert_eq!(bb.dump(), before);
    }
}
