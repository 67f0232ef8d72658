use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Lens;
use crate::error::ModelError;

/// A single named parameter: a scalar or a vector of components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl From<f64> for Param {
    fn from(x: f64) -> Self {
        Self::Scalar(x)
    }
}

impl From<Vec<f64>> for Param {
    fn from(xs: Vec<f64>) -> Self {
        Self::Vector(xs)
    }
}

/// Opaque, serializable representation of hyperparameters or group
/// statistics, keyed by parameter name.
pub type Params = BTreeMap<String, Param>;

/// Build a [`Params`] map from `(key, value)` pairs.
pub fn params<K, V, I>(entries: I) -> Params
where
    K: Into<String>,
    V: Into<Param>,
    I: IntoIterator<Item = (K, V)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Read the scalar stored under `key`.
pub fn scalar(params: &Params, key: &str) -> Result<f64, ModelError> {
    match params.get(key) {
        Some(Param::Scalar(x)) => Ok(*x),
        Some(Param::Vector(_)) => Err(ModelError::ParamShape {
            key: key.to_owned(),
            expected: "scalar",
        }),
        None => Err(ModelError::MissingParam {
            key: key.to_owned(),
        }),
    }
}

/// Read the vector stored under `key`.
pub fn vector<'a>(params: &'a Params, key: &str) -> Result<&'a [f64], ModelError> {
    match params.get(key) {
        Some(Param::Vector(xs)) => Ok(xs),
        Some(Param::Scalar(_)) => Err(ModelError::ParamShape {
            key: key.to_owned(),
            expected: "vector",
        }),
        None => Err(ModelError::MissingParam {
            key: key.to_owned(),
        }),
    }
}

/// Read a non-negative integral count stored as a scalar under `key`.
pub fn count(params: &Params, key: &str) -> Result<usize, ModelError> {
    as_count(key, scalar(params, key)?)
}

/// Interpret `x`, read from `key`, as a non-negative integral count.
pub fn as_count(key: &str, x: f64) -> Result<usize, ModelError> {
    if x.is_finite() && x >= 0.0 && x.fract() == 0.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = x as usize;
        Ok(n)
    } else {
        Err(ModelError::InvalidParams(format!(
            "`{key}` must be a non-negative integer, got {x}"
        )))
    }
}

/// Where a resampled scalar lives inside a [`Param`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locator {
    /// The parameter is itself the scalar.
    Scalar,
    /// Component `i` of a vector-valued parameter.
    Index(usize),
}

/// A lens onto one scalar of a [`Params`] map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamLens {
    pub key: String,
    pub locator: Locator,
}

impl ParamLens {
    pub fn scalar(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            locator: Locator::Scalar,
        }
    }

    pub fn index(key: impl Into<String>, index: usize) -> Self {
        Self {
            key: key.into(),
            locator: Locator::Index(index),
        }
    }

    fn missing(&self) -> ModelError {
        ModelError::MissingParam {
            key: self.key.clone(),
        }
    }

    fn shape(&self) -> ModelError {
        match self.locator {
            Locator::Scalar => ModelError::ParamShape {
                key: self.key.clone(),
                expected: "scalar",
            },
            Locator::Index(_) => ModelError::ParamShape {
                key: self.key.clone(),
                expected: "vector",
            },
        }
    }

    fn out_of_range(&self, index: usize) -> ModelError {
        ModelError::ParamIndex {
            key: self.key.clone(),
            index,
        }
    }
}

impl Lens<Params, f64> for ParamLens {
    fn get<'a>(&self, state: &'a Params) -> Result<&'a f64, ModelError> {
        match (state.get(&self.key), self.locator) {
            (None, _) => Err(self.missing()),
            (Some(Param::Scalar(x)), Locator::Scalar) => Ok(x),
            (Some(Param::Vector(xs)), Locator::Index(i)) => {
                xs.get(i).ok_or_else(|| self.out_of_range(i))
            }
            (Some(_), _) => Err(self.shape()),
        }
    }

    fn set(&self, state: &mut Params, x: f64) -> Result<(), ModelError> {
        match (state.get_mut(&self.key), self.locator) {
            (None, _) => Err(self.missing()),
            (Some(Param::Scalar(slot)), Locator::Scalar) => {
                *slot = x;
                Ok(())
            }
            (Some(Param::Vector(xs)), Locator::Index(i)) => {
                let slot = xs.get_mut(i).ok_or_else(|| self.out_of_range(i))?;
                *slot = x;
                Ok(())
            }
            (Some(_), _) => Err(self.shape()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lens_reads_and_writes_components() {
        let mut hp = params([
            ("alpha", Param::from(1.5)),
            ("alphas", Param::from(vec![0.5, 2.0])),
        ]);

        let alpha = ParamLens::scalar("alpha");
        let second = ParamLens::index("alphas", 1);

        assert_eq!(alpha.get(&hp), Ok(&1.5));
        assert_eq!(second.get(&hp), Ok(&2.0));

        second.set(&mut hp, 3.0).unwrap();
        alpha.set(&mut hp, 0.25).unwrap();
        assert_eq!(vector(&hp, "alphas"), Ok(&[0.5, 3.0][..]));
        assert_eq!(scalar(&hp, "alpha"), Ok(0.25));
    }

    #[test]
    fn lens_errors() {
        let hp = params([("alphas", vec![1.0])]);

        assert!(matches!(
            ParamLens::scalar("beta").get(&hp),
            Err(ModelError::MissingParam { .. })
        ));
        assert!(matches!(
            ParamLens::scalar("alphas").get(&hp),
            Err(ModelError::ParamShape { .. })
        ));
        assert_eq!(
            ParamLens::index("alphas", 4).get(&hp),
            Err(ModelError::ParamIndex {
                key: "alphas".into(),
                index: 4
            })
        );
    }

    #[test]
    fn serde_round_trip() {
        let hp = params([("m", Param::from(0.0)), ("w", Param::from(vec![1.0, 2.0]))]);
        let json = serde_json::to_string(&hp).unwrap();
        assert_eq!(json, r#"{"m":0.0,"w":[1.0,2.0]}"#);
        let back: Params = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hp);
    }
}
