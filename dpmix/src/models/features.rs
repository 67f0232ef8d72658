//! Reference observation models.
//!
//! The mixture machinery only depends on [`FeatureModel`](super::FeatureModel);
//! these implementations cover the common observation types.
mod beta_bernoulli;
mod dirichlet_multinomial;
mod normal_gamma;
mod uncollapsed;

pub use beta_bernoulli::{BetaBernoulli, BetaBernoulliGroup, BetaBernoulliSampler};
pub use dirichlet_multinomial::{
    DirichletMultinomial, DirichletMultinomialGroup, DirichletMultinomialSampler, DirichletShared,
};
pub use normal_gamma::{NormalGammaGaussian, NormalGammaGroup, NormalGammaSampler};
pub use uncollapsed::{UncollapsedBetaBernoulli, UncollapsedGroup};

use crate::error::ModelError;

fn invalid(err: impl std::fmt::Debug) -> ModelError {
    ModelError::InvalidParams(format!("{err:?}"))
}
