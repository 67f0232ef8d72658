pub mod data;
pub mod error;
pub mod mcmc;
pub mod models;

pub mod utils;

pub use error::{Error, Result};

use error::ModelError;

/// Lens to an inner value of a structure.
pub trait Lens<S, X> {
    /// Get the lensed value
    fn get<'a>(&self, state: &'a S) -> std::result::Result<&'a X, ModelError>;
    /// Set the lensed value in place
    fn set(&self, state: &mut S, x: X) -> std::result::Result<(), ModelError>;
}
