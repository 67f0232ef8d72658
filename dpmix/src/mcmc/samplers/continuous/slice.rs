//! Univariate slice sampling with stepping out and shrinkage.
//!
//! Neal, R. M. (2003). Slice sampling. Annals of Statistics, 31(3), 705-767.
//! `interval` is Fig. 3 and `shrink` is Fig. 5 of the paper.
use rand::Rng;
use rand::distr::OpenClosed01;
use serde::{Deserialize, Serialize};

/// Iteration caps of one slice-sampling step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceOptions {
    /// Stepping-out steps, split at random between the two ends.
    pub max_expansions: usize,
    /// Proposals drawn from the shrinking bracket before giving up.
    pub max_shrinks: usize,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            max_expansions: 1000,
            max_shrinks: 100,
        }
    }
}

/// Outcome of one slice-sampling step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceDraw {
    /// The new point.
    pub x: f64,
    /// Log height of the slice.
    pub y: f64,
    /// `false` when shrinkage ran out of proposals and `x` is the last
    /// rejected one.
    pub accepted: bool,
}

/// Step out from `x0` in increments of `w` until both ends of the bracket
/// fall below the log height `y`, or the expansion budget runs out.
pub fn interval<F, R>(
    mut pdf: F,
    x0: f64,
    y: f64,
    w: f64,
    max_expansions: usize,
    rng: &mut R,
) -> (f64, f64)
where
    F: FnMut(f64) -> f64,
    R: Rng,
{
    let mut left = x0 - w * rng.random::<f64>();
    let mut right = left + w;

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let mut j = (max_expansions as f64 * rng.random::<f64>()).floor() as usize;
    let mut k = max_expansions.saturating_sub(1).saturating_sub(j);

    let mut left_open = y < pdf(left);
    while left_open && j > 0 {
        left -= w;
        j -= 1;
        left_open = y < pdf(left);
    }

    let mut right_open = y < pdf(right);
    while right_open && k > 0 {
        right += w;
        k -= 1;
        right_open = y < pdf(right);
    }

    if left_open || right_open {
        log::warn!("slice interval hit maximum expansions ({max_expansions}) at [{left}, {right}]");
    }
    (left, right)
}

/// Draw uniformly from `bracket`, shrinking it towards `x0` on every
/// rejection. Returns the accepted point, or the last proposal and `false`
/// once `max_shrinks` proposals have been rejected.
pub fn shrink<F, R>(
    mut pdf: F,
    x0: f64,
    y: f64,
    bracket: (f64, f64),
    max_shrinks: usize,
    rng: &mut R,
) -> (f64, bool)
where
    F: FnMut(f64) -> f64,
    R: Rng,
{
    let (mut left, mut right) = bracket;
    let mut x1 = x0;
    for _ in 0..max_shrinks {
        x1 = left + rng.random::<f64>() * (right - left);
        if y < pdf(x1) {
            return (x1, true);
        }
        if x1 < x0 {
            left = x1;
        } else {
            right = x1;
        }
    }

    log::warn!("slice shrink exceeded maximum iterations ({max_shrinks})");
    (x1, false)
}

/// One slice-sampling step of the log density `pdf` from `x0`.
pub fn slice_sample<F, R>(mut pdf: F, x0: f64, w: f64, options: &SliceOptions, rng: &mut R) -> SliceDraw
where
    F: FnMut(f64) -> f64,
    R: Rng,
{
    let u: f64 = rng.sample(OpenClosed01);
    let y = u.ln() + pdf(x0);
    let bracket = interval(&mut pdf, x0, y, w, options.max_expansions, rng);
    let (x, accepted) = shrink(&mut pdf, x0, y, bracket, options.max_shrinks, rng);
    SliceDraw { x, y, accepted }
}
