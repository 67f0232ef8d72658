//! Hyperparameter kernels.
//!
//! Every kernel here resamples one feature at a time through a
//! `*_feature` function. Features do not share hyperparameters, so a
//! scheduler may hand different features to different workers as long as no
//! assignment kernel runs on the same model meanwhile.
pub mod grid;
pub mod slice;
