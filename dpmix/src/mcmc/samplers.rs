pub mod continuous;
pub mod hyper;
pub mod partition;
