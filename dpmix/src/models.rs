pub mod feature;
pub mod features;
pub mod mixture;
pub mod params;

pub use feature::{Feature, FeatureGroup, FeatureModel, FeatureSampler, Row, Value, feature};
pub use mixture::{ChineseRestaurant, ClusterPrior, DirichletFixed, Dpmm, FixedDirichlet, MixtureModel, OpenPrior};
pub use params::{Locator, Param, ParamLens, Params};
