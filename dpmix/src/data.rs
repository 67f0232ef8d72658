mod dataset;
mod groups;

pub use dataset::Dataset;
pub use groups::{EntityId, GroupId, GroupManager};
