//! Cost model and the cost-aware scaling policy

mod model;
mod policy;

pub use model::{CostModel, COST_TIERS};
pub use policy::{ScalingPolicy, ServiceSnapshot};
