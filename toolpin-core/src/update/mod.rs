//! Update pipeline: plan with [`UpdateCalculator`], apply with [`UpdateExecutor`]

pub mod calculator;
pub mod executor;
pub mod task;

pub use calculator::{DesiredSet, UpdateCalculator, ANY_VERSION};
pub use executor::UpdateExecutor;
pub use task::{PluginUpdate, UpdateTask};
