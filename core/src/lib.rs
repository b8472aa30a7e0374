pub mod config;
pub mod judge;
pub mod report;
pub mod style;
pub mod testing;

pub use crate::config::TestPlan;
