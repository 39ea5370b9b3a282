//! Type definitions

pub mod analytics;
pub mod audit;
pub mod job;

pub use analytics::*;
pub use audit::*;
pub use job::*;
