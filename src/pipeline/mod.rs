//! The conversion pipeline: completion tracking, attachment persistence and orchestration.

pub mod conversion;
pub mod sink;
pub mod tracker;
