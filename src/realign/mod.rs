//! Bisulfite-aware profile realignment.

pub mod dp;
pub mod engine;
pub mod orchestrate;
pub mod profile;
pub mod scoring;

pub use engine::{RealignParams, RealignStats, Realigner, WorkRead};
pub use orchestrate::realign_store;
