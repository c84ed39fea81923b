pub mod config;
pub mod normalize;
pub mod scoring;

pub use config::{MatchConfig, ScaleReference};
pub use normalize::normalize;
pub use scoring::{best_match, score};
