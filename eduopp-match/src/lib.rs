pub mod engine;

pub use engine::MatchEngine;
