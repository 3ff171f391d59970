pub mod endpoints;
pub mod hierarchy;
pub mod orchestrator;
pub mod resolver;
pub mod streams;

pub use orchestrator::Analyzer;
