pub mod cluster;
pub mod config;
pub mod engine;
pub mod interaction;
pub mod sampling;

#[cfg(test)]
mod engine_tests;

pub use cluster::*;
pub use config::*;
pub use engine::*;
pub use interaction::*;
pub use sampling::*;
