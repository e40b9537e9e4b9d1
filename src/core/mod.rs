//! Core stack logic: construct types, naming, configuration, building,
//! graph validation, synthesis, and diffing.

pub mod builder;
pub mod config;
pub mod graph;
pub mod naming;
pub mod planner;
pub mod state;
pub mod synth;
pub mod types;
pub mod validate;

pub use graph::{Stack, StackError};
