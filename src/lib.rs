//! Stackweave: declarative serverless web stacks.
//!
//! Declares a static-asset bucket, a CDN distribution in front of it, a sync
//! of local static files, a container-image function, and a catch-all REST
//! API, then synthesizes them into a CloudFormation template.

pub mod assets;
pub mod cli;
pub mod core;
pub mod error;

pub use error::{Error, Result};
