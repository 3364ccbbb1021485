//! Core domain models
//!
//! This module defines the data structures that describe a pipeline:
//! resources, stages with their backend descriptors, and run state.

pub mod config;
pub mod pipeline;
pub mod resource;
pub mod stage;
pub mod state;

pub use pipeline::*;
pub use resource::*;
pub use stage::*;
pub use state::*;
