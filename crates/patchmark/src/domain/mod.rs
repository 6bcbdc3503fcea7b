//! Core data types shared across the engine.

pub mod errors;
pub mod marker;
pub mod model;
