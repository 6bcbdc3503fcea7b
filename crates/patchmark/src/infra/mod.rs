//! Infrastructure adapters: configuration, documents on disk, and logging.

pub mod config;
pub mod document;
pub mod logging;
