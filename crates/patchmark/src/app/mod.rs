//! The patch protocol engine and the session plumbing around it.

pub mod apply;
pub mod locate;
pub mod parser;
pub mod preview;
pub mod prompt;
pub mod review;
pub mod session;
