//! Utility functions for sigslice

pub mod cache;
pub mod url;

pub use cache::*;
pub use url::*;
