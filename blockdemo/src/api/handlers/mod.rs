//! HTTP request handlers.
//!
//! - [`comparison`]: the blocking and non-blocking query endpoints

pub mod comparison;
