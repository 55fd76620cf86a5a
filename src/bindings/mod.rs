//! # Bindings
//!
//! Foreign-language entry points, compiled only with the matching feature.

pub mod python;
