//! # Neural Network Layer Modules

pub mod activation;
pub use activation::Activation;

pub mod linear;
pub use linear::{LayerForward, Linear};
