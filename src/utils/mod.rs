//! # Utility Functions (`utils`)
//!
//! Execution context for the numeric kernels and serialization helpers.

pub mod parallel;
pub mod serialization;

pub use parallel::ExecutionContext;
pub use serialization::{
    load_checkpoint, restore_checkpoint, save_checkpoint, NetworkCheckpoint, SerializationError,
};
