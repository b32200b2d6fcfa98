//! Display synchronization: divergence detection and the update controller.

pub mod controller;
pub mod divergence;

pub use controller::{HookFactory, UpdateBatch, UpdateController};
pub use divergence::{detect, Divergence};
