//! Denoising autoencoder on binarized MNIST.
//!
//! Clean digits are corrupted with Gaussian noise and a 784-256-64-256-784
//! network learns to reconstruct the clean image. See [`training::train`].

pub mod artifacts;
pub mod benchmark;
pub mod data;
pub mod model;
pub mod noise;
pub mod notebook;
pub mod training;

pub use artifacts::{ArtifactWriter, Snapshot};
pub use model::{load_model, save_model, Autoencoder};
pub use training::{train, TrainingBackend, TrainingConfig, TrainingOutcome};
