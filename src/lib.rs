//! CodeQL bundle builder
//!
//! This crate adds workspace packs to a released CodeQL bundle: customization
//! packs are wired into the standard library packs they extend, every pack
//! depending on a changed pack is recompiled, and the result is written back
//! as one or more bundle archives.

pub mod error;
pub mod package;
pub mod fsutil;
pub mod bundle;
pub mod graph;
pub mod plan;
pub mod build;
pub mod settings;
pub mod bundler;
pub mod cli;

// Re-export core types for convenience
pub use error::*;
pub use bundler::{BundleOutcome, BundleRequest, CustomBundle};
