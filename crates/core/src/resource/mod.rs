//! Source discovery, classification and output directory management.

/// File name routing.
pub mod classify;
/// Content tree enumeration.
pub mod discovery;
/// Output directory preparation.
pub mod output;

pub use classify::{filename_of, Classifier, Route};
pub use discovery::FileDiscovery;
pub use output::OutputDirectory;
