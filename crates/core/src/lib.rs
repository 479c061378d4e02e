#![warn(clippy::all, missing_docs)]

//! Build-time packaging of contract and challenge definitions.
//!
//! Walks the content tree, packs every challenge file into its own
//! MessagePack resource and bundles the remaining contracts into a single
//! brotli-compressed JSON document read by the game server.

pub mod config;
pub mod models;
pub mod pack;
pub mod pipeline;
pub mod resource;

pub use config::{DeclarationPolicy, PackConfig};
pub use models::{ContractBundle, ContractKind, SourceDocument};
pub use pipeline::{PackReport, Packager};
