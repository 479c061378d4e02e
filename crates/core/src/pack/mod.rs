//! Challenge packing and contract bundling.

/// Output names for packed challenges.
pub mod address;
/// Contract bundle compression.
pub mod bundle;
/// MessagePack challenge codec.
pub mod codec;

pub use address::{challenge_digest, ContentAddresser};
pub use bundle::{decompress_bundle, BundleCompressor};
pub use codec::{CodecError, ItemPacker};
