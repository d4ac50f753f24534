//! Services shared by every operation
//!
//! The codec is kept apart from the editing algorithms so that decoding,
//! validation and encoding happen at one boundary.

pub mod codec;

pub use codec::ImageCodec;
