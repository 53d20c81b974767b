//! The LegacyWire ("VCAS") wire format: a pipe/colon tokenized text protocol with
//! aliased field names and a custom timestamp syntax.
//!
//! This crate is reflection-free by design: decoding walks a fixed key table
//! instead of runtime struct introspection (see [`packet::Packet::decode_into`]).

#![warn(missing_docs)]

pub mod error;
pub mod method;
pub mod packet;
pub mod rpc;
pub mod timestamp;

pub use error::CodecError;
pub use method::Method;
pub use packet::Packet;
