//! Codec-level error kinds.

use thiserror::Error;

/// Failures the LegacyWire codec can raise while decoding or encoding a frame.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CodecError {
	/// A `time`/`t` token failed to parse under [`crate::timestamp`]'s format.
	#[error("malformed timestamp: {0}")]
	MalformedTime(String),

	/// A `method`/`meth`/`m` token was present but not in the alias table.
	#[error("unknown method: {0}")]
	UnknownMethod(String),

	/// Emission was attempted without a topic.
	#[error("packet has no topic")]
	MissingTopic,

	/// Emission was attempted without a method.
	#[error("packet has no method")]
	MissingMethod,
}
