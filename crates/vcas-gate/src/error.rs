//! The error taxonomy shared by the connection client, gateway service, and hook
//! service, and its mapping onto RPC status codes.

use thiserror::Error;
use tonic::{Code, Status};
use vcas_proto::CodecError;

/// Everything that can go wrong handling a LegacyWire record or an RPC call.
#[derive(Debug, Error)]
pub enum GatewayError {
	/// A frame failed to decode; the connection survives.
	#[error("malformed frame: {0}")]
	MalformedFrame(#[from] CodecError),

	/// A decoded packet had no topic.
	#[error("unknown topic")]
	UnknownTopic,

	/// A decoded packet's method was absent or unrecognized at handling time.
	#[error("unknown method")]
	UnknownMethod,

	/// An adapter RPC returned a non-success result code.
	#[error("broker rejected the call: {0}")]
	BrokerRejected(String),

	/// An adapter RPC failed at the transport layer.
	#[error("broker transport error: {0}")]
	BrokerTransport(String),

	/// `Authenticate` failed or was rejected.
	#[error("authentication failed")]
	AuthnFailed,

	/// ACL `Check` denied a publish during authorization.
	#[error("policy denied")]
	PolicyDenied,

	/// A SQL operation (rule fetch, DDL, flush) failed.
	#[error("store unavailable: {0}")]
	StoreUnavailable(#[from] sqlx::Error),

	/// A delivered message's JSON payload failed to parse.
	#[error("payload decode error")]
	DecodeJson,
}

impl GatewayError {
	/// The RPC code this error is reported as back to the broker, per the error
	/// taxonomy. `BrokerTransport` is context-dependent (`INTERNAL` only during
	/// authentication) and is mapped by the caller instead of here.
	pub fn code(&self) -> Code {
		match self {
			Self::MalformedFrame(_)
			| Self::UnknownTopic
			| Self::UnknownMethod
			| Self::BrokerRejected(_)
			| Self::BrokerTransport(_)
			| Self::DecodeJson => Code::Unknown,
			Self::AuthnFailed => Code::Unauthenticated,
			Self::PolicyDenied => Code::FailedPrecondition,
			Self::StoreUnavailable(_) => Code::Unavailable,
		}
	}
}

impl From<GatewayError> for Status {
	fn from(err: GatewayError) -> Self {
		Status::new(err.code(), err.to_string())
	}
}
