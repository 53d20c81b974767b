//! Wire types for the broker adapter RPC (south) and the broker hook RPC (south).
//!
//! The concrete wire schema (protobuf messages, generated client/server stubs) is
//! dictated by the broker vendor and is out of scope here; this module pins the
//! semantics those messages carry so the gateway and hook service can be built and
//! tested against a stable shape.

use serde::{Deserialize, Serialize};

/// Connection metadata sent on `Authenticate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
	/// Protocol name advertised to the broker, always `"VCAS"`.
	pub proto_name: String,
	/// Protocol version advertised to the broker.
	pub proto_ver: String,
	/// The broker-assigned connection identifier.
	pub clientid: String,
	/// The username presented to the broker; mirrors `clientid` for LegacyWire.
	pub username: String,
}

/// Broker adapter result code: `SUCCESS` plus implementation-defined failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
	/// The call completed as requested.
	Success,
	/// The broker rejected the call; see the accompanying message.
	Failure,
}

/// The uniform `{code, message}` result every adapter RPC returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
	/// Whether the broker accepted the call.
	pub code: ResultCode,
	/// Human-readable detail, populated on [`ResultCode::Failure`].
	pub message: String,
}

impl Ack {
	/// A successful acknowledgement with no message.
	pub fn success() -> Self {
		Self {
			code: ResultCode::Success,
			message: String::new(),
		}
	}
}

/// `Authenticate(conn, clientinfo)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateRequest {
	/// The broker-assigned connection identifier.
	pub conn: String,
	/// Protocol and identity metadata for the connecting legacy client.
	pub client_info: ClientInfo,
}

/// `Publish(conn, topic, qos, payload)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
	/// The publishing connection.
	pub conn: String,
	/// Destination topic.
	pub topic: String,
	/// Requested QoS; always `0` for LegacyWire publishes.
	pub qos: u8,
	/// The packet's JSON view, per [`crate::packet::Packet::to_publish_json`].
	pub payload: serde_json::Value,
}

/// `Subscribe(conn, topic, qos)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
	/// The subscribing connection.
	pub conn: String,
	/// Topic to subscribe to.
	pub topic: String,
	/// Requested QoS; `2` for ordinary subscribes, same for snapshot (`GET`).
	pub qos: u8,
}

/// `Unsubscribe(conn, topic)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
	/// The unsubscribing connection.
	pub conn: String,
	/// Topic to unsubscribe from.
	pub topic: String,
}

/// `Send(conn, bytes)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendBytesRequest {
	/// The destination connection.
	pub conn: String,
	/// The encoded LegacyWire line, trailing `\n` included.
	pub bytes: Vec<u8>,
}

/// `Close(conn)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRequest {
	/// The connection to tear down.
	pub conn: String,
}

/// One message delivered by the broker to a subscribed connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveredMessage {
	/// The topic the message was published on.
	pub topic: String,
	/// The raw JSON payload, shaped like [`crate::packet::Packet::to_publish_json`].
	pub payload: Vec<u8>,
}

/// The broker-facing gateway RPC's uniform empty acknowledgement.
///
/// The core always returns a concrete value here rather than a bare success with
/// no body, per the open question recorded in the design notes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EmptySuccess;

/// The action an ACL `Check` call is gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
	/// A publish attempt; the only action exclusive-owner rules gate.
	Publish,
	/// A subscribe attempt; always permitted.
	Subscribe,
}

/// The disposition of a hook call that produces a value (authorize, publish).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
	/// Keep evaluating the remaining instances; the service falls through to the
	/// default response if none stop the chain.
	Continue,
	/// This instance's value is final; no further instance runs.
	StopAndReturn,
}

/// The response shape for hooks that return a value: authorize and publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuedResponse<T> {
	/// Whether this is the final word or the chain should continue.
	pub disposition: Disposition,
	/// The carried value: a boolean for authorize, a message for publish.
	pub value: T,
}

impl<T> ValuedResponse<T> {
	/// A `CONTINUE` response carrying `value`.
	pub fn cont(value: T) -> Self {
		Self {
			disposition: Disposition::Continue,
			value,
		}
	}

	/// A `STOP_AND_RETURN` response carrying `value`.
	pub fn stop(value: T) -> Self {
		Self {
			disposition: Disposition::StopAndReturn,
			value,
		}
	}
}

/// A topic and its to-be-published payload, as seen by the publish hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishMessage {
	/// The destination topic.
	pub topic: String,
	/// The raw JSON payload about to be published.
	pub payload: Vec<u8>,
}

/// Declares a hook this provider wants to receive, returned from `OnProviderLoaded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookSpec {
	/// The hook name, e.g. `"client.authorize"` or `"message.publish"`.
	pub name: String,
	/// Optional topic filter; `None` means all topics.
	pub topics: Option<Vec<String>>,
}

/// The aggregate response to `OnProviderLoaded`: every instance's declared hooks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadedResponse {
	/// The combined hook declarations from every composed instance.
	pub hooks: Vec<HookSpec>,
}
