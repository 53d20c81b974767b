//! The outbound broker adapter RPC client (south): `Authenticate`, `Publish`,
//! `Subscribe`, `Unsubscribe`, `Send`, `Close` against the broker's adapter
//! listener, per §6's "Broker adapter RPC (south)" table.

use async_trait::async_trait;
use tonic::Request;
use tonic::client::Grpc;
use tonic::transport::Channel;
use vcas_proto::rpc::{
	Ack, AuthenticateRequest, ClientInfo, CloseRequest, PublishRequest, ResultCode,
	SendBytesRequest, SubscribeRequest, UnsubscribeRequest,
};

use crate::error::GatewayError;
use crate::rpc_codec::JsonCodec;

/// The six calls the gateway issues against the broker on a connection's behalf.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
	/// Registers `conn` with the broker under the given identity.
	async fn authenticate(&self, conn: &str, info: ClientInfo) -> Result<(), GatewayError>;

	/// Publishes `payload` to `topic` on `conn`'s behalf.
	async fn publish(
		&self,
		conn: &str,
		topic: &str,
		qos: u8,
		payload: serde_json::Value,
	) -> Result<(), GatewayError>;

	/// Subscribes `conn` to `topic` at the given QoS.
	async fn subscribe(&self, conn: &str, topic: &str, qos: u8) -> Result<(), GatewayError>;

	/// Unsubscribes `conn` from `topic`.
	async fn unsubscribe(&self, conn: &str, topic: &str) -> Result<(), GatewayError>;

	/// Sends a raw encoded LegacyWire line down to `conn`'s socket.
	async fn send(&self, conn: &str, bytes: Vec<u8>) -> Result<(), GatewayError>;

	/// Tears `conn`'s socket down.
	async fn close(&self, conn: &str) -> Result<(), GatewayError>;
}

/// A [`BrokerAdapter`] that makes real unary gRPC calls over a [`Channel`],
/// using [`JsonCodec`] in place of protoc-generated message framing.
pub struct TonicBrokerAdapter {
	channel: Channel,
}

impl TonicBrokerAdapter {
	/// Wraps an already-connected channel to the broker's adapter listener.
	pub fn new(channel: Channel) -> Self {
		Self { channel }
	}

	async fn call<Req, Resp>(
		&self,
		path: &'static str,
		request: Req,
	) -> Result<Resp, GatewayError>
	where
		Req: serde::Serialize + Send + Sync + 'static,
		Resp: serde::de::DeserializeOwned + Send + Sync + 'static,
	{
		let mut grpc = Grpc::new(self.channel.clone());
		grpc
			.ready()
			.await
			.map_err(|e| GatewayError::BrokerTransport(e.to_string()))?;

		let path = http::uri::PathAndQuery::from_static(path);
		let response = grpc
			.unary(Request::new(request), path, JsonCodec::<Req, Resp>::default())
			.await
			.map_err(|status| GatewayError::BrokerTransport(status.message().to_owned()))?;

		Ok(response.into_inner())
	}

	fn check_ack(ack: Ack) -> Result<(), GatewayError> {
		match ack.code {
			ResultCode::Success => Ok(()),
			ResultCode::Failure => Err(GatewayError::BrokerRejected(ack.message)),
		}
	}

	/// Unlike [`Self::check_ack`], a rejected `Authenticate` ack is reported as
	/// [`GatewayError::AuthnFailed`] rather than `BrokerRejected`, per §7's
	/// taxonomy ("Raised by: broker Authenticate").
	fn check_authn_ack(ack: Ack) -> Result<(), GatewayError> {
		match ack.code {
			ResultCode::Success => Ok(()),
			ResultCode::Failure => Err(GatewayError::AuthnFailed),
		}
	}
}

#[async_trait]
impl BrokerAdapter for TonicBrokerAdapter {
	async fn authenticate(&self, conn: &str, info: ClientInfo) -> Result<(), GatewayError> {
		let ack: Ack = self
			.call(
				"/vcas.Adapter/Authenticate",
				AuthenticateRequest {
					conn: conn.to_owned(),
					client_info: info,
				},
			)
			.await?;
		Self::check_authn_ack(ack)
	}

	async fn publish(
		&self,
		conn: &str,
		topic: &str,
		qos: u8,
		payload: serde_json::Value,
	) -> Result<(), GatewayError> {
		let ack: Ack = self
			.call(
				"/vcas.Adapter/Publish",
				PublishRequest {
					conn: conn.to_owned(),
					topic: topic.to_owned(),
					qos,
					payload,
				},
			)
			.await?;
		Self::check_ack(ack)
	}

	async fn subscribe(&self, conn: &str, topic: &str, qos: u8) -> Result<(), GatewayError> {
		let ack: Ack = self
			.call(
				"/vcas.Adapter/Subscribe",
				SubscribeRequest {
					conn: conn.to_owned(),
					topic: topic.to_owned(),
					qos,
				},
			)
			.await?;
		Self::check_ack(ack)
	}

	async fn unsubscribe(&self, conn: &str, topic: &str) -> Result<(), GatewayError> {
		let ack: Ack = self
			.call(
				"/vcas.Adapter/Unsubscribe",
				UnsubscribeRequest {
					conn: conn.to_owned(),
					topic: topic.to_owned(),
				},
			)
			.await?;
		Self::check_ack(ack)
	}

	async fn send(&self, conn: &str, bytes: Vec<u8>) -> Result<(), GatewayError> {
		let ack: Ack = self
			.call(
				"/vcas.Adapter/Send",
				SendBytesRequest {
					conn: conn.to_owned(),
					bytes,
				},
			)
			.await?;
		Self::check_ack(ack)
	}

	async fn close(&self, conn: &str) -> Result<(), GatewayError> {
		let ack: Ack = self
			.call(
				"/vcas.Adapter/Close",
				CloseRequest {
					conn: conn.to_owned(),
				},
			)
			.await?;
		Self::check_ack(ack)
	}
}

/// An in-memory [`BrokerAdapter`] for exercising the connection client and
/// gateway service without a running broker.
#[cfg(test)]
pub mod fake {
	use std::sync::Mutex;

	use super::*;

	#[derive(Default)]
	pub struct FakeAdapter {
		pub sent: Mutex<Vec<(String, Vec<u8>)>>,
		pub closed: Mutex<Vec<String>>,
		pub deny_auth: Mutex<bool>,
		pub published: Mutex<Vec<(String, String, u8, serde_json::Value)>>,
		pub subscribed: Mutex<Vec<(String, String, u8)>>,
		pub unsubscribed: Mutex<Vec<(String, String)>>,
	}

	#[async_trait]
	impl BrokerAdapter for FakeAdapter {
		async fn authenticate(&self, _conn: &str, _info: ClientInfo) -> Result<(), GatewayError> {
			if *self.deny_auth.lock().unwrap() {
				Err(GatewayError::AuthnFailed)
			} else {
				Ok(())
			}
		}

		async fn publish(
			&self,
			conn: &str,
			topic: &str,
			qos: u8,
			payload: serde_json::Value,
		) -> Result<(), GatewayError> {
			self
				.published
				.lock()
				.unwrap()
				.push((conn.to_owned(), topic.to_owned(), qos, payload));
			Ok(())
		}

		async fn subscribe(&self, conn: &str, topic: &str, qos: u8) -> Result<(), GatewayError> {
			self
				.subscribed
				.lock()
				.unwrap()
				.push((conn.to_owned(), topic.to_owned(), qos));
			Ok(())
		}

		async fn unsubscribe(&self, conn: &str, topic: &str) -> Result<(), GatewayError> {
			self
				.unsubscribed
				.lock()
				.unwrap()
				.push((conn.to_owned(), topic.to_owned()));
			Ok(())
		}

		async fn send(&self, conn: &str, bytes: Vec<u8>) -> Result<(), GatewayError> {
			self.sent.lock().unwrap().push((conn.to_owned(), bytes));
			Ok(())
		}

		async fn close(&self, conn: &str) -> Result<(), GatewayError> {
			self.closed.lock().unwrap().push(conn.to_owned());
			Ok(())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::fake::FakeAdapter;
	use super::*;

	#[tokio::test]
	async fn fake_adapter_records_sent_bytes() {
		let adapter = FakeAdapter::default();
		adapter.send("c1", b"pub|top1|set|value:1\n".to_vec()).await.unwrap();
		assert_eq!(adapter.sent.lock().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn fake_adapter_can_be_made_to_deny_auth() {
		let adapter = FakeAdapter::default();
		*adapter.deny_auth.lock().unwrap() = true;
		let info = ClientInfo {
			proto_name: "VCAS".into(),
			proto_ver: "1".into(),
			clientid: "c1".into(),
			username: "c1".into(),
		};
		assert!(adapter.authenticate("c1", info).await.is_err());
	}
}
