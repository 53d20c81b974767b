//! The broker-facing connection handler (§4.3): socket lifecycle and
//! byte/message dispatch to the right [`ConnectionClient`].

use std::sync::Arc;

use dashmap::DashMap;
use tonic::Status;
use vcas_proto::rpc::ClientInfo;

use crate::acl::AclEngine;
use crate::adapter::BrokerAdapter;
use crate::connection::ConnectionClient;
use crate::error::GatewayError;

/// Maintains the process-wide `conn -> Connection Client` map and implements
/// the broker's connection unary handler protocol.
pub struct GatewayService {
	adapter: Arc<dyn BrokerAdapter>,
	acl: Arc<AclEngine>,
	clients: DashMap<String, Arc<ConnectionClient>>,
}

impl GatewayService {
	/// Builds a gateway service over the given adapter client and ACL engine.
	///
	/// The ACL engine is passed in explicitly (shared with the hook service)
	/// rather than reached for through a global, per the design notes.
	pub fn new(adapter: Arc<dyn BrokerAdapter>, acl: Arc<AclEngine>) -> Self {
		Self {
			adapter,
			acl,
			clients: DashMap::new(),
		}
	}

	/// Authenticates `conn` with the broker and, on success, registers a new
	/// [`ConnectionClient`] for it.
	pub async fn on_socket_created(&self, conn: &str) -> Result<(), Status> {
		let info = ClientInfo {
			proto_name: "VCAS".to_owned(),
			proto_ver: "1".to_owned(),
			clientid: conn.to_owned(),
			username: conn.to_owned(),
		};

		match self.adapter.authenticate(conn, info).await {
			Ok(()) => {
				let client = ConnectionClient::new(conn.to_owned(), Arc::clone(&self.adapter));
				self.clients.insert(conn.to_owned(), client);
				Ok(())
			}
			Err(GatewayError::BrokerTransport(msg)) => {
				let _ = self.adapter.close(conn).await;
				Err(Status::internal(msg))
			}
			Err(err) => {
				let _ = self.adapter.close(conn).await;
				Err(Status::unauthenticated(err.to_string()))
			}
		}
	}

	/// Removes `conn`'s client and releases any ACL ownerships it held.
	pub fn on_socket_closed(&self, conn: &str) {
		self.clients.remove(conn);
		self.acl.release(conn);
	}

	/// Delegates a received byte chunk to `conn`'s client.
	///
	/// A missing client (the connection was already closed) is reported as
	/// success, not an error, per §4.3.
	pub async fn on_received_bytes(&self, conn: &str, chunk: &[u8]) -> Result<(), Status> {
		let Some(client) = self.clients.get(conn).map(|c| Arc::clone(&c)) else {
			return Ok(());
		};

		client
			.on_received_bytes(chunk)
			.await
			.map_err(|err| Status::unknown(err.to_string()))
	}

	/// Delegates each delivered message to `conn`'s client, in order.
	pub async fn on_received_messages(
		&self,
		conn: &str,
		messages: &[(String, Vec<u8>)],
	) -> Result<(), Status> {
		let Some(client) = self.clients.get(conn).map(|c| Arc::clone(&c)) else {
			return Ok(());
		};

		for (topic, payload) in messages {
			client
				.on_received_message(topic, payload)
				.await
				.map_err(|err| Status::unknown(err.to_string()))?;
		}
		Ok(())
	}

	/// `OnTimerTimeout`: a no-op success, per §4.3 (the gateway's own timers
	/// are scheduled and handled internally by the connection client).
	pub fn on_timer_timeout(&self) -> Result<(), Status> {
		Ok(())
	}

	/// The number of currently registered connections. Exposed for tests and
	/// diagnostics.
	pub fn connection_count(&self) -> usize {
		self.clients.len()
	}
}
