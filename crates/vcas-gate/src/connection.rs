//! The per-connection protocol state machine: buffered bytes → record → broker
//! action, with the one-shot snapshot (`GET`) mode described in §4.2.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Local;
use vcas_proto::Method;
use vcas_proto::packet::Packet;

use crate::adapter::BrokerAdapter;
use crate::error::GatewayError;

/// The receive buffer's resting capacity; grown beyond this only for an
/// oversized frame and reset back down afterward.
const RX_BUFFER_INITIAL_CAPACITY: usize = 255;

/// The snapshot (`GET`) auto-cancel delay.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

struct ConnectionState {
	rx_buffer: Vec<u8>,
	current_packet: Packet,
	/// Empty when idle; holds the observed topic while a `GET` is in flight.
	observer: String,
}

impl ConnectionState {
	fn new() -> Self {
		Self {
			rx_buffer: Vec::with_capacity(RX_BUFFER_INITIAL_CAPACITY),
			current_packet: Packet::new(),
			observer: String::new(),
		}
	}
}

/// One legacy TCP connection's translation state, serialized under its own
/// mutex per §4.2 and §5.
///
/// Always held behind an `Arc` (see [`ConnectionClient::new`]); the snapshot
/// timer captures a [`Weak`] back-reference rather than a strong one, so a
/// disconnect racing with a pending timer is benign (per the design notes).
pub struct ConnectionClient {
	conn: String,
	adapter: Arc<dyn BrokerAdapter>,
	self_weak: Weak<ConnectionClient>,
	state: tokio::sync::Mutex<ConnectionState>,
}

impl ConnectionClient {
	/// Builds a fresh client for `conn`, ready to receive bytes.
	pub fn new(conn: String, adapter: Arc<dyn BrokerAdapter>) -> Arc<Self> {
		Arc::new_cyclic(|weak| Self {
			conn,
			adapter,
			self_weak: weak.clone(),
			state: tokio::sync::Mutex::new(ConnectionState::new()),
		})
	}

	/// The connection identifier this client was built for.
	pub fn conn(&self) -> &str {
		&self.conn
	}

	/// Feeds `chunk` into the receive buffer, handling every complete frame
	/// (`\n`-terminated) it contains in order.
	///
	/// Holds the per-connection mutex for the whole call, per §5: adapter RPCs
	/// are suspension points and this is deliberate serialization, not an
	/// oversight.
	pub async fn on_received_bytes(&self, chunk: &[u8]) -> Result<(), GatewayError> {
		let mut guard = self.state.lock().await;

		for &byte in chunk {
			if byte != b'\n' {
				guard.rx_buffer.push(byte);
				continue;
			}

			guard.current_packet.stamp = Local::now();
			guard.current_packet.value = None;

			let mut line = std::mem::take(&mut guard.rx_buffer);
			let decoded = guard.current_packet.decode_into(&line);

			line.clear();
			if line.capacity() > RX_BUFFER_INITIAL_CAPACITY {
				line = Vec::with_capacity(RX_BUFFER_INITIAL_CAPACITY);
			}
			guard.rx_buffer = line;

			decoded?;
			self.handle_packet(&mut guard).await?;
		}

		Ok(())
	}

	/// Dispatches `state.current_packet` to the broker adapter, per §4.2.
	///
	/// A `GET` in flight (`observer` non-empty) swallows every other inbound
	/// record without acting, per the snapshot state machine.
	async fn handle_packet(&self, state: &mut ConnectionState) -> Result<(), GatewayError> {
		if !state.observer.is_empty() {
			return Ok(());
		}

		if state.current_packet.topic.is_empty() {
			return Err(GatewayError::UnknownTopic);
		}

		let topic = state.current_packet.topic.clone();

		match state.current_packet.method {
			Some(Method::Pub) => {
				let payload = state.current_packet.to_publish_json();
				self.adapter.publish(&self.conn, &topic, 0, payload).await
			}
			Some(Method::Sub) => self.adapter.subscribe(&self.conn, &topic, 2).await,
			Some(Method::Usb) => self.adapter.unsubscribe(&self.conn, &topic).await,
			Some(Method::Get) => {
				self.adapter.subscribe(&self.conn, &topic, 2).await?;
				state.observer.clone_from(&topic);
				self.schedule_snapshot_timer(topic);
				Ok(())
			}
			None => Err(GatewayError::UnknownMethod),
		}
	}

	/// Spawns the fire-once 5s snapshot auto-cancel timer for `topic`.
	///
	/// Runs on the background executor rather than any request's context,
	/// since it must outlive whatever call triggered the `GET` (see the design
	/// notes on the snapshot timer's context).
	fn schedule_snapshot_timer(&self, topic: String) {
		let weak = self.self_weak.clone();
		tokio::spawn(async move {
			tokio::time::sleep(SNAPSHOT_TIMEOUT).await;
			if let Some(client) = weak.upgrade() {
				client.on_snapshot_timeout(&topic).await;
			}
		});
	}

	/// The snapshot timer's callback: if still observing `topic`, unsubscribes
	/// and emits a synthetic empty record, then clears `observer`.
	///
	/// A no-op if a broker delivery already completed the snapshot first.
	async fn on_snapshot_timeout(&self, topic: &str) {
		let mut guard = self.state.lock().await;
		if guard.observer != topic {
			return;
		}
		guard.observer.clear();

		if let Err(err) = self.adapter.unsubscribe(&self.conn, topic).await {
			tracing::warn!(conn = %self.conn, topic, %err, "snapshot timeout unsubscribe failed");
		}

		guard.current_packet.topic = topic.to_owned();
		guard.current_packet.method = Some(Method::Pub);
		guard.current_packet.value = None;
		guard.current_packet.stamp = Local::now();

		if let Err(err) = self.send_packet(&guard.current_packet).await {
			tracing::warn!(conn = %self.conn, topic, %err, "snapshot timeout send failed");
		}
	}

	/// Handles one broker-initiated delivery, per §4.2's `OnReceivedMessage`.
	pub async fn on_received_message(&self, topic: &str, payload: &[u8]) -> Result<(), GatewayError> {
		let mut guard = self.state.lock().await;

		if !guard.observer.is_empty() {
			if guard.observer != topic {
				return Ok(());
			}
			guard.observer.clear();
			self.adapter.unsubscribe(&self.conn, topic).await?;
		}

		guard.current_packet.apply_delivery_json(payload)?;
		guard.current_packet.topic = topic.to_owned();
		guard.current_packet.method = Some(Method::Pub);

		self.send_packet(&guard.current_packet).await
	}

	/// Encodes `pkt` and hands it to the broker adapter's `Send`.
	async fn send_packet(&self, pkt: &Packet) -> Result<(), GatewayError> {
		let bytes = pkt.encode()?.into_bytes();
		self.adapter.send(&self.conn, bytes).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::adapter::fake::FakeAdapter;

	fn client_with(adapter: Arc<FakeAdapter>) -> Arc<ConnectionClient> {
		ConnectionClient::new("test".to_owned(), adapter)
	}

	#[tokio::test]
	async fn s1_publish_with_default_stamp() {
		let adapter = Arc::new(FakeAdapter::default());
		let client = client_with(Arc::clone(&adapter));

		client
			.on_received_bytes(b"name:test|method:set|val:11.06\n")
			.await
			.unwrap();

		assert_eq!(adapter.sent.lock().unwrap().len(), 0);

		let published = adapter.published.lock().unwrap();
		assert_eq!(published.len(), 1);
		let (conn, topic, qos, payload) = &published[0];
		assert_eq!(conn, "test");
		assert_eq!(topic, "test");
		assert_eq!(*qos, 0);
		assert_eq!(payload["value"], "11.06");
	}

	#[tokio::test]
	async fn s3_subscribe_dispatches() {
		let adapter = Arc::new(FakeAdapter::default());
		let client = client_with(Arc::clone(&adapter));

		client
			.on_received_bytes(b"name:test|method:subscr\n")
			.await
			.unwrap();

		let subscribed = adapter.subscribed.lock().unwrap();
		assert_eq!(subscribed.len(), 1);
		assert_eq!(subscribed[0], ("test".to_owned(), "test".to_owned(), 2));
	}

	#[tokio::test]
	async fn unknown_topic_is_an_error() {
		let adapter = Arc::new(FakeAdapter::default());
		let client = client_with(adapter);

		let result = client.on_received_bytes(b"method:set|val:1\n").await;
		assert!(matches!(result, Err(GatewayError::UnknownTopic)));
	}

	#[tokio::test]
	async fn missing_method_is_an_error() {
		let adapter = Arc::new(FakeAdapter::default());
		let client = client_with(adapter);

		let result = client.on_received_bytes(b"name:test\n").await;
		assert!(matches!(result, Err(GatewayError::UnknownMethod)));
	}

	/// Property 4: while observing, further legacy input is swallowed.
	#[tokio::test]
	async fn property_4_snapshot_swallows_further_input() {
		let adapter = Arc::new(FakeAdapter::default());
		let client = client_with(Arc::clone(&adapter));

		client.on_received_bytes(b"name:test|method:get\n").await.unwrap();
		client
			.on_received_bytes(b"name:test|method:set|val:1\n")
			.await
			.unwrap();

		assert_eq!(adapter.sent.lock().unwrap().len(), 0, "no Send during observation");
		assert_eq!(
			adapter.published.lock().unwrap().len(),
			0,
			"the swallowed Pub must never reach the broker while observing"
		);
		assert_eq!(adapter.subscribed.lock().unwrap().len(), 1, "only the initial GET subscribes");
	}

	/// Property 5 / scenario S5: a `GET` with no delivery fires the timer once.
	#[tokio::test(start_paused = true)]
	async fn property_5_snapshot_timeout_emits_empty_record() {
		let adapter = Arc::new(FakeAdapter::default());
		let client = client_with(Arc::clone(&adapter));

		client.on_received_bytes(b"name:test|method:get\n").await.unwrap();

		tokio::time::advance(SNAPSHOT_TIMEOUT + Duration::from_millis(10)).await;
		tokio::task::yield_now().await;

		let sent = adapter.sent.lock().unwrap();
		assert_eq!(sent.len(), 1);
		assert!(String::from_utf8_lossy(&sent[0].1).contains("val:none"));
	}

	/// Property 6 / scenario S4: an early delivery completes the snapshot and
	/// the timer becomes a no-op.
	#[tokio::test(start_paused = true)]
	async fn property_6_snapshot_early_arrival() {
		let adapter = Arc::new(FakeAdapter::default());
		let client = client_with(Arc::clone(&adapter));

		client.on_received_bytes(b"name:test|method:get\n").await.unwrap();

		client
			.on_received_message(b"test", br#"{"stamp":1118509199999,"value":"11.06"}"#)
			.await
			.unwrap();

		{
			let sent = adapter.sent.lock().unwrap();
			assert_eq!(sent.len(), 1);
			assert!(String::from_utf8_lossy(&sent[0].1).contains("val:11.06"));
		}

		tokio::time::advance(SNAPSHOT_TIMEOUT + Duration::from_millis(10)).await;
		tokio::task::yield_now().await;

		assert_eq!(adapter.sent.lock().unwrap().len(), 1, "timer fired after completion must be a no-op");
	}

	#[tokio::test]
	async fn delivery_for_unobserved_topic_is_dropped_silently() {
		let adapter = Arc::new(FakeAdapter::default());
		let client = client_with(Arc::clone(&adapter));

		client.on_received_bytes(b"name:test|method:get\n").await.unwrap();
		client
			.on_received_message(b"other", br#"{"stamp":1,"value":"x"}"#)
			.await
			.unwrap();

		assert_eq!(adapter.sent.lock().unwrap().len(), 0);
	}
}
