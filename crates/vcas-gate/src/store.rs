//! Per-topic insert batching: the batching persistence engine.
//!
//! Each retentive topic gets one [`BatchBuffer`] that accumulates record tuples
//! under its own lock and hands back a complete multi-row `INSERT` exactly when
//! it fills, per §4.6's batching contract.

use std::sync::Mutex;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::GatewayError;

/// The query used by [`BatchStore::init`] to find topics that must be persisted.
pub const RETENTIVE_RULE_QUERY: &str = "SELECT top FROM rule WHERE ret = true";

/// Default capacity for a batch buffer when the deployment doesn't override it
/// (`hook.buf.qcap` in the configuration).
pub const DEFAULT_BATCH_CAPACITY: usize = 5;

/// One record destined for a retentive topic's table.
///
/// `stamp_millis` is lifted out of the publish payload at ingest; `payload` is
/// the remaining JSON object, rendered without its `stamp` field.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
	/// Milliseconds since the Unix epoch.
	pub stamp_millis: i64,
	/// The publish payload with `stamp` removed.
	pub payload: Value,
}

impl Record {
	/// Renders this record as one SQL tuple: `(to_timestamp(s/1000.0),'p')`.
	fn to_tuple_sql(&self) -> String {
		let payload = serde_json::to_string(&self.payload).unwrap_or_default();
		format!(
			"(to_timestamp({}/1000.0),'{}')",
			self.stamp_millis,
			escape_sql_literal(&payload),
		)
	}
}

/// Escapes single quotes for inline SQL string literals.
///
/// The batching contract builds statements by string interpolation rather than
/// bound parameters (matching the source this gateway replaces); this is the
/// minimum needed so a payload value containing `'` doesn't corrupt the
/// statement.
fn escape_sql_literal(s: &str) -> String {
	s.replace('\'', "''")
}

struct Buffer {
	pending: usize,
	builder: String,
}

/// The append buffer for one retentive topic.
pub struct BatchBuffer {
	capacity: usize,
	prefix: String,
	inner: Mutex<Buffer>,
}

impl BatchBuffer {
	/// A fresh, empty buffer for `topic` with the given flush `capacity`.
	pub fn new(topic: &str, capacity: usize) -> Self {
		let prefix = format!("INSERT INTO {topic} (stamp, payload) VALUES ");
		Self {
			capacity,
			inner: Mutex::new(Buffer {
				pending: 0,
				builder: prefix.clone(),
			}),
			prefix,
		}
	}

	/// Appends one record. Returns the complete flush statement when capacity is
	/// reached, in which case the buffer has already been reset to empty.
	pub fn append(&self, record: &Record) -> Option<String> {
		let mut guard = self.inner.lock().expect("batch buffer mutex poisoned");

		if guard.pending > 0 {
			guard.builder.push(',');
		}
		guard.builder.push_str(&record.to_tuple_sql());
		guard.pending += 1;

		if guard.pending == self.capacity {
			let statement = std::mem::replace(&mut guard.builder, self.prefix.clone());
			guard.pending = 0;
			Some(statement)
		} else {
			None
		}
	}

	/// The number of records currently pending a flush.
	pub fn pending(&self) -> usize {
		self.inner.lock().expect("batch buffer mutex poisoned").pending
	}
}

/// Process-wide table of per-topic batch buffers, built from the retentive rule
/// set at provider load.
pub struct BatchStore {
	buffers: DashMap<String, BatchBuffer>,
	default_capacity: usize,
}

impl BatchStore {
	/// An empty store; call [`BatchStore::init`] to populate it from the database.
	pub fn new(default_capacity: usize) -> Self {
		Self {
			buffers: DashMap::new(),
			default_capacity,
		}
	}

	/// Loads the retentive topic list, creates a buffer per topic, and runs the
	/// idempotent table/hypertable DDL for each.
	pub async fn init(&self, pool: &sqlx::PgPool) -> Result<(), GatewayError> {
		let rows: Vec<(String,)> = sqlx::query_as(RETENTIVE_RULE_QUERY).fetch_all(pool).await?;

		for (topic,) in rows {
			self
				.buffers
				.entry(topic.clone())
				.or_insert_with(|| BatchBuffer::new(&topic, self.default_capacity));

			let ddl = format!(
				"CREATE TABLE IF NOT EXISTS {topic}(stamp TIMESTAMPTZ NOT NULL, payload JSONB NOT NULL); \
				 SELECT create_hypertable('{topic}', by_range('stamp'), if_not_exists => TRUE);"
			);
			sqlx::query(&ddl).execute(pool).await?;
		}

		Ok(())
	}

	/// Records one publish to `topic`, flushing to `pool` if the buffer fills.
	///
	/// A no-op (returns `Ok`) for topics with no retentive rule.
	pub async fn record_publish(
		&self,
		pool: &sqlx::PgPool,
		topic: &str,
		payload: &[u8],
	) -> Result<(), GatewayError> {
		let Some(buffer) = self.buffers.get(topic) else {
			return Ok(());
		};

		let record = parse_record(payload)?;

		if let Some(statement) = buffer.append(&record) {
			sqlx::query(&statement).execute(pool).await?;
		}

		Ok(())
	}

	/// The number of records pending flush for `topic`, or `None` if it isn't
	/// retentive. Exposed for tests and diagnostics.
	pub fn pending(&self, topic: &str) -> Option<usize> {
		self.buffers.get(topic).map(|b| b.pending())
	}
}

/// Parses a publish payload, lifting the `stamp` field out into a [`Record`].
fn parse_record(payload: &[u8]) -> Result<Record, GatewayError> {
	let mut value: Value = serde_json::from_slice(payload).map_err(|_| GatewayError::DecodeJson)?;
	let Value::Object(ref mut obj) = value else {
		return Err(GatewayError::DecodeJson);
	};
	let stamp_millis = obj
		.remove("stamp")
		.and_then(|v| v.as_i64())
		.ok_or(GatewayError::DecodeJson)?;

	Ok(Record {
		stamp_millis,
		payload: value,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(millis: i64) -> Record {
		Record {
			stamp_millis: millis,
			payload: serde_json::json!({"value": "11.06"}),
		}
	}

	#[test]
	fn flush_exactness_for_k_times_n_plus_r() {
		let buffer = BatchBuffer::new("topic1", 3);
		let mut flushes = Vec::new();

		for i in 0..7 {
			if let Some(stmt) = buffer.append(&record(i)) {
				flushes.push(stmt);
			}
		}

		assert_eq!(flushes.len(), 2);
		for stmt in &flushes {
			assert_eq!(stmt.matches("to_timestamp").count(), 3);
			assert!(stmt.starts_with("INSERT INTO topic1 (stamp, payload) VALUES "));
		}
		assert_eq!(buffer.pending(), 1);
	}

	#[test]
	fn separate_topics_never_mix_tuples() {
		let a = BatchBuffer::new("a", 2);
		let b = BatchBuffer::new("b", 2);
		assert!(a.append(&record(1)).is_none());
		assert!(b.append(&record(2)).is_none());
		let flush_a = a.append(&record(3)).unwrap();
		assert!(flush_a.starts_with("INSERT INTO a "));
	}

	#[test]
	fn parse_record_lifts_stamp_out_of_payload() {
		let payload = br#"{"stamp":1118509199999,"value":"11.06"}"#;
		let rec = parse_record(payload).unwrap();
		assert_eq!(rec.stamp_millis, 1_118_509_199_999);
		assert_eq!(rec.payload, serde_json::json!({"value": "11.06"}));
	}

	#[test]
	fn escapes_embedded_single_quotes() {
		let rec = Record {
			stamp_millis: 0,
			payload: serde_json::json!({"value": "it's raining"}),
		};
		assert!(rec.to_tuple_sql().contains("it''s raining"));
	}
}
