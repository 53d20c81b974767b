//! The in-memory Packet and the LegacyWire line codec.
//!
//! Decoding is driven by an explicit key table (see [`decode_into`]) rather than
//! reflection: each token's key is matched once against the field it denotes, and
//! the first alias to set a field wins.

use chrono::{DateTime, Local};
use serde_json::Value;

use crate::error::CodecError;
use crate::method::Method;
use crate::timestamp;

/// The in-memory representation of one LegacyWire record.
///
/// Callers are expected to reuse a single `Packet` across frames on a connection
/// (see the connection client); [`decode_into`] only ever touches fields whose key
/// is present in the frame, so callers must reset `value` (and `stamp`, if receive
/// time is desired) before each decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
	/// The topic a publish/subscribe/unsubscribe/get acts on.
	pub topic: String,
	/// Instant with millisecond precision.
	pub stamp: DateTime<Local>,
	/// The action this record requests, if the `method` token was present and valid.
	pub method: Option<Method>,
	/// Opaque scalar payload; `None` renders as the `"none"` sentinel on the wire.
	pub value: Option<Value>,
	/// Auxiliary unit string, defaults to `"none"`.
	pub units: String,
	/// Auxiliary description string, defaults to `"none"`.
	pub descr: String,
	/// Auxiliary type string, defaults to `"rw"`.
	pub r#type: String,
}

impl Packet {
	/// A freshly allocated packet with the default auxiliary fields and `stamp`
	/// set to now, as a newly constructed connection client would build one.
	pub fn new() -> Self {
		Self {
			topic: String::new(),
			stamp: Local::now(),
			method: None,
			value: None,
			units: "none".to_owned(),
			descr: "none".to_owned(),
			r#type: "rw".to_owned(),
		}
	}

	/// Decodes one LegacyWire line (without its trailing `\n`) into `self`.
	///
	/// Only fields whose key is present in `line` are overwritten. Unknown keys
	/// and tokens without an inner `:` are silently skipped. Malformed timestamps
	/// and unrecognized method aliases are hard errors.
	pub fn decode_into(&mut self, line: &[u8]) -> Result<(), CodecError> {
		let line = String::from_utf8_lossy(line);

		let mut topic_set = false;
		let mut stamp_set = false;
		let mut method_set = false;
		let mut value_set = false;
		let mut units_set = false;
		let mut descr_set = false;
		let mut type_set = false;

		for token in line.split('|') {
			let Some((key, val)) = token.split_once(':') else {
				continue;
			};
			let key = key.trim();

			match key {
				"name" | "n" if !topic_set => {
					self.topic = val.to_owned();
					topic_set = true;
				}
				"time" | "t" if !stamp_set => {
					self.stamp = timestamp::parse_stamp(val)?;
					stamp_set = true;
				}
				"method" | "meth" | "m" if !method_set => {
					self.method = Some(
						Method::from_alias(val).ok_or_else(|| CodecError::UnknownMethod(val.to_owned()))?,
					);
					method_set = true;
				}
				"val" | "value" | "v" if !value_set => {
					self.value = if val == "none" {
						None
					} else {
						Some(Value::String(val.to_owned()))
					};
					value_set = true;
				}
				"units" if !units_set => {
					self.units = val.to_owned();
					units_set = true;
				}
				"descr" if !descr_set => {
					self.descr = val.to_owned();
					descr_set = true;
				}
				"type" if !type_set => {
					self.r#type = val.to_owned();
					type_set = true;
				}
				_ => {}
			}
		}

		Ok(())
	}

	/// Encodes `self` as the canonical LegacyWire line, including the trailing `\n`.
	///
	/// Field order is fixed: `time|method|name|val|descr|type|units`.
	pub fn encode(&self) -> Result<String, CodecError> {
		if self.topic.is_empty() {
			return Err(CodecError::MissingTopic);
		}
		let method = self.method.ok_or(CodecError::MissingMethod)?;

		let value = match &self.value {
			Some(v) => render_scalar(v),
			None => "none".to_owned(),
		};

		Ok(format!(
			"time:{}|method:{}|name:{}|val:{}|descr:{}|type:{}|units:{}\n",
			timestamp::format_stamp(self.stamp),
			method,
			self.topic,
			value,
			self.descr,
			self.r#type,
			self.units,
		))
	}

	/// The JSON view sent to the broker adapter's `Publish` call: `stamp` in millis,
	/// `value` as-is, every LegacyWire-only field suppressed.
	pub fn to_publish_json(&self) -> Value {
		let mut obj = serde_json::Map::with_capacity(2);
		obj.insert(
			"stamp".to_owned(),
			Value::from(timestamp::to_millis(self.stamp)),
		);
		if let Some(value) = &self.value {
			obj.insert("value".to_owned(), value.clone());
		}
		Value::Object(obj)
	}

	/// Populates `stamp` and `value` from a broker-delivered message payload.
	///
	/// Mirrors the JSON shape produced by [`Packet::to_publish_json`]. Missing
	/// `stamp` leaves the current value untouched; missing `value` clears it.
	pub fn apply_delivery_json(&mut self, payload: &[u8]) -> Result<(), CodecError> {
		let parsed: Value =
			serde_json::from_slice(payload).map_err(|_| CodecError::MissingTopic)?;
		if let Some(millis) = parsed.get("stamp").and_then(Value::as_i64) {
			self.stamp = timestamp::from_millis(millis)?;
		}
		self.value = parsed.get("value").cloned();
		Ok(())
	}
}

impl Default for Packet {
	fn default() -> Self {
		Self::new()
	}
}

fn render_scalar(v: &Value) -> String {
	match v {
		Value::String(s) => s.clone(),
		Value::Number(n) => n.to_string(),
		Value::Bool(b) => b.to_string(),
		other => other.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn with_utc<T>(f: impl FnOnce() -> T) -> T {
		// SAFETY: single-threaded test execution within this module.
		unsafe { std::env::set_var("TZ", "UTC") };
		f()
	}

	#[test]
	fn round_trip_modulo_default_fillers() {
		with_utc(|| {
			let mut p = Packet::new();
			p.decode_into(b"time:11.06.2005 23_59_59.999|method:set|name:test|val:11.06").unwrap();

			let encoded = p.encode().unwrap();
			assert_eq!(
				encoded,
				"time:11.06.2005 23_59_59.999|method:set|name:test|val:11.06|descr:none|type:rw|units:none\n"
			);

			let mut roundtrip = Packet::new();
			roundtrip
				.decode_into(encoded.trim_end().as_bytes())
				.unwrap();
			assert_eq!(roundtrip, p);
		});
	}

	#[test]
	fn first_alias_wins() {
		let mut p = Packet::new();
		p.decode_into(b"name:first|n:second").unwrap();
		assert_eq!(p.topic, "first");
	}

	#[test]
	fn unknown_keys_and_malformed_tokens_are_skipped() {
		let mut p = Packet::new();
		p.decode_into(b"bogus|also-bogus:|name:test|noise").unwrap();
		assert_eq!(p.topic, "test");
	}

	#[test]
	fn none_value_decodes_to_empty() {
		let mut p = Packet::new();
		p.value = Some(Value::String("leftover".into()));
		p.decode_into(b"name:test|val:none").unwrap();
		assert_eq!(p.value, None);
	}

	#[test]
	fn unknown_method_alias_is_an_error() {
		let mut p = Packet::new();
		assert_eq!(
			p.decode_into(b"name:test|method:bogus"),
			Err(CodecError::UnknownMethod("bogus".into()))
		);
	}

	#[test]
	fn encode_without_topic_fails() {
		let mut p = Packet::new();
		p.method = Some(Method::Pub);
		assert_eq!(p.encode(), Err(CodecError::MissingTopic));
	}

	#[test]
	fn encode_without_method_fails() {
		let mut p = Packet::new();
		p.topic = "test".to_owned();
		assert_eq!(p.encode(), Err(CodecError::MissingMethod));
	}

	#[test]
	fn publish_json_suppresses_legacy_only_fields() {
		let mut p = Packet::new();
		p.decode_into(b"name:test|method:set|val:11.06").unwrap();
		let json = p.to_publish_json();
		assert!(json.get("value").is_some());
		assert!(json.get("name").is_none());
		assert!(json.get("method").is_none());
	}
}
