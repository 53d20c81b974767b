//! The LegacyWire timestamp: `dd.MM.yyyy HH_mm_ss.SSS` in the process's local time zone.

use chrono::{DateTime, Local, TimeZone};

use crate::error::CodecError;

/// `dd.MM.yyyy HH_mm_ss.SSS`, e.g. `11.06.2005 23_59_59.999`.
const STAMP_FORMAT: &str = "%d.%m.%Y %H_%M_%S%.3f";

/// Parses a LegacyWire timestamp token in the local time zone.
///
/// Fails with [`CodecError::MalformedTime`] if the value doesn't match the format.
pub fn parse_stamp(s: &str) -> Result<DateTime<Local>, CodecError> {
	let naive = chrono::NaiveDateTime::parse_from_str(s, STAMP_FORMAT)
		.map_err(|_| CodecError::MalformedTime(s.to_owned()))?;
	Local
		.from_local_datetime(&naive)
		.single()
		.or_else(|| Local.from_local_datetime(&naive).earliest())
		.ok_or_else(|| CodecError::MalformedTime(s.to_owned()))
}

/// Formats an instant as the LegacyWire timestamp text, in the local time zone.
pub fn format_stamp(stamp: DateTime<Local>) -> String {
	stamp.format(STAMP_FORMAT).to_string()
}

/// The millisecond Unix-epoch JSON view of an instant.
pub fn to_millis(stamp: DateTime<Local>) -> i64 {
	stamp.timestamp_millis()
}

/// Builds an instant from the millisecond Unix-epoch JSON view.
pub fn from_millis(millis: i64) -> Result<DateTime<Local>, CodecError> {
	Local
		.timestamp_millis_opt(millis)
		.single()
		.ok_or(CodecError::MalformedTime(millis.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Pins the process to UTC so the bijection in spec's testable property 2 is
	/// deterministic regardless of the host running the suite.
	fn with_utc<T>(f: impl FnOnce() -> T) -> T {
		// SAFETY: tests run single-threaded within this module; no other thread
		// observes the environment during the call.
		unsafe { std::env::set_var("TZ", "UTC") };
		f()
	}

	#[test]
	fn timestamp_bijection() {
		with_utc(|| {
			let parsed = parse_stamp("11.06.2005 23_59_59.999").unwrap();
			assert_eq!(to_millis(parsed), 1_118_509_199_999);

			let formatted = format_stamp(from_millis(1_118_509_199_999).unwrap());
			assert_eq!(formatted, "11.06.2005 23_59_59.999");
		});
	}

	#[test]
	fn malformed_timestamp_is_rejected() {
		assert!(matches!(
			parse_stamp("not-a-time"),
			Err(CodecError::MalformedTime(_))
		));
	}
}
