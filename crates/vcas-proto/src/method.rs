//! The LegacyWire method vocabulary and its wire aliases.

use std::fmt;

/// The action a LegacyWire record asks the gateway to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
	/// Publish `value` on `topic`.
	Pub,
	/// Subscribe to `topic`.
	Sub,
	/// Unsubscribe from `topic`.
	Usb,
	/// One-shot snapshot read of `topic` (see the connection client's observer state).
	Get,
}

impl Method {
	/// Maps a wire-level alias to its method, per the LegacyWire vocabulary table.
	///
	/// Matching is case-sensitive and exact; anything else is `None`.
	pub fn from_alias(s: &str) -> Option<Self> {
		match s {
			"s" | "set" => Some(Self::Pub),
			"sb" | "subscr" | "subscribe" => Some(Self::Sub),
			"rel" | "release" => Some(Self::Usb),
			"g" | "gf" | "get" | "getfull" => Some(Self::Get),
			_ => None,
		}
	}

	/// The canonical wire text for this method, used on emission.
	pub fn canonical(self) -> &'static str {
		match self {
			Self::Pub => "set",
			Self::Sub => "subscribe",
			Self::Usb => "release",
			Self::Get => "get",
		}
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.canonical())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn aliases_map_to_the_same_variant() {
		for alias in ["s", "set"] {
			assert_eq!(Method::from_alias(alias), Some(Method::Pub));
		}
		for alias in ["sb", "subscr", "subscribe"] {
			assert_eq!(Method::from_alias(alias), Some(Method::Sub));
		}
		for alias in ["rel", "release"] {
			assert_eq!(Method::from_alias(alias), Some(Method::Usb));
		}
		for alias in ["g", "gf", "get", "getfull"] {
			assert_eq!(Method::from_alias(alias), Some(Method::Get));
		}
	}

	#[test]
	fn unknown_alias_is_none() {
		assert_eq!(Method::from_alias("nope"), None);
	}

	#[test]
	fn canonical_text_round_trips_through_from_alias() {
		for m in [Method::Pub, Method::Sub, Method::Usb, Method::Get] {
			assert_eq!(Method::from_alias(m.canonical()), Some(m));
		}
	}
}
