//! A JSON [`tonic::codec::Codec`] for the broker adapter RPC.
//!
//! The broker vendor's actual wire schema is protobuf via generated stubs, which
//! are out of scope for this gateway (see the design ledger). This codec lets the
//! adapter client speak real gRPC framing over [`tonic::transport::Channel`]
//! against the request/response shapes in [`vcas_proto::rpc`] without requiring
//! generated code.

use std::marker::PhantomData;

use bytes::{Buf, BufMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tonic::Status;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};

/// A [`Codec`] that serializes `T` and deserializes `U` as JSON.
pub struct JsonCodec<T, U>(PhantomData<(T, U)>);

impl<T, U> Default for JsonCodec<T, U> {
	fn default() -> Self {
		Self(PhantomData)
	}
}

impl<T: Serialize + Send + Sync + 'static, U: DeserializeOwned + Send + Sync + 'static> Codec
	for JsonCodec<T, U>
{
	type Encode = T;
	type Decode = U;
	type Encoder = JsonEncoder<T>;
	type Decoder = JsonDecoder<U>;

	fn encoder(&mut self) -> Self::Encoder {
		JsonEncoder(PhantomData)
	}

	fn decoder(&mut self) -> Self::Decoder {
		JsonDecoder(PhantomData)
	}
}

/// The encoder half of [`JsonCodec`].
pub struct JsonEncoder<T>(PhantomData<T>);

impl<T: Serialize> Encoder for JsonEncoder<T> {
	type Item = T;
	type Error = Status;

	fn encode(&mut self, item: Self::Item, buf: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
		let bytes = serde_json::to_vec(&item).map_err(|e| Status::internal(e.to_string()))?;
		buf.put_slice(&bytes);
		Ok(())
	}
}

/// The decoder half of [`JsonCodec`].
pub struct JsonDecoder<U>(PhantomData<U>);

impl<U: DeserializeOwned> Decoder for JsonDecoder<U> {
	type Item = U;
	type Error = Status;

	fn decode(&mut self, buf: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
		if !buf.has_remaining() {
			return Ok(None);
		}
		let item = serde_json::from_slice(buf.chunk()).map_err(|e| Status::internal(e.to_string()))?;
		let remaining = buf.remaining();
		buf.advance(remaining);
		Ok(Some(item))
	}
}
