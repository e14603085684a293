//! Framed codec for bridge connections.
//!
//! Uses LengthDelimitedCodec for framing + serde_json for serialization.
//! Works over any AsyncRead/AsyncWrite (TCP sockets, in-memory duplexes).

use std::io;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Codec that frames messages with a length prefix and serializes with JSON.
///
/// Wraps LengthDelimitedCodec and adds serde_json serialization.
pub struct JsonCodec<T> {
    inner: LengthDelimitedCodec,
    _phantom: PhantomData<T>,
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .new_codec(),
            _phantom: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Decoder for JsonCodec<T> {
    type Item = T;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(bytes) => {
                let item = serde_json::from_slice(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

impl<T: Serialize> Encoder<T> for JsonCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json =
            serde_json::to_vec(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let json_len = json.len();
        tracing::trace!(json_size_bytes = json_len, "Encoding frame");
        if json_len > 1_000_000 {
            // Pickled payloads can get big; surface it before the controller wonders.
            tracing::info!(
                json_size_bytes = json_len,
                json_size_kb = json_len / 1024,
                "Large frame being encoded"
            );
        }
        self.inner.encode(Bytes::from(json), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{
        ApiRequest, ApiResponse, CallbackRequest, CallbackResponse, InvocationId, ProviderHandle,
    };
    use crate::marshal::WireValue;

    #[test]
    fn codec_roundtrip_api_request() {
        let mut codec = JsonCodec::<ApiRequest>::new();
        let mut buf = BytesMut::new();

        let req = ApiRequest::Evaluate {
            expression: "1 + 1".into(),
        };
        codec.encode(req, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        match decoded {
            ApiRequest::Evaluate { expression } => assert_eq!(expression, "1 + 1"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn codec_roundtrip_api_response() {
        let mut codec = JsonCodec::<ApiResponse>::new();
        let mut buf = BytesMut::new();

        let resp = ApiResponse::Value {
            value: WireValue::Int(2),
        };
        codec.encode(resp, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        match decoded {
            ApiResponse::Value { value } => assert_eq!(value, WireValue::Int(2)),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn codec_roundtrip_callback_messages() {
        let mut req_codec = JsonCodec::<CallbackRequest>::new();
        let mut resp_codec = JsonCodec::<CallbackResponse>::new();
        let mut buf = BytesMut::new();

        let id = InvocationId::new();
        let req = CallbackRequest::Invoke {
            id,
            target: ProviderHandle::new("plotter-1"),
            method: "setWarning".into(),
            args: vec![WireValue::Str("bad filter".into())],
        };
        req_codec.encode(req, &mut buf).unwrap();
        let decoded = req_codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(decoded, CallbackRequest::Invoke { .. }));

        let resp = CallbackResponse::Return {
            id,
            value: WireValue::Null,
        };
        resp_codec.encode(resp, &mut buf).unwrap();
        let decoded = resp_codec.decode(&mut buf).unwrap().unwrap();
        match decoded {
            CallbackResponse::Return { id: got, .. } => assert_eq!(got, id),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn partial_frame_decodes_to_none() {
        let mut codec = JsonCodec::<ApiRequest>::new();
        let mut buf = BytesMut::new();
        codec.encode(ApiRequest::Check, &mut buf).unwrap();

        let mut partial = buf.split_to(buf.len() - 1);
        std::mem::swap(&mut partial, &mut buf);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
