use serde_json::Value;

/// Errors produced by payload codecs. Boxed so user codecs can surface
/// whatever error type their format library produces; the facade wraps
/// them into `UnserializableMessage` / `UndeserializableMessage`.
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Converts typed payloads to and from the opaque bytes the store moves.
pub trait PayloadCodec: Send + Sync {
    type Value;

    fn serialize(&self, value: &Self::Value) -> Result<Vec<u8>, CodecError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<Self::Value, CodecError>;
}

/// The default payload codec: JSON text encoded as UTF-8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    type Value = Value;

    fn serialize(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
