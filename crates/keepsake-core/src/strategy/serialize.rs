//! Serialization strategies
//!
//! A serializer turns a snapshot's JSON projection into the string that
//! goes to storage, and back. `deserialize` distinguishes "nothing
//! usable came out" (`Ok(None)`, e.g. an empty payload) from a hard
//! codec failure (`Err`). The sync/async split mirrors the storage
//! strategies: [`SerializerDriver`] fixes the calling convention once.

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::PersistError;

/// Asynchronous serialization strategy
pub trait Serializer: Send + Sync {
    /// Encode a snapshot for storage
    fn serialize<'a>(&'a self, value: &'a Value) -> BoxFuture<'a, Result<String>>;

    /// Decode stored data; `None` when the payload holds nothing usable
    fn deserialize<'a>(&'a self, data: &'a str) -> BoxFuture<'a, Result<Option<Value>>>;
}

/// Synchronous serialization strategy
pub trait SerializerSync: Send + Sync {
    /// Encode a snapshot for storage
    fn serialize(&self, value: &Value) -> Result<String>;

    /// Decode stored data; `None` when the payload holds nothing usable
    fn deserialize(&self, data: &str) -> Result<Option<Value>>;
}

/// A serializer resolved into its calling convention
pub enum SerializerDriver {
    /// Codec invoked synchronously
    Sync(Box<dyn SerializerSync>),
    /// Codec invoked through `await`
    Async(Box<dyn Serializer>),
}

impl SerializerDriver {
    /// Wrap a synchronous codec
    pub fn sync<S: SerializerSync + 'static>(codec: S) -> Self {
        SerializerDriver::Sync(Box::new(codec))
    }

    /// Wrap an asynchronous codec
    pub fn r#async<S: Serializer + 'static>(codec: S) -> Self {
        SerializerDriver::Async(Box::new(codec))
    }

    /// Whether calls to this codec suspend
    pub fn is_async(&self) -> bool {
        matches!(self, SerializerDriver::Async(_))
    }

    pub(crate) async fn serialize(&self, value: &Value) -> Result<String, PersistError> {
        let result = match self {
            SerializerDriver::Sync(s) => s.serialize(value),
            SerializerDriver::Async(s) => s.serialize(value).await,
        };
        result.map_err(PersistError::Serialization)
    }

    pub(crate) async fn deserialize(&self, data: &str) -> Result<Option<Value>, PersistError> {
        let result = match self {
            SerializerDriver::Sync(s) => s.deserialize(data),
            SerializerDriver::Async(s) => s.deserialize(data).await,
        };
        result.map_err(PersistError::Serialization)
    }
}

/// JSON text codec, the default serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Create the codec
    pub fn new() -> Self {
        Self
    }
}

impl SerializerSync for JsonSerializer {
    fn serialize(&self, value: &Value) -> Result<String> {
        serde_json::to_string(value).context("failed to encode snapshot as JSON")
    }

    fn deserialize(&self, data: &str) -> Result<Option<Value>> {
        if data.trim().is_empty() {
            return Ok(None);
        }
        let value: Value =
            serde_json::from_str(data).context("failed to decode stored JSON")?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_roundtrip() {
        let codec = JsonSerializer::new();
        let value = json!({"count": 2, "text": "hello"});

        let data = codec.serialize(&value).unwrap();
        let back = codec.deserialize(&data).unwrap().unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_empty_payload_is_absent() {
        let codec = JsonSerializer::new();
        assert!(codec.deserialize("").unwrap().is_none());
        assert!(codec.deserialize("   ").unwrap().is_none());
    }

    #[test]
    fn test_null_payload_is_absent() {
        let codec = JsonSerializer::new();
        assert!(codec.deserialize("null").unwrap().is_none());
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let codec = JsonSerializer::new();
        assert!(codec.deserialize("{not json").is_err());
    }

    #[tokio::test]
    async fn test_driver_wraps_codec_errors() {
        let driver = SerializerDriver::sync(JsonSerializer::new());
        assert!(!driver.is_async());

        let err = driver.deserialize("{broken").await.unwrap_err();
        assert_eq!(err.strategy(), "serialization");
    }
}
