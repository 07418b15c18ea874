//! Payload transforms.
//!
//! The broker never interprets payload bytes. A [`PayloadDecoder`] turns the
//! bytes of every delivery, local or remote, into the item type stored in
//! the target queue. A [`PayloadEncoder`] is the matching caller-side
//! transform used by [`crate::Broker::send_value`].

use crate::error::{BrokerError, BrokerResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Bytes → queue item.
pub trait PayloadDecoder<T>: Send + Sync + 'static {
    fn decode(&self, bytes: Vec<u8>) -> BrokerResult<T>;
}

/// Value → bytes.
pub trait PayloadEncoder<V: ?Sized>: Send + Sync {
    fn encode(&self, value: &V) -> BrokerResult<Vec<u8>>;
}

impl<T, F> PayloadDecoder<T> for F
where
    F: Fn(Vec<u8>) -> BrokerResult<T> + Send + Sync + 'static,
{
    fn decode(&self, bytes: Vec<u8>) -> BrokerResult<T> {
        self(bytes)
    }
}

impl<V: ?Sized, F> PayloadEncoder<V> for F
where
    F: Fn(&V) -> BrokerResult<Vec<u8>> + Send + Sync,
{
    fn encode(&self, value: &V) -> BrokerResult<Vec<u8>> {
        self(value)
    }
}

/// Identity transform: queues receive the raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytes;

impl PayloadDecoder<Vec<u8>> for RawBytes {
    fn decode(&self, bytes: Vec<u8>) -> BrokerResult<Vec<u8>> {
        Ok(bytes)
    }
}

impl PayloadEncoder<[u8]> for RawBytes {
    fn encode(&self, value: &[u8]) -> BrokerResult<Vec<u8>> {
        Ok(value.to_vec())
    }
}

/// JSON transform for any serde type.
pub struct JsonCodec<T>(PhantomData<fn() -> T>);

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + 'static> PayloadDecoder<T> for JsonCodec<T> {
    fn decode(&self, bytes: Vec<u8>) -> BrokerResult<T> {
        serde_json::from_slice(&bytes).map_err(|e| BrokerError::Decode(e.to_string()))
    }
}

impl<T: Serialize> PayloadEncoder<T> for JsonCodec<T> {
    fn encode(&self, value: &T) -> BrokerResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| BrokerError::Encode(e.to_string()))
    }
}
