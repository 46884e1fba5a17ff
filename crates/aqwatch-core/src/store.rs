use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;

/// Message delivered to the dashboard inbox by a store subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// Full current record, or `None` once the record has been deleted.
    Snapshot(Option<Value>),
    Error(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("inbox closed")]
    Closed,
}

/// Realtime key-value store holding the device record.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Current record, `Value::Null` when it does not exist.
    async fn fetch(&self) -> Result<Value, StoreError>;

    /// Streams record changes into `inbox` until the receiver is dropped.
    async fn subscribe(&self, inbox: mpsc::Sender<StoreEvent>) -> Result<(), StoreError>;

    async fn set_field(&self, field: &str, value: Value) -> Result<(), StoreError>;

    /// Writes several fields of the record in one request.
    async fn update_fields(&self, fields: Map<String, Value>) -> Result<(), StoreError>;
}
