use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::store::{DeviceStore, StoreError, StoreEvent};

/// In-process store holding one device record. Every write notifies the
/// subscribers once, so a multi-field update is seen as a single change.
pub struct MemoryStore {
    record: watch::Sender<Value>,
    writes: AtomicU64,
    reject_writes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

impl MemoryStore {
    pub fn new(initial: Value) -> Self {
        let (record, _) = watch::channel(initial);
        Self {
            record,
            writes: AtomicU64::new(0),
            reject_writes: AtomicBool::new(false),
        }
    }

    pub fn record(&self) -> Value {
        self.record.borrow().clone()
    }

    /// Replaces the whole record, as the device itself would.
    pub fn publish(&self, record: Value) {
        self.record.send_replace(record);
    }

    pub fn delete(&self) {
        self.record.send_replace(Value::Null);
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Makes subsequent writes fail, for exercising error paths.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::Relaxed);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Http {
                status: 401,
                message: "Permission denied".to_string(),
            });
        }
        Ok(())
    }

    fn modify(&self, fields: Map<String, Value>) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.record.send_modify(|record| {
            if !record.is_object() {
                *record = Value::Object(Map::new());
            }
            if let Value::Object(map) = record {
                for (key, value) in fields {
                    if value.is_null() {
                        map.remove(&key);
                    } else {
                        map.insert(key, value);
                    }
                }
            }
        });
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn fetch(&self) -> Result<Value, StoreError> {
        Ok(self.record())
    }

    async fn subscribe(&self, inbox: mpsc::Sender<StoreEvent>) -> Result<(), StoreError> {
        let mut changes = self.record.subscribe();
        loop {
            let current = changes.borrow_and_update().clone();
            let event = StoreEvent::Snapshot((!current.is_null()).then_some(current));
            if inbox.send(event).await.is_err() {
                debug!("inbox closed, ending memory subscription");
                return Ok(());
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Err(StoreError::Closed);
                    }
                }
                _ = inbox.closed() => return Ok(()),
            }
        }
    }

    async fn set_field(&self, field: &str, value: Value) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut fields = Map::new();
        fields.insert(field.to_string(), value);
        self.modify(fields);
        Ok(())
    }

    async fn update_fields(&self, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.check_writable()?;
        self.modify(fields);
        Ok(())
    }
}
