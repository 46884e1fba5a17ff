use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use crate::mirror::MirrorReader;
use crate::snapshot::{SensorSnapshot, ACTUATOR_OFF, ACTUATOR_ON};
use crate::store::{DeviceStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuator {
    Sprinkler,
    Buzzer,
}

impl Actuator {
    pub fn field(self) -> &'static str {
        match self {
            Actuator::Sprinkler => "sprinkler",
            Actuator::Buzzer => "buzzer",
        }
    }

    fn state(self, snapshot: &SensorSnapshot) -> &str {
        match self {
            Actuator::Sprinkler => &snapshot.sprinkler,
            Actuator::Buzzer => &snapshot.buzzer,
        }
    }
}

pub fn toggled(current: &str) -> &'static str {
    if current.eq_ignore_ascii_case(ACTUATOR_ON) {
        ACTUATOR_OFF
    } else {
        ACTUATOR_ON
    }
}

/// Issues writes against the device record. Toggle directions are taken from
/// the mirror, never from what is currently on screen.
pub struct Commander<S: ?Sized> {
    store: Arc<S>,
    mirror: MirrorReader,
}

impl<S: ?Sized> Clone for Commander<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            mirror: self.mirror.clone(),
        }
    }
}

impl<S: DeviceStore + ?Sized> Commander<S> {
    pub fn new(store: Arc<S>, mirror: MirrorReader) -> Self {
        Self { store, mirror }
    }

    pub async fn toggle_sprinkler(&self) -> Result<(), StoreError> {
        self.toggle(Actuator::Sprinkler).await
    }

    pub async fn toggle_buzzer(&self) -> Result<(), StoreError> {
        self.toggle(Actuator::Buzzer).await
    }

    pub async fn toggle(&self, actuator: Actuator) -> Result<(), StoreError> {
        let next = self.mirror.with(|snapshot| {
            toggled(snapshot.map(|s| actuator.state(s)).unwrap_or(ACTUATOR_OFF))
        });
        info!(actuator = actuator.field(), to = next, "toggling actuator");
        self.store
            .set_field(actuator.field(), Value::String(next.to_string()))
            .await
    }

    /// Clears both alarm flags in a single update.
    pub async fn acknowledge_fire(&self) -> Result<(), StoreError> {
        let mut fields = Map::new();
        fields.insert("fire".to_string(), Value::Bool(false));
        fields.insert("smoke".to_string(), Value::Bool(false));
        info!("acknowledging fire alarm");
        self.store.update_fields(fields).await
    }
}
