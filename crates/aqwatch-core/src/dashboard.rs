use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::mirror::{DeviceMirror, MirrorReader};
use crate::render::{ChartSurface, Renderer, ViewSurface};
use crate::snapshot::SensorSnapshot;
use crate::store::{DeviceStore, StoreError, StoreEvent};

/// Single consumer of the store inbox. Keeps the mirror current and drives the
/// renderer once per delivered snapshot.
pub struct Dashboard<V, C> {
    renderer: Renderer<V, C>,
    mirror: DeviceMirror,
    snapshots: u64,
    read_errors: u64,
    last_error: Option<String>,
}

impl<V: ViewSurface, C: ChartSurface> Dashboard<V, C> {
    pub fn new(renderer: Renderer<V, C>) -> Self {
        Self {
            renderer,
            mirror: DeviceMirror::new(),
            snapshots: 0,
            read_errors: 0,
            last_error: None,
        }
    }

    pub fn mirror(&self) -> MirrorReader {
        self.mirror.reader()
    }

    pub fn renderer(&self) -> &Renderer<V, C> {
        &self.renderer
    }

    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }

    pub fn read_errors(&self) -> u64 {
        self.read_errors
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn handle(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Snapshot(raw) => {
                self.snapshots += 1;
                let snapshot = raw.as_ref().and_then(SensorSnapshot::from_value);
                if snapshot.is_none() {
                    debug!("device record absent, keeping current display");
                }
                self.mirror.replace(snapshot.clone());
                self.renderer.render(snapshot.as_ref());
            }
            StoreEvent::Error(reason) => {
                self.read_errors += 1;
                warn!(%reason, "error reading device record");
                self.last_error = Some(reason);
            }
        }
    }

    /// Handles whatever is already queued without waiting.
    pub fn drain(&mut self, inbox: &mut mpsc::Receiver<StoreEvent>) -> usize {
        let mut handled = 0;
        while let Ok(event) = inbox.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }
}

/// Starts the store subscription on its own task, feeding a fresh inbox.
pub fn spawn_subscription<S>(
    store: Arc<S>,
    capacity: usize,
) -> (mpsc::Receiver<StoreEvent>, JoinHandle<Result<(), StoreError>>)
where
    S: DeviceStore + ?Sized + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(async move { store.subscribe(tx).await });
    (rx, handle)
}
