use tokio::sync::watch;

use crate::snapshot::SensorSnapshot;

/// Last known device state, written by the inbox consumer only.
pub struct DeviceMirror {
    tx: watch::Sender<Option<SensorSnapshot>>,
}

impl Default for DeviceMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceMirror {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn replace(&self, snapshot: Option<SensorSnapshot>) {
        self.tx.send_replace(snapshot);
    }

    pub fn current(&self) -> Option<SensorSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn reader(&self) -> MirrorReader {
        MirrorReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read handle given to command dispatchers.
#[derive(Clone)]
pub struct MirrorReader {
    rx: watch::Receiver<Option<SensorSnapshot>>,
}

impl MirrorReader {
    pub fn current(&self) -> Option<SensorSnapshot> {
        self.rx.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(Option<&SensorSnapshot>) -> R) -> R {
        f(self.rx.borrow().as_ref())
    }
}
