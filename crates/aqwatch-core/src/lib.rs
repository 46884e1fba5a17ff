pub mod aqi;
pub mod command;
pub mod config;
pub mod dashboard;
pub mod firebase;
pub mod memory;
pub mod mirror;
pub mod render;
pub mod series;
pub mod snapshot;
pub mod sse;
pub mod store;

pub use aqi::{classify, AqiClassification, CategoryClass};
pub use command::{Actuator, Commander};
pub use config::DashboardConfig;
pub use dashboard::{spawn_subscription, Dashboard};
pub use firebase::FirebaseStore;
pub use memory::MemoryStore;
pub use mirror::{DeviceMirror, MirrorReader};
pub use render::{ChartSurface, DisplayMode, DisplayModel, Renderer, StyleProp, ViewSurface};
pub use series::{ChartPoint, ChartSeries};
pub use snapshot::SensorSnapshot;
pub use store::{DeviceStore, StoreError, StoreEvent};
