use std::time::Duration;

pub const DEFAULT_DEVICE_ID: &str = "ESP32_001";

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub database_url: String,
    pub device_id: String,
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    pub reconnect_delay: Duration,
    pub series_capacity: usize,
    pub inbox_capacity: usize,
}

impl DashboardConfig {
    /// Path of the device record inside the store, e.g. `devices/ESP32_001`.
    pub fn record_path(&self) -> String {
        format!("devices/{}", self.device_id)
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            database_url: "https://localhost.firebaseio.com".to_string(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(3),
            series_capacity: crate::series::DEFAULT_CAPACITY,
            inbox_capacity: 64,
        }
    }
}
