use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ACTUATOR_OFF: &str = "off";
pub const ACTUATOR_ON: &str = "on";

/// Typed view of the device record after every field has been defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub aqi: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub noise: f64,
    pub pm2_5: f64,
    pub online: bool,
    pub fire: bool,
    pub smoke: bool,
    pub sprinkler: String,
    pub buzzer: String,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            aqi: 0.0,
            temperature: 0.0,
            humidity: 0.0,
            noise: 0.0,
            pm2_5: 0.0,
            online: false,
            fire: false,
            smoke: false,
            sprinkler: ACTUATOR_OFF.to_string(),
            buzzer: ACTUATOR_OFF.to_string(),
        }
    }
}

impl SensorSnapshot {
    /// Builds a snapshot from the loosely typed record delivered by the store.
    ///
    /// Only a JSON object counts as a snapshot; `null` and bare scalars are
    /// treated as an absent record and yield `None`.
    pub fn from_value(raw: &Value) -> Option<Self> {
        let fields = raw.as_object()?;
        let get = |key: &str| fields.get(key).unwrap_or(&Value::Null);

        Some(Self {
            aqi: number_or_zero(get("aqi")),
            temperature: number_or_zero(get("temperature")),
            humidity: number_or_zero(get("humidity")),
            noise: number_or_zero(get("noise")),
            pm2_5: number_or_zero(get("pm2_5")),
            online: truthy(get("online")),
            fire: truthy(get("fire")),
            smoke: truthy(get("smoke")),
            sprinkler: actuator_or_off(get("sprinkler")),
            buzzer: actuator_or_off(get("buzzer")),
        })
    }

    pub fn alarm_active(&self) -> bool {
        self.fire || self.smoke
    }
}

fn number_or_zero(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0 && !v.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn actuator_or_off(value: &Value) -> String {
    match value.as_str() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => ACTUATOR_OFF.to_string(),
    }
}
